//! Notification events emitted after state transitions
//!
//! Events are fire-and-forget: they are handed to a sink implementation in
//! the engine crate after the state change commits, and delivery failure
//! never rolls back engine state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An event addressed to one interested user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// A task gained an owner (claim, transfer, delegate, or factory-created)
    TaskAssigned {
        task_id: Uuid,
        target_user_id: Uuid,
        payload: serde_json::Value,
        sent_at: DateTime<Utc>,
    },

    /// A task reached a terminal status
    TaskResolved {
        task_id: Uuid,
        target_user_id: Uuid,
        payload: serde_json::Value,
        sent_at: DateTime<Utc>,
    },

    /// An instance changed lifecycle status
    InstanceStatusChanged {
        instance_id: Uuid,
        target_user_id: Uuid,
        payload: serde_json::Value,
        sent_at: DateTime<Utc>,
    },
}

impl NotificationEvent {
    pub fn task_assigned(task_id: Uuid, target_user_id: Uuid, payload: serde_json::Value) -> Self {
        Self::TaskAssigned {
            task_id,
            target_user_id,
            payload,
            sent_at: Utc::now(),
        }
    }

    pub fn task_resolved(task_id: Uuid, target_user_id: Uuid, payload: serde_json::Value) -> Self {
        Self::TaskResolved {
            task_id,
            target_user_id,
            payload,
            sent_at: Utc::now(),
        }
    }

    pub fn instance_status_changed(
        instance_id: Uuid,
        target_user_id: Uuid,
        payload: serde_json::Value,
    ) -> Self {
        Self::InstanceStatusChanged {
            instance_id,
            target_user_id,
            payload,
            sent_at: Utc::now(),
        }
    }

    /// The user this event is addressed to
    pub fn target_user_id(&self) -> Uuid {
        match self {
            Self::TaskAssigned { target_user_id, .. }
            | Self::TaskResolved { target_user_id, .. }
            | Self::InstanceStatusChanged { target_user_id, .. } => *target_user_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TaskAssigned { .. } => "task_assigned",
            Self::TaskResolved { .. } => "task_resolved",
            Self::InstanceStatusChanged { .. } => "instance_status_changed",
        }
    }
}
