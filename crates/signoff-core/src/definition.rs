//! Process definition: a named, versioned template for a business approval

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a process definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionStatus {
    /// Definition exists but cannot back new instances yet
    Draft,

    /// Definition is live; instances may be started from it
    Published,

    /// Definition is retired; existing instances keep running
    Disabled,
}

impl std::fmt::Display for DefinitionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Published => write!(f, "published"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// A versioned approval process template
///
/// The engine never interprets `process_definition`; the document is carried
/// opaquely for the benefit of modeling tools. Only
/// `status` and `instance_count` are mutated after creation; definitions are
/// never physically deleted (`deleted` is a logical flag).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDefinition {
    pub id: Uuid,

    /// Stable business identifier; unique per (process_key, version)
    pub process_key: String,

    /// Monotonically increasing per process_key
    pub version: u32,

    pub process_name: String,

    /// Business-type code, validated against the configured catalog
    pub category: Option<String>,

    pub description: Option<String>,
    pub status: DefinitionStatus,

    /// Opaque flow document, not interpreted by the engine
    pub process_definition: serde_json::Value,

    /// Denormalized count of instances started from this definition
    pub instance_count: u64,

    /// Exactly one definition per process_key carries this flag
    pub is_latest: bool,

    /// Logical delete flag
    pub deleted: bool,

    pub deploy_time: DateTime<Utc>,
}

impl ProcessDefinition {
    /// Whether new instances may be started from this definition
    pub fn is_startable(&self) -> bool {
        self.status == DefinitionStatus::Published && !self.deleted
    }
}
