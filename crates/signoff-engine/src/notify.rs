//! Notification dispatch
//!
//! Delivery is fire-and-forget and strictly outside the transaction
//! boundary: the dispatcher spawns delivery onto the runtime after a state
//! transition commits, and a failing sink is logged and dropped. No engine
//! operation ever fails because a notification could not be delivered.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use signoff_core::NotificationEvent;

/// Receives task/instance events for interested users
///
/// Implementations talk to whatever transport the deployment uses (message
/// queue, websocket push, email gateway). Acknowledgement or failure is
/// independent of engine state.
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    async fn deliver(&self, event: NotificationEvent) -> anyhow::Result<()>;
}

/// Hands events to a sink without blocking the caller
#[derive(Clone)]
pub struct NotificationDispatcher {
    sink: Arc<dyn NotificationSink>,
}

impl NotificationDispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Dispatch an event; returns immediately
    ///
    /// Sink errors are logged and swallowed.
    pub fn dispatch(&self, event: NotificationEvent) {
        let sink = Arc::clone(&self.sink);
        let event_type = event.event_type();
        let target_user_id = event.target_user_id();

        tokio::spawn(async move {
            if let Err(error) = sink.deliver(event).await {
                warn!(
                    event_type,
                    %target_user_id,
                    %error,
                    "notification delivery failed, dropping event"
                );
            }
        });
    }
}

/// Sink that only logs events; the default for embedders without a transport
pub struct LoggingSink;

#[async_trait]
impl NotificationSink for LoggingSink {
    async fn deliver(&self, event: NotificationEvent) -> anyhow::Result<()> {
        debug!(
            event_type = event.event_type(),
            target_user_id = %event.target_user_id(),
            "notification"
        );
        Ok(())
    }
}

/// Sink that records events in memory, for tests
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything delivered so far
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().clone()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, event: NotificationEvent) -> anyhow::Result<()> {
        self.events.lock().push(event);
        Ok(())
    }
}
