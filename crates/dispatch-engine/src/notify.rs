//! Notification collaborator interface.
//!
//! Dispatch transitions are the source of truth; notifications are
//! fire-and-forget. The engine spawns each send and logs failures —
//! a dead notification service never blocks or rolls back a transition.

use async_trait::async_trait;
use tracing::info;

use crate::dispatch::CallStatus;
use crate::error::Result;
use crate::types::{CallId, LawyerId};

/// Abstract notification service for push delivery to clients, lawyers,
/// and operators. Implement for a real transport (push gateway, SMS,
/// websocket fan-out); the engine ships with a logging default.
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// A lawyer has been offered / bound to a call.
    async fn notify_assignment(&self, call_id: &CallId, lawyer_id: &LawyerId) -> Result<()>;

    /// A call changed status.
    async fn notify_status_change(&self, call_id: &CallId, status: CallStatus) -> Result<()>;
}

/// Default collaborator: writes notifications to the log.
pub struct LogNotifier;

#[async_trait]
impl NotificationService for LogNotifier {
    async fn notify_assignment(&self, call_id: &CallId, lawyer_id: &LawyerId) -> Result<()> {
        info!("🔔 notify: call {} offered to lawyer {}", call_id, lawyer_id);
        Ok(())
    }

    async fn notify_status_change(&self, call_id: &CallId, status: CallStatus) -> Result<()> {
        info!("🔔 notify: call {} is now {}", call_id, status);
        Ok(())
    }
}
