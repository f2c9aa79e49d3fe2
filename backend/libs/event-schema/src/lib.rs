/// Event schemas for the Kafka topics shared between task platform services
///
/// Producers (assignment, task and notification services) and the
/// notification consumer must agree on these payloads byte for byte, so the
/// wire types live here rather than in any one service.
use serde::{Deserialize, Serialize};

/// Topic carrying task notification events
pub const TASK_NOTIFICATIONS_TOPIC: &str = "task-notifications";

/// Consumer group of the notification pipeline.
///
/// Restarts under the same group resume from the last committed offset.
pub const NOTIFICATION_CONSUMER_GROUP: &str = "notification-service";

// ============================================================================
// NOTIFICATION EVENTS
// ============================================================================

/// A domain event addressed to one user, e.g. "task assigned".
///
/// Serialized as `{"user_id", "task_id", "event_type", "message"}`.
/// Immutable once written to the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub user_id: i64,
    pub task_id: i64,
    pub event_type: String,
    pub message: String,
}

impl NotificationEvent {
    pub fn new(
        user_id: i64,
        task_id: i64,
        event_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            task_id,
            event_type: event_type.into(),
            message: message.into(),
        }
    }

    /// Partition key: all events for one recipient land on one partition and
    /// keep their publish order.
    pub fn partition_key(&self) -> String {
        self.user_id.to_string()
    }

    /// Canonical JSON encoding written to the log
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// Well-known `event_type` values emitted by the task services
pub mod event_types {
    pub const TASK_ASSIGNED: &str = "ASSIGNED";
    pub const STATUS_UPDATED: &str = "STATUS_UPDATED";
    pub const TASK_CREATED: &str = "TASK_CREATED";
}
