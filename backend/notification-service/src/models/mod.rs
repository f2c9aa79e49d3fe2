use chrono::{DateTime, Utc};
use event_schema::NotificationEvent;
use serde::{Deserialize, Serialize};

/// Persisted notification as returned by the query API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationRecord {
    pub id: i64,
    pub user_id: i64,
    pub message: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub notification_type: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Row to insert; the store assigns the id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: i64,
    pub message: String,
    pub notification_type: String,
    pub created_at: DateTime<Utc>,
}

impl NewNotification {
    /// Derive an unread notification from a consumed event.
    ///
    /// `task_id` is not stored; the message text already names the task.
    pub fn from_event(event: &NotificationEvent, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id: event.user_id,
            message: event.message.clone(),
            notification_type: event.event_type.clone(),
            created_at,
        }
    }
}
