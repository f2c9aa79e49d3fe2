//! Durable notification storage
//!
//! The consumer writes through [`NotificationStore::insert`]; the query API
//! reads and marks records. Components receive the store as an
//! `Arc<dyn NotificationStore>` so tests can substitute the in-memory one.

mod memory;
mod postgres;

pub use memory::InMemoryNotificationStore;
pub use postgres::{PgNotificationStore, MIGRATOR};

use crate::models::{NewNotification, NotificationRecord};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("notification {0} not found")]
    NotFound(i64),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist a new unread notification and return its id.
    async fn insert(&self, notification: NewNotification) -> Result<i64, StoreError>;

    /// All notifications for `user_id`, newest first.
    async fn list_by_user(&self, user_id: i64) -> Result<Vec<NotificationRecord>, StoreError>;

    /// Set `is_read`. Marking an already read record succeeds.
    async fn mark_read(&self, id: i64) -> Result<(), StoreError>;
}
