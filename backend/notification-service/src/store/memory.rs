use super::{NotificationStore, StoreError};
use crate::models::{NewNotification, NotificationRecord};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Process-local store with the same contract as the Postgres one.
///
/// `set_unavailable(true)` makes every call fail with
/// [`StoreError::Unavailable`], which is how outages are exercised.
#[derive(Default)]
pub struct InMemoryNotificationStore {
    rows: RwLock<Vec<NotificationRecord>>,
    unavailable: AtomicBool,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Total number of stored records across all users
    pub async fn count(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Records in insertion order
    pub async fn all(&self) -> Vec<NotificationRecord> {
        self.rows.read().await.clone()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn insert(&self, notification: NewNotification) -> Result<i64, StoreError> {
        self.check_available()?;

        let mut rows = self.rows.write().await;
        let id = rows.len() as i64 + 1;
        rows.push(NotificationRecord {
            id,
            user_id: notification.user_id,
            message: notification.message,
            notification_type: notification.notification_type,
            is_read: false,
            created_at: notification.created_at,
        });
        Ok(id)
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<NotificationRecord>, StoreError> {
        self.check_available()?;

        let mut records: Vec<NotificationRecord> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(records)
    }

    async fn mark_read(&self, id: i64) -> Result<(), StoreError> {
        self.check_available()?;

        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                record.is_read = true;
                Ok(())
            }
            None => Err(StoreError::NotFound(id)),
        }
    }
}
