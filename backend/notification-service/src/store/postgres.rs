use super::{NotificationStore, StoreError};
use crate::models::{NewNotification, NotificationRecord};
use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::PgPool;
use tracing::{debug, info};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// PostgreSQL-backed store over an injected pool
#[derive(Clone)]
pub struct PgNotificationStore {
    db: PgPool,
}

impl PgNotificationStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn insert(&self, notification: NewNotification) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO notifications (user_id, message, type, is_read, created_at)
            VALUES ($1, $2, $3, FALSE, $4)
            RETURNING id
            "#,
        )
        .bind(notification.user_id)
        .bind(&notification.message)
        .bind(&notification.notification_type)
        .bind(notification.created_at)
        .fetch_one(&self.db)
        .await?;

        info!(
            notification_id = id,
            user_id = notification.user_id,
            "Created notification"
        );
        Ok(id)
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<NotificationRecord>, StoreError> {
        let records = sqlx::query_as::<_, NotificationRecord>(
            r#"
            SELECT id, user_id, message, type, is_read, created_at
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        debug!(user_id, count = records.len(), "Listed notifications");
        Ok(records)
    }

    async fn mark_read(&self, id: i64) -> Result<(), StoreError> {
        // Postgres counts a matched row even when the value does not change,
        // so a repeated mark still reports one affected row.
        let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}
