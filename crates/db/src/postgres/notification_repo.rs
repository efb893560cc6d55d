//! Repository for the `notifications` table.

use async_trait::async_trait;
use netwatch_core::models::{NewNotification, Notification};
use netwatch_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::error::RepoError;
use crate::repositories::NotificationRepository;

/// Column list for `notifications` queries.
const COLUMNS: &str = r#"id, user_id, message, "read", sent_at"#;

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: DbId,
    user_id: String,
    message: String,
    read: bool,
    sent_at: Timestamp,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            message: row.message,
            read: row.read,
            sent_at: row.sent_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgNotificationRepository {
    pool: PgPool,
}

impl PgNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn create(&self, data: &NewNotification) -> Result<Notification, RepoError> {
        let query = format!(
            "INSERT INTO notifications (user_id, message) \
             VALUES ($1, $2) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, NotificationRow>(&query)
            .bind(&data.user_id)
            .bind(&data.message)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Vec<Notification>, RepoError> {
        let query = format!(
            "SELECT {COLUMNS} FROM notifications \
             WHERE user_id = $1 \
             ORDER BY sent_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, NotificationRow>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Notification::from).collect())
    }

    async fn mark_as_read(&self, id: DbId) -> Result<Notification, RepoError> {
        let query =
            format!(r#"UPDATE notifications SET "read" = true WHERE id = $1 RETURNING {COLUMNS}"#);
        let row = sqlx::query_as::<_, NotificationRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Notification::from)
            .ok_or_else(|| RepoError::not_found("notification", id))
    }

    /// Returns the number of notifications marked read.
    async fn mark_all_as_read_by_user_id(&self, user_id: &str) -> Result<u64, RepoError> {
        let result = sqlx::query(
            r#"UPDATE notifications SET "read" = true WHERE user_id = $1 AND "read" = false"#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, id: DbId) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("notification", id));
        }
        Ok(())
    }
}
