//! Repository for the `push_subscriptions` table.

use async_trait::async_trait;
use netwatch_core::models::{NewPushSubscription, PushSubscription};
use netwatch_core::types::new_string_id;
use sqlx::PgPool;

use crate::error::RepoError;
use crate::repositories::PushSubscriptionRepository;

/// Column list for `push_subscriptions` queries.
const COLUMNS: &str = "id, user_id, endpoint, p256dh, auth";

#[derive(Debug, sqlx::FromRow)]
struct PushSubscriptionRow {
    id: String,
    user_id: String,
    endpoint: String,
    p256dh: String,
    auth: String,
}

impl From<PushSubscriptionRow> for PushSubscription {
    fn from(row: PushSubscriptionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            endpoint: row.endpoint,
            p256dh: row.p256dh,
            auth: row.auth,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgPushSubscriptionRepository {
    pool: PgPool,
}

impl PgPushSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PushSubscriptionRepository for PgPushSubscriptionRepository {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Vec<PushSubscription>, RepoError> {
        let query = format!("SELECT {COLUMNS} FROM push_subscriptions WHERE user_id = $1");
        let rows = sqlx::query_as::<_, PushSubscriptionRow>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(PushSubscription::from).collect())
    }

    /// Re-subscribing an existing endpoint replaces its owner and keys.
    async fn create(&self, data: &NewPushSubscription) -> Result<PushSubscription, RepoError> {
        let query = format!(
            "INSERT INTO push_subscriptions (id, user_id, endpoint, p256dh, auth) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (endpoint) DO UPDATE SET \
                user_id = EXCLUDED.user_id, \
                p256dh = EXCLUDED.p256dh, \
                auth = EXCLUDED.auth \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, PushSubscriptionRow>(&query)
            .bind(new_string_id())
            .bind(&data.user_id)
            .bind(&data.endpoint)
            .bind(&data.p256dh)
            .bind(&data.auth)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn delete(&self, id: &str) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("push subscription", id));
        }
        Ok(())
    }

    async fn delete_by_endpoint(&self, endpoint: &str) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE endpoint = $1")
            .bind(endpoint)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_by_user_id(&self, user_id: &str) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
