//! Repository for the `user_speed_test_preferences` table.

use async_trait::async_trait;
use netwatch_core::models::UserSpeedTestPreference;
use sqlx::PgPool;

use crate::error::RepoError;
use crate::repositories::SpeedTestPreferenceRepository;

#[derive(Debug, Clone)]
pub struct PgSpeedTestPreferenceRepository {
    pool: PgPool,
}

impl PgSpeedTestPreferenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SpeedTestPreferenceRepository for PgSpeedTestPreferenceRepository {
    async fn find_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<UserSpeedTestPreference>, RepoError> {
        let url_id: Option<String> = sqlx::query_scalar(
            "SELECT speed_test_url_id FROM user_speed_test_preferences WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(url_id.map(|speed_test_url_id| UserSpeedTestPreference {
            user_id: user_id.to_string(),
            speed_test_url_id,
        }))
    }

    async fn upsert(&self, preference: &UserSpeedTestPreference) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO user_speed_test_preferences (user_id, speed_test_url_id) \
             VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET \
                speed_test_url_id = EXCLUDED.speed_test_url_id, \
                updated_at = NOW()",
        )
        .bind(&preference.user_id)
        .bind(&preference.speed_test_url_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
