//! Repository for the `alert_rules` table.

use async_trait::async_trait;
use netwatch_core::models::{AlertRule, AlertRuleUpdate, Condition, Metric, NewAlertRule};
use netwatch_core::types::DbId;
use sqlx::PgPool;

use super::parse_column;
use crate::error::RepoError;
use crate::repositories::AlertRuleRepository;

/// Column list for `alert_rules` queries.
const COLUMNS: &str = "id, name, target_id, metric, condition, threshold, enabled";

#[derive(Debug, sqlx::FromRow)]
struct AlertRuleRow {
    id: DbId,
    name: String,
    target_id: String,
    metric: String,
    condition: String,
    threshold: f64,
    enabled: bool,
}

impl TryFrom<AlertRuleRow> for AlertRule {
    type Error = RepoError;

    fn try_from(row: AlertRuleRow) -> Result<Self, Self::Error> {
        Ok(Self {
            metric: parse_column("alert_rules.metric", &row.metric, Metric::parse)?,
            condition: parse_column("alert_rules.condition", &row.condition, Condition::parse)?,
            id: row.id,
            name: row.name,
            target_id: row.target_id,
            threshold: row.threshold,
            enabled: row.enabled,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PgAlertRuleRepository {
    pool: PgPool,
}

impl PgAlertRuleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertRuleRepository for PgAlertRuleRepository {
    async fn find_by_id(&self, id: DbId) -> Result<Option<AlertRule>, RepoError> {
        let query = format!("SELECT {COLUMNS} FROM alert_rules WHERE id = $1");
        let row = sqlx::query_as::<_, AlertRuleRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AlertRule::try_from).transpose()
    }

    async fn find_by_target_id(&self, target_id: &str) -> Result<Vec<AlertRule>, RepoError> {
        let query = format!("SELECT {COLUMNS} FROM alert_rules WHERE target_id = $1 ORDER BY id");
        let rows = sqlx::query_as::<_, AlertRuleRow>(&query)
            .bind(target_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(AlertRule::try_from).collect()
    }

    async fn create(&self, data: &NewAlertRule) -> Result<AlertRule, RepoError> {
        let query = format!(
            "INSERT INTO alert_rules (name, target_id, metric, condition, threshold, enabled) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, AlertRuleRow>(&query)
            .bind(&data.name)
            .bind(&data.target_id)
            .bind(data.metric.as_str())
            .bind(data.condition.as_str())
            .bind(data.threshold)
            .bind(data.enabled)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn update(&self, id: DbId, data: &AlertRuleUpdate) -> Result<AlertRule, RepoError> {
        let query = format!(
            "UPDATE alert_rules SET \
                name = COALESCE($2, name), \
                metric = COALESCE($3, metric), \
                condition = COALESCE($4, condition), \
                threshold = COALESCE($5, threshold), \
                enabled = COALESCE($6, enabled) \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, AlertRuleRow>(&query)
            .bind(id)
            .bind(data.name.as_deref())
            .bind(data.metric.map(Metric::as_str))
            .bind(data.condition.map(Condition::as_str))
            .bind(data.threshold)
            .bind(data.enabled)
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or_else(|| RepoError::not_found("alert rule", id))?
            .try_into()
    }

    async fn delete(&self, id: DbId) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM alert_rules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("alert rule", id));
        }
        Ok(())
    }

    async fn toggle_enabled(&self, id: DbId, enabled: bool) -> Result<AlertRule, RepoError> {
        let query =
            format!("UPDATE alert_rules SET enabled = $2 WHERE id = $1 RETURNING {COLUMNS}");
        let row = sqlx::query_as::<_, AlertRuleRow>(&query)
            .bind(id)
            .bind(enabled)
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or_else(|| RepoError::not_found("alert rule", id))?
            .try_into()
    }
}
