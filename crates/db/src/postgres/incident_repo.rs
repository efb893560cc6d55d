//! Repository for the `incident_events` table.

use async_trait::async_trait;
use netwatch_core::models::{IncidentEvent, IncidentType, NewIncident};
use netwatch_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use super::parse_column;
use crate::error::RepoError;
use crate::repositories::IncidentRepository;

/// Column list for `incident_events` queries.
const COLUMNS: &str = r#"id, target_id, rule_id, "type", description, resolved, "timestamp""#;

#[derive(Debug, sqlx::FromRow)]
struct IncidentRow {
    id: DbId,
    target_id: String,
    rule_id: Option<DbId>,
    #[sqlx(rename = "type")]
    incident_type: String,
    description: String,
    resolved: bool,
    timestamp: Timestamp,
}

impl TryFrom<IncidentRow> for IncidentEvent {
    type Error = RepoError;

    fn try_from(row: IncidentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            incident_type: parse_column(
                "incident_events.type",
                &row.incident_type,
                IncidentType::parse,
            )?,
            id: row.id,
            target_id: row.target_id,
            rule_id: row.rule_id,
            description: row.description,
            resolved: row.resolved,
            timestamp: row.timestamp,
        })
    }
}

fn collect(rows: Vec<IncidentRow>) -> Result<Vec<IncidentEvent>, RepoError> {
    rows.into_iter().map(IncidentEvent::try_from).collect()
}

#[derive(Debug, Clone)]
pub struct PgIncidentRepository {
    pool: PgPool,
}

impl PgIncidentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IncidentRepository for PgIncidentRepository {
    async fn create(&self, data: &NewIncident) -> Result<IncidentEvent, RepoError> {
        let query = format!(
            r#"INSERT INTO incident_events (target_id, rule_id, "type", description)
               VALUES ($1, $2, $3, $4)
               RETURNING {COLUMNS}"#
        );
        let row = sqlx::query_as::<_, IncidentRow>(&query)
            .bind(&data.target_id)
            .bind(data.rule_id)
            .bind(data.incident_type.as_str())
            .bind(&data.description)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<IncidentEvent>, RepoError> {
        let query = format!("SELECT {COLUMNS} FROM incident_events WHERE id = $1");
        let row = sqlx::query_as::<_, IncidentRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(IncidentEvent::try_from).transpose()
    }

    async fn find_by_target_id(&self, target_id: &str) -> Result<Vec<IncidentEvent>, RepoError> {
        let query = format!(
            r#"SELECT {COLUMNS} FROM incident_events
               WHERE target_id = $1
               ORDER BY "timestamp" DESC, id DESC"#
        );
        let rows = sqlx::query_as::<_, IncidentRow>(&query)
            .bind(target_id)
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn find_unresolved(&self) -> Result<Vec<IncidentEvent>, RepoError> {
        let query = format!(
            r#"SELECT {COLUMNS} FROM incident_events
               WHERE resolved = false
               ORDER BY "timestamp" DESC, id DESC"#
        );
        let rows = sqlx::query_as::<_, IncidentRow>(&query)
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn resolve(&self, id: DbId) -> Result<IncidentEvent, RepoError> {
        let query =
            format!("UPDATE incident_events SET resolved = true WHERE id = $1 RETURNING {COLUMNS}");
        let row = sqlx::query_as::<_, IncidentRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or_else(|| RepoError::not_found("incident", id))?
            .try_into()
    }
}
