//! Repository for the `probe_results` table.

use async_trait::async_trait;
use netwatch_core::models::{NewProbeResult, ProbeResult, ProbeStatus};
use netwatch_core::types::{new_string_id, Timestamp};
use sqlx::PgPool;

use super::parse_column;
use crate::error::RepoError;
use crate::repositories::ProbeResultRepository;

/// Column list for `probe_results` queries.
const COLUMNS: &str = "id, target_id, ping, download, upload, status, error, created_at";

#[derive(Debug, sqlx::FromRow)]
struct ProbeResultRow {
    id: String,
    target_id: String,
    ping: Option<f64>,
    download: Option<f64>,
    upload: Option<f64>,
    status: String,
    error: Option<String>,
    created_at: Timestamp,
}

impl TryFrom<ProbeResultRow> for ProbeResult {
    type Error = RepoError;

    fn try_from(row: ProbeResultRow) -> Result<Self, Self::Error> {
        Ok(Self {
            status: parse_column("probe_results.status", &row.status, ProbeStatus::parse)?,
            id: row.id,
            target_id: row.target_id,
            ping: row.ping,
            download: row.download,
            upload: row.upload,
            error: row.error,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PgProbeResultRepository {
    pool: PgPool,
}

impl PgProbeResultRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProbeResultRepository for PgProbeResultRepository {
    async fn create(&self, data: &NewProbeResult) -> Result<ProbeResult, RepoError> {
        let outcome = &data.outcome;
        let query = format!(
            "INSERT INTO probe_results (id, target_id, ping, download, upload, status, error) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, ProbeResultRow>(&query)
            .bind(new_string_id())
            .bind(&data.target_id)
            .bind(outcome.ping())
            .bind(outcome.download())
            .bind(outcome.upload())
            .bind(outcome.status().as_str())
            .bind(outcome.error())
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn find_by_target_id(
        &self,
        target_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<ProbeResult>, RepoError> {
        // A NULL limit means no limit in Postgres.
        let query = format!(
            "SELECT {COLUMNS} FROM probe_results \
             WHERE target_id = $1 \
             ORDER BY created_at DESC \
             LIMIT $2"
        );
        let rows = sqlx::query_as::<_, ProbeResultRow>(&query)
            .bind(target_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ProbeResult::try_from).collect()
    }
}
