//! Repository for the `targets` table.

use async_trait::async_trait;
use netwatch_core::models::{NewTarget, Target, TargetUpdate};
use netwatch_core::types::new_string_id;
use sqlx::PgPool;

use crate::error::RepoError;
use crate::repositories::TargetRepository;

/// Column list for `targets` queries.
const COLUMNS: &str = "id, name, address, owner_id";

#[derive(Debug, sqlx::FromRow)]
struct TargetRow {
    id: String,
    name: String,
    address: String,
    owner_id: String,
}

impl From<TargetRow> for Target {
    fn from(row: TargetRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            address: row.address,
            owner_id: row.owner_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgTargetRepository {
    pool: PgPool,
}

impl PgTargetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TargetRepository for PgTargetRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Target>, RepoError> {
        let query = format!("SELECT {COLUMNS} FROM targets WHERE id = $1");
        let row = sqlx::query_as::<_, TargetRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Target::from))
    }

    async fn find_by_owner_id(&self, owner_id: &str) -> Result<Vec<Target>, RepoError> {
        let query =
            format!("SELECT {COLUMNS} FROM targets WHERE owner_id = $1 ORDER BY created_at");
        let rows = sqlx::query_as::<_, TargetRow>(&query)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Target::from).collect())
    }

    async fn list_all(&self) -> Result<Vec<Target>, RepoError> {
        let query = format!("SELECT {COLUMNS} FROM targets ORDER BY created_at");
        let rows = sqlx::query_as::<_, TargetRow>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Target::from).collect())
    }

    async fn create(&self, data: &NewTarget) -> Result<Target, RepoError> {
        let query = format!(
            "INSERT INTO targets (id, name, address, owner_id) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, TargetRow>(&query)
            .bind(new_string_id())
            .bind(&data.name)
            .bind(&data.address)
            .bind(&data.owner_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn update(&self, id: &str, data: &TargetUpdate) -> Result<Target, RepoError> {
        let query = format!(
            "UPDATE targets SET \
                name = COALESCE($2, name), \
                address = COALESCE($3, address) \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, TargetRow>(&query)
            .bind(id)
            .bind(data.name.as_deref())
            .bind(data.address.as_deref())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Target::from)
            .ok_or_else(|| RepoError::not_found("target", id))
    }

    async fn delete(&self, id: &str) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM targets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("target", id));
        }
        Ok(())
    }
}
