//! Persistence collaborators for the monitoring engine.
//!
//! [`repositories`] defines the narrow CRUD traits the services depend on.
//! Two implementations ship with the crate:
//!
//! - [`memory`] — process-local maps, used by tests and by the worker when
//!   no database is configured.
//! - [`postgres`] — `sqlx` runtime queries against the tables described in
//!   `schema.sql`.

use sqlx::postgres::PgPoolOptions;

pub mod error;
pub mod memory;
pub mod postgres;
pub mod repositories;

pub use error::RepoError;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to confirm the pool is usable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
