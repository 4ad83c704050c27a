//! Connection pool helpers.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::DbError;

/// Connect to `PostgreSQL` and build a connection pool.
///
/// # Errors
///
/// Returns `DbError::ConnectionFailed` if the database is unreachable or
/// the credentials are rejected.
pub async fn connect(database_url: &str) -> Result<PgPool, DbError> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
        .map_err(DbError::ConnectionFailed)
}
