//! Database migration management.
//!
//! Migrations are embedded at compile time from the `migrations/`
//! directory and run in filename order (0001_, 0002_, ...).

use sqlx::PgPool;

use crate::error::DbError;

/// Run all pending database migrations.
///
/// # Errors
///
/// Returns `DbError::MigrationFailed` if any migration fails to apply.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    tracing::info!("Running database migrations");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(DbError::MigrationFailed)?;

    tracing::info!("Migrations completed");
    Ok(())
}
