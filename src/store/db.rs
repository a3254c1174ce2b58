//! PostgreSQL pool and schema bootstrap.
//!
//! Tables:
//! - `shopify_sessions`: one OAuth session blob per session id
//! - `shops`: one record per installed shop domain, token encrypted at rest

use sqlx::PgPool;
use std::time::Duration;

use crate::error::AppError;

/// Connect to PostgreSQL. `acquire_timeout` bounds every store round-trip
/// waiting on a connection.
pub async fn connect(db_url: &str, acquire_timeout: Duration) -> Result<PgPool, AppError> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(acquire_timeout)
        .connect(db_url)
        .await
        .map_err(|e| AppError::RegistryUnavailable(format!("Failed to connect to PostgreSQL: {e}")))
}

/// Run schema migrations. Safe to run on every start.
pub async fn migrate(pool: &PgPool) -> Result<(), AppError> {
    let map_err = |e: sqlx::Error| AppError::Internal(format!("migration failed: {e}"));

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS shopify_sessions (
            id          TEXT PRIMARY KEY,
            payload     JSONB NOT NULL,
            updated_at  TIMESTAMPTZ DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(map_err)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS shops (
            shop        TEXT PRIMARY KEY,
            token       TEXT,
            active      BOOLEAN NOT NULL DEFAULT false,
            invalid     BOOLEAN NOT NULL DEFAULT false,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(map_err)?;

    Ok(())
}
