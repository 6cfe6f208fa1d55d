//! Schema migrations for the tables this crate owns.
//!
//! Only the watermark table is owned here; tenant, runtime and label tables
//! belong to the platform of record and are read as-is.

use sqlx::PgPool;
use tracing::info;

use crate::error::SyncResult;

/// Run all pending migrations embedded from `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> SyncResult<()> {
    info!("Running tenant sync migrations");
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Tenant sync migrations completed");
    Ok(())
}
