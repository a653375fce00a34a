// Migration Runner
// Each migration file records its own version in schema_version

use crate::queue_store::map_sqlx_error;
use resq_core::error::Result;
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Ordered (version, description, sql)
const MIGRATIONS: &[(i64, &str, &str)] = &[(
    1,
    "queue lists and stat counters",
    include_str!("../migrations/001_queue_store.sql"),
)];

/// Bring the schema up to the latest version
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current = schema_version(pool).await?;
    debug!(version = current, "Current schema version");

    for (version, description, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
        info!(version, description, "Applying migration");
        apply_migration(pool, sql).await?;
    }
    Ok(())
}

/// Highest applied version, 0 on a fresh database
async fn schema_version(pool: &SqlitePool) -> Result<i64> {
    let has_table: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
    )
    .fetch_one(pool)
    .await
    .map_err(map_sqlx_error)?;
    if !has_table {
        return Ok(0);
    }

    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await
        .map_err(map_sqlx_error)?;
    Ok(version.unwrap_or(0))
}

/// Statements of one file, without `--` comment lines
fn statements(sql: &str) -> impl Iterator<Item = String> + '_ {
    sql.split(';')
        .map(|chunk| {
            chunk
                .lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .map(|statement| statement.trim().to_string())
        .filter(|statement| !statement.is_empty())
}

/// All statements of a migration commit together or not at all
async fn apply_migration(pool: &SqlitePool, sql: &str) -> Result<()> {
    let mut tx = pool.begin().await.map_err(map_sqlx_error)?;
    for statement in statements(sql) {
        sqlx::query(&statement)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
    }
    tx.commit().await.map_err(map_sqlx_error)
}
