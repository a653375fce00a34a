// SQLite Connection Pool Setup

use crate::queue_store::{map_sqlx_error, SqliteQueueStore};
use crate::run_migrations;
use resq_core::error::Result;
use resq_core::port::{SystemTimeProvider, TimeProvider};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Create SQLite connection pool with WAL mode and a busy timeout
///
/// An in-memory database exists per connection, so `:memory:` URLs get a
/// single-connection pool.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let in_memory = database_url.contains(":memory:");

    let mut options = SqliteConnectOptions::from_str(database_url)
        .map_err(map_sqlx_error)?
        .busy_timeout(Duration::from_secs(5))
        .create_if_missing(true);
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(if in_memory { 1 } else { 10 })
        .connect_with(options)
        .await
        .map_err(map_sqlx_error)?;

    info!(url = %database_url, "SQLite pool ready");
    Ok(pool)
}

/// Pool + migrations + store, as used by the binaries
pub async fn open_store(database_url: &str) -> Result<SqliteQueueStore> {
    let pool = create_pool(database_url).await?;
    run_migrations(&pool).await?;
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    Ok(SqliteQueueStore::new(pool, time_provider))
}
