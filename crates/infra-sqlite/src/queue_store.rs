// SQLite QueueStore Implementation

use async_trait::async_trait;
use resq_core::domain::JobRecord;
use resq_core::error::{AppError, Result};
use resq_core::port::{QueueStore, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;

// Helper to convert sqlx::Error to AppError with structured information
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "5" => AppError::Store(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => AppError::Store(format!("Database full: {}", db_err.message())),
                    _ => AppError::Store(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Store(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::ColumnNotFound(col) => AppError::Store(format!("Column not found: {}", col)),
        // Connection, pool, protocol errors
        _ => AppError::Store(err.to_string()),
    }
}

/// Queue lists and counters in one SQLite database
///
/// Every operation is a single statement, so atomicity comes from SQLite itself.
pub struct SqliteQueueStore {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteQueueStore {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Atomically add `delta` to a counter, creating it when absent
    async fn add(&self, key: &str, delta: i64) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO stats (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = value + excluded.value
            RETURNING value
            "#,
        )
        .bind(key)
        .bind(delta)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn push(&self, queue: &str, item: &JobRecord) -> Result<()> {
        sqlx::query("INSERT INTO queue_items (queue, payload, enqueued_at) VALUES (?, ?, ?)")
            .bind(queue)
            .bind(item.as_str())
            .bind(self.time_provider.now_millis())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<Option<JobRecord>> {
        // Select and delete in one statement: two poppers never get the same row
        let payload: Option<String> = sqlx::query_scalar(
            r#"
            DELETE FROM queue_items
            WHERE id = (
                SELECT id FROM queue_items
                WHERE queue = ?
                ORDER BY id ASC
                LIMIT 1
            )
            RETURNING payload
            "#,
        )
        .bind(queue)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(payload.map(JobRecord::from_raw))
    }

    async fn size(&self, queue: &str) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM queue_items WHERE queue = ?")
            .bind(queue)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn now(&self) -> Result<i64> {
        Ok(self.time_provider.now_millis())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.add(key, 1).await
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        self.add(key, -1).await
    }

    async fn get(&self, key: &str) -> Result<i64> {
        let value: Option<i64> = sqlx::query_scalar("SELECT value FROM stats WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(value.unwrap_or(0))
    }

    async fn clear(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM stats WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use resq_core::domain::{Job, JobArgs};
    use resq_core::port::time_provider::mocks::MockTimeProvider;
    use resq_core::port::SystemTimeProvider;
    use std::time::Duration;

    async fn setup_test_store() -> SqliteQueueStore {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteQueueStore::new(pool, Arc::new(SystemTimeProvider))
    }

    fn record(name: &str) -> JobRecord {
        JobRecord::encode(&Job::new(name, "q", JobArgs::new(), 1)).unwrap()
    }

    #[tokio::test]
    async fn test_push_pop_fifo() {
        let store = setup_test_store().await;
        store.push("q", &record("first")).await.unwrap();
        store.push("q", &record("second")).await.unwrap();
        store.push("other", &record("elsewhere")).await.unwrap();

        assert_eq!(store.pop("q").await.unwrap(), Some(record("first")));
        assert_eq!(store.pop("q").await.unwrap(), Some(record("second")));
        assert_eq!(store.pop("q").await.unwrap(), None);
        assert_eq!(store.size("other").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pop_empty_queue_is_none() {
        let store = setup_test_store().await;
        let popped = tokio_test::assert_ok!(store.pop("never-pushed").await);
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn test_size_is_pushes_minus_pops() {
        let store = setup_test_store().await;
        for i in 0..7 {
            store.push("q", &record(&i.to_string())).await.unwrap();
        }
        for _ in 0..3 {
            store.pop("q").await.unwrap();
        }
        assert_eq!(store.size("q").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_counters() {
        let store = setup_test_store().await;
        assert_eq!(store.get("processed").await.unwrap(), 0);
        assert_eq!(store.incr("processed").await.unwrap(), 1);
        assert_eq!(store.incr("processed").await.unwrap(), 2);
        assert_eq!(store.decr("processed").await.unwrap(), 1);
        assert_eq!(store.get("processed").await.unwrap(), 1);

        assert!(store.clear("processed").await.unwrap());
        assert!(!store.clear("processed").await.unwrap());
        assert_eq!(store.get("processed").await.unwrap(), 0);

        // Decrement of an absent counter starts from zero
        assert_eq!(store.decr("fresh").await.unwrap(), -1);
    }

    #[tokio::test]
    async fn test_concurrent_increments() {
        let store = Arc::new(setup_test_store().await);
        let increments = (0..50).map(|_| {
            let store = store.clone();
            async move { store.incr("hits").await }
        });

        let results = futures::future::join_all(increments).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(store.get("hits").await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_now_and_enqueued_at_from_time_provider() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let clock = Arc::new(MockTimeProvider::new(1_000));
        let store = SqliteQueueStore::new(pool, clock.clone());

        store.push("q", &record("x")).await.unwrap();
        clock.advance(500);

        assert_eq!(store.now().await.unwrap(), 1_500);
        let enqueued_at: i64 = sqlx::query_scalar("SELECT enqueued_at FROM queue_items")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(enqueued_at, 1_000);
    }

    #[tokio::test]
    async fn test_blocking_pop_polls_in_priority_order() {
        let store = setup_test_store().await;
        let queues = vec!["high".to_string(), "low".to_string()];

        assert!(store
            .blocking_pop(&queues, Duration::from_millis(120))
            .await
            .unwrap()
            .is_none());

        store.push("low", &record("l")).await.unwrap();
        store.push("high", &record("h")).await.unwrap();

        let (queue, item) = store
            .blocking_pop(&queues, Duration::from_millis(120))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(queue, "high");
        assert_eq!(item, record("h"));
    }
}
