// Store selection by URL scheme

use anyhow::{Context, Result};
use resq_core::port::{InMemoryQueueStore, QueueStore};
use resq_core::ResqConfig;
use resq_infra_redis::{RedisQueueStore, RedisStoreConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Sqlite,
    Redis,
    Memory,
}

impl StoreKind {
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("sqlite:") {
            Some(StoreKind::Sqlite)
        } else if url.starts_with("redis://") || url.starts_with("rediss://") {
            Some(StoreKind::Redis)
        } else if url == "memory:" {
            Some(StoreKind::Memory)
        } else {
            None
        }
    }
}

/// Open the configured store
///
/// A `memory:` store lives only as long as the process; it is meant for
/// local experiments and tests.
pub async fn open_queue_store(settings: &ResqConfig) -> Result<Arc<dyn QueueStore>> {
    let url = settings.store_url.as_str();
    let kind = StoreKind::from_url(url)
        .with_context(|| format!("Unsupported store URL scheme: {}", url))?;
    if kind != StoreKind::Redis && settings.store_password.is_some() {
        warn!(store = ?kind, "store_password ignored for this store");
    }

    let store: Arc<dyn QueueStore> = match kind {
        StoreKind::Sqlite => Arc::new(
            resq_infra_sqlite::open_store(url)
                .await
                .context("SQLite store initialization failed")?,
        ),
        StoreKind::Redis => {
            let config = RedisStoreConfig::new(url)
                .with_password(settings.store_password.clone())
                .with_max_block_time(Duration::from_secs(settings.blpop_max_block_time_secs));
            Arc::new(
                RedisQueueStore::connect(config)
                    .await
                    .context("Redis store connection failed")?,
            )
        }
        StoreKind::Memory => Arc::new(InMemoryQueueStore::new()),
    };

    info!(store = ?kind, "Queue store ready");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_detection() {
        assert_eq!(StoreKind::from_url("sqlite://resq.db"), Some(StoreKind::Sqlite));
        assert_eq!(StoreKind::from_url("sqlite::memory:"), Some(StoreKind::Sqlite));
        assert_eq!(StoreKind::from_url("redis://127.0.0.1:6379/0"), Some(StoreKind::Redis));
        assert_eq!(StoreKind::from_url("rediss://cache:6380"), Some(StoreKind::Redis));
        assert_eq!(StoreKind::from_url("memory:"), Some(StoreKind::Memory));
        assert_eq!(StoreKind::from_url("postgres://db"), None);
    }

    #[tokio::test]
    async fn test_open_sqlite_memory_store() {
        let settings = ResqConfig {
            store_url: "sqlite::memory:".to_string(),
            ..Default::default()
        };
        let store = open_queue_store(&settings).await.unwrap();
        assert_eq!(store.size("default").await.unwrap(), 0);
        assert_eq!(store.incr("processed").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_open_memory_store() {
        let settings = ResqConfig {
            store_url: "memory:".to_string(),
            ..Default::default()
        };
        let store = open_queue_store(&settings).await.unwrap();
        assert_eq!(store.get("processed").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_scheme_is_error() {
        let settings = ResqConfig {
            store_url: "postgres://db".to_string(),
            ..Default::default()
        };
        let err = open_queue_store(&settings).await.err().unwrap();
        assert!(err.to_string().contains("Unsupported store URL scheme"));
    }
}
