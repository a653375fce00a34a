// Redis QueueStore Implementation
//
// Lists live under `<prefix>:queue:<name>`, counters under `<prefix>:stat:<name>`.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::FromRedisValue;
use resq_core::domain::{JobRecord, QueueId};
use resq_core::error::{AppError, Result};
use resq_core::port::QueueStore;
use std::fmt;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const DEFAULT_KEY_PREFIX: &str = "resq";

/// Extra response time granted to a BLPOP beyond its own block time
const BLOCKING_RESPONSE_GRACE: Duration = Duration::from_secs(1);

/// Idle blocking connections kept for reuse
const MAX_IDLE_BLOCKING_CONNECTIONS: usize = 64;

/// BLPOP treats 0 as "block forever"; never send less than this
const MIN_BLPOP_SECS: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    pub url: String,
    pub password: Option<String>,
    pub key_prefix: String,
    /// Longest single BLPOP; longer waits are split into several
    pub max_block_time: Duration,
}

impl RedisStoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            password: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            max_block_time: Duration::from_secs(1),
        }
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_max_block_time(mut self, max_block_time: Duration) -> Self {
        self.max_block_time = max_block_time;
        self
    }

    /// URL with the password injected, unless the URL already carries credentials
    fn connection_url(&self) -> String {
        match &self.password {
            Some(password) if !self.url.contains('@') => match self.url.split_once("://") {
                Some((scheme, rest)) => format!("{}://:{}@{}", scheme, password, rest),
                None => self.url.clone(),
            },
            _ => self.url.clone(),
        }
    }
}

fn queue_key(prefix: &str, queue: &str) -> String {
    format!("{}:queue:{}", prefix, queue)
}

fn stat_key(prefix: &str, name: &str) -> String {
    format!("{}:stat:{}", prefix, name)
}

/// Queue name back from a full list key
fn queue_name<'a>(prefix: &str, key: &'a str) -> &'a str {
    key.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix(":queue:"))
        .unwrap_or(key)
}

/// Commands whose repetition cannot change the outcome
fn is_retry_safe(operation: &str) -> bool {
    matches!(operation, "LLEN" | "GET" | "TIME" | "DEL")
}

fn store_error(operation: &str, err: redis::RedisError) -> AppError {
    AppError::Store(format!("redis {} failed: {}", operation, err))
}

pub struct RedisQueueStore {
    client: redis::Client,
    key_prefix: String,
    max_block_time: Duration,
    connection: Mutex<Option<MultiplexedConnection>>,
    blocking: StdMutex<Vec<MultiplexedConnection>>,
}

impl RedisQueueStore {
    /// Build the client; no connection is made until the first command
    pub fn new(config: RedisStoreConfig) -> Result<Self> {
        let client = redis::Client::open(config.connection_url().as_str())
            .map_err(|e| AppError::Config(format!("invalid redis url '{}': {}", config.url, e)))?;
        Ok(Self {
            client,
            key_prefix: config.key_prefix,
            max_block_time: config.max_block_time.max(Duration::from_millis(10)),
            connection: Mutex::new(None),
            blocking: StdMutex::new(Vec::new()),
        })
    }

    /// Connect eagerly, surfacing a bad address at startup
    pub async fn connect(config: RedisStoreConfig) -> Result<Self> {
        let store = Self::new(config)?;
        store.shared_connection().await?;
        Ok(store)
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    async fn shared_connection(&self) -> Result<MultiplexedConnection> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| store_error("connect", e))?;
        debug!(key_prefix = %self.key_prefix, "Redis store connected");
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn reset_shared_connection(&self) {
        *self.connection.lock().await = None;
    }

    /// Run one command on the shared connection
    ///
    /// A failure always drops the connection. Only commands that are safe to
    /// repeat are re-sent on a fresh one: a mutation whose reply was lost may
    /// already have been applied, so it surfaces as `AppError::Store` and the
    /// caller decides.
    async fn run_command<T, F>(&self, operation: &'static str, build: F) -> Result<T>
    where
        T: FromRedisValue + Send,
        F: Fn() -> redis::Cmd,
    {
        let attempts = if is_retry_safe(operation) { 2 } else { 1 };
        let mut last_err = None;
        for attempt in 0..attempts {
            let mut conn = self.shared_connection().await?;
            let result: redis::RedisResult<T> = build().query_async(&mut conn).await;
            match result {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempt = attempt + 1, "Redis command succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    warn!(operation, attempt = attempt + 1, error = %err, "Redis command failed, reconnecting");
                    self.reset_shared_connection().await;
                    last_err = Some(err);
                }
            }
        }
        Err(match last_err {
            Some(err) => store_error(operation, err),
            None => AppError::Store(format!("redis {} failed", operation)),
        })
    }

    /// A connection reserved for BLPOP, whose response timeout covers the block time
    async fn checkout_blocking(&self) -> Result<MultiplexedConnection> {
        let idle = self
            .blocking
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop();
        if let Some(conn) = idle {
            return Ok(conn);
        }

        let config = redis::AsyncConnectionConfig::new()
            .set_response_timeout(Some(self.max_block_time + BLOCKING_RESPONSE_GRACE));
        self.client
            .get_multiplexed_async_connection_with_config(&config)
            .await
            .map_err(|e| store_error("connect", e))
    }

    fn checkin_blocking(&self, conn: MultiplexedConnection) {
        let mut idle = self
            .blocking
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if idle.len() < MAX_IDLE_BLOCKING_CONNECTIONS {
            idle.push(conn);
        }
    }
}

impl fmt::Debug for RedisQueueStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisQueueStore")
            .field("key_prefix", &self.key_prefix)
            .field("max_block_time", &self.max_block_time)
            .finish()
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    async fn push(&self, queue: &str, item: &JobRecord) -> Result<()> {
        let key = queue_key(&self.key_prefix, queue);
        let _len: i64 = self
            .run_command("RPUSH", || {
                let mut cmd = redis::cmd("RPUSH");
                cmd.arg(&key).arg(item.as_str());
                cmd
            })
            .await?;
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<Option<JobRecord>> {
        let key = queue_key(&self.key_prefix, queue);
        let payload: Option<String> = self
            .run_command("LPOP", || {
                let mut cmd = redis::cmd("LPOP");
                cmd.arg(&key);
                cmd
            })
            .await?;
        Ok(payload.map(JobRecord::from_raw))
    }

    async fn size(&self, queue: &str) -> Result<i64> {
        let key = queue_key(&self.key_prefix, queue);
        self.run_command("LLEN", || {
            let mut cmd = redis::cmd("LLEN");
            cmd.arg(&key);
            cmd
        })
        .await
    }

    async fn now(&self) -> Result<i64> {
        let (secs, micros): (i64, i64) = self.run_command("TIME", || redis::cmd("TIME")).await?;
        Ok(secs * 1000 + micros / 1000)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let key = stat_key(&self.key_prefix, key);
        self.run_command("INCR", || {
            let mut cmd = redis::cmd("INCR");
            cmd.arg(&key);
            cmd
        })
        .await
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        let key = stat_key(&self.key_prefix, key);
        self.run_command("DECR", || {
            let mut cmd = redis::cmd("DECR");
            cmd.arg(&key);
            cmd
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<i64> {
        let key = stat_key(&self.key_prefix, key);
        let value: Option<i64> = self
            .run_command("GET", || {
                let mut cmd = redis::cmd("GET");
                cmd.arg(&key);
                cmd
            })
            .await?;
        Ok(value.unwrap_or(0))
    }

    async fn clear(&self, key: &str) -> Result<bool> {
        let key = stat_key(&self.key_prefix, key);
        let removed: i64 = self
            .run_command("DEL", || {
                let mut cmd = redis::cmd("DEL");
                cmd.arg(&key);
                cmd
            })
            .await?;
        Ok(removed > 0)
    }

    /// Native BLPOP across the queue keys, in priority order
    ///
    /// Runs on a dedicated connection so it never stalls the shared one.
    async fn blocking_pop(
        &self,
        queues: &[QueueId],
        timeout: Duration,
    ) -> Result<Option<(QueueId, JobRecord)>> {
        if queues.is_empty() {
            return Ok(None);
        }

        let keys: Vec<String> = queues
            .iter()
            .map(|queue| queue_key(&self.key_prefix, queue))
            .collect();
        let deadline = Instant::now() + timeout;
        let mut conn = self.checkout_blocking().await?;

        loop {
            let slice = deadline
                .saturating_duration_since(Instant::now())
                .min(self.max_block_time);
            let block_secs = slice.as_secs_f64().max(MIN_BLPOP_SECS);

            let reply: redis::RedisResult<Option<(String, String)>> = redis::cmd("BLPOP")
                .arg(&keys)
                .arg(block_secs)
                .query_async(&mut conn)
                .await;

            match reply {
                Ok(Some((key, payload))) => {
                    self.checkin_blocking(conn);
                    let queue = queue_name(&self.key_prefix, &key).to_string();
                    return Ok(Some((queue, JobRecord::from_raw(payload))));
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        self.checkin_blocking(conn);
                        return Ok(None);
                    }
                }
                // The connection is dropped: its state is unknown after an error
                Err(err) => return Err(store_error("BLPOP", err)),
            }
        }
    }
}
