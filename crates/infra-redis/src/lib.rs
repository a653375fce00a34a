// resq Infrastructure - Redis Adapter
// Implements: QueueStore (lists + counters + native BLPOP)

mod queue_store;

pub use queue_store::{RedisQueueStore, RedisStoreConfig, DEFAULT_KEY_PREFIX};
