//! Реализации брокера для relay.
//!
//! - [`RedisBroker`] — production: Redis PUBLISH/SUBSCRIBE.
//! - [`MemoryBroker`] — in-process каналы на mpsc, для тестов и изолированных прогонов gateway/listener.

pub mod memory;
pub mod redis_pubsub;

pub use memory::{MemoryBroker, MpscSubscription, OverflowPolicy};
pub use redis_pubsub::{redact_url, RedisBroker, RedisSubscription};
