//! Cache plugins for auth-service
//!
//! This module contains cache implementations for session entries, revocation
//! markers and rate-limit counters. The default implementation keeps state in
//! process memory, with a Redis backend for multi-instance deployments.

pub mod traits;

mod memory;
mod redis;

pub use traits::CachePlugin;

#[cfg(test)]
pub use traits::MockCachePlugin;

pub use memory::MemoryCache;
pub use redis::{RedisCache, RedisCacheConfig};
