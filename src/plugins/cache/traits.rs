//! Cache plugin trait
//!
//! This module defines the CachePlugin trait that all cache implementations must
//! implement. The cache holds short-lived string values: session entries,
//! revocation markers and rate-limit counters.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::CacheError;

/// Trait for cache plugins
///
/// Implementations can use various storage backends like process memory or Redis.
/// `increment_with_ttl` must be atomic: concurrent callers on the same key never
/// lose an update and each observes a distinct count.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CachePlugin: Send + Sync {
    /// Returns the name of this cache plugin
    fn name(&self) -> &str;

    /// Retrieves a value by key
    ///
    /// Returns `Ok(Some(value))` if present and unexpired, `Ok(None)` otherwise.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores a value that expires after `ttl`
    ///
    /// If an entry with the same key exists, it will be overwritten.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Atomically increments a counter and returns the new value
    ///
    /// A missing key starts at zero. The `ttl` is applied only when the
    /// increment creates the key; later increments keep the original expiry.
    async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, CacheError>;

    /// Deletes an entry by key
    ///
    /// Returns `Ok(())` even if the entry doesn't exist.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: MockCachePlugin can be created and used
    #[tokio::test]
    async fn test_mock_cache_plugin() {
        let mut mock = MockCachePlugin::new();

        mock.expect_name().return_const("mock_cache".to_string());
        mock.expect_get()
            .with(mockall::predicate::eq("test_key"))
            .returning(|_| Ok(None));

        assert_eq!(mock.name(), "mock_cache");
        let result = mock.get("test_key").await;
        assert!(result.is_ok());
        assert!(result.unwrap().is_none());
    }

    // Test 2: MockCachePlugin increment
    #[tokio::test]
    async fn test_mock_cache_plugin_increment() {
        let mut mock = MockCachePlugin::new();
        mock.expect_increment_with_ttl()
            .withf(|key, ttl| key == "counter" && *ttl == Duration::from_secs(60))
            .returning(|_, _| Ok(1));

        let count = mock
            .increment_with_ttl("counter", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    // Test 3: MockCachePlugin surfaces errors
    #[tokio::test]
    async fn test_mock_cache_plugin_error() {
        let mut mock = MockCachePlugin::new();
        mock.expect_set_with_ttl()
            .returning(|_, _, _| Err(CacheError::Unavailable("down".to_string())));

        let result = mock.set_with_ttl("k", "v", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(CacheError::Unavailable(_))));
    }
}
