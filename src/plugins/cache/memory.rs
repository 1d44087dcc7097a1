//! In-process cache implementation
//!
//! Suitable for single-instance deployments and tests. Every operation runs in
//! one short critical section, which makes `increment_with_ttl` atomic. Expiry is
//! read from the injected clock so simulated time works end to end.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::clock::{system_clock, SharedClock};
use crate::error::CacheError;

use super::traits::CachePlugin;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// In-memory cache with per-entry expiry
pub struct MemoryCache {
    clock: SharedClock,
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    /// Creates a cache driven by the system clock
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Creates a cache driven by the given clock
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn expiry(&self, ttl: Duration) -> DateTime<Utc> {
        let ttl =
            chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        self.clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Deletes all expired entries and returns the count of deleted entries
    pub async fn purge_expired(&self) -> u64 {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        let initial_count = entries.len();

        entries.retain(|_, entry| !entry.is_expired(now));

        (initial_count - entries.len()) as u64
    }

    /// Number of stored entries, including expired ones not yet purged
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the cache holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CachePlugin for MemoryCache {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;

        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => {}
            None => return Ok(None),
        }

        // Expired: drop it eagerly
        entries.remove(key);
        Ok(None)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = self.expiry(ttl);
        let mut entries = self.entries.lock().await;

        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );

        Ok(())
    }

    async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, CacheError> {
        let now = self.clock.now();
        let expires_at = self.expiry(ttl);
        let mut entries = self.entries.lock().await;

        let current = match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.clone()),
            _ => None,
        };

        let (count, expires_at) = match current {
            Some(entry) => {
                let count: u64 = entry.value.parse().map_err(|_| {
                    CacheError::Serialization(format!("value at '{}' is not a counter", key))
                })?;
                (count + 1, entry.expires_at)
            }
            None => (1, expires_at),
        };

        entries.insert(
            key.to_string(),
            Entry {
                value: count.to_string(),
                expires_at,
            },
        );

        Ok(count)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
        Ok(())
    }
}
