//! SQLite implementation of the CredentialStore trait
//!
//! This module provides a SQLite-based credential store using rusqlite and
//! tokio-rusqlite for async operations. Requests are spread round-robin over a
//! small set of connections, each with its own background thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{ErrorCode, OptionalExtension};
use tokio_rusqlite::Connection;
use tracing::debug;

use super::migrations::CREATE_SCHEMA;
use super::CredentialStore;
use crate::error::{is_busy, StoreError};
use crate::models::{Identity, IdentityStatus};

/// SQLite credential store
pub struct SqliteCredentialStore {
    conns: Vec<Connection>,
    next: AtomicUsize,
}

impl SqliteCredentialStore {
    /// Open a credential store with a single connection
    ///
    /// Use `:memory:` for in-memory database or a file path for persistent storage.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        Self::with_pool_size(path, 1).await
    }

    /// Open a credential store with `pool_size` connections
    ///
    /// An in-memory database is private to its connection, so `:memory:` always
    /// gets exactly one.
    pub async fn with_pool_size(path: &str, pool_size: usize) -> Result<Self, StoreError> {
        let pool_size = if path == ":memory:" {
            1
        } else {
            pool_size.max(1)
        };

        let mut conns = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let conn = Connection::open(path).await?;
            conn.call(|conn| {
                conn.busy_timeout(std::time::Duration::from_secs(5))?;
                conn.execute_batch(CREATE_SCHEMA)?;
                Ok(())
            })
            .await
            .map_err(map_call_error)?;
            conns.push(conn);
        }

        debug!(path = path, pool_size = pool_size, "Opened credential store");

        Ok(Self {
            conns,
            next: AtomicUsize::new(0),
        })
    }

    /// Create a new in-memory store (useful for testing)
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::new(":memory:").await
    }

    /// Number of pooled connections
    pub fn pool_size(&self) -> usize {
        self.conns.len()
    }

    fn conn(&self) -> &Connection {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.conns.len();
        &self.conns[index]
    }
}

/// Separate SQL errors from a dead connection worker
fn map_call_error(e: tokio_rusqlite::Error) -> StoreError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) if is_busy(&e) => {
            StoreError::Unavailable(e.to_string())
        }
        tokio_rusqlite::Error::Rusqlite(e) => StoreError::Sqlite(e),
        other => StoreError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Identity, StoreError> {
        let identifier = identifier.to_string();

        let row = self
            .conn()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT identifier, credential_hash, status, metadata, created_at, updated_at
                    FROM identities
                    WHERE identifier = ?1
                    "#,
                )?;

                let row = stmt
                    .query_row([&identifier], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, Option<String>>(4)?,
                            row.get::<_, Option<String>>(5)?,
                        ))
                    })
                    .optional()?;

                Ok(row)
            })
            .await
            .map_err(map_call_error)?;

        let (identifier, credential_hash, status, metadata, created_at, updated_at) =
            row.ok_or(StoreError::NotFound)?;

        // An unreadable status must not grant access
        let status = status.parse().unwrap_or(IdentityStatus::Disabled);
        let metadata: HashMap<String, String> = serde_json::from_str(&metadata).unwrap_or_default();
        let created_at = parse_datetime(created_at).unwrap_or_else(Utc::now);
        let updated_at = parse_datetime(updated_at).unwrap_or(created_at);

        Ok(Identity {
            identifier,
            credential_hash,
            status,
            metadata,
            created_at,
            updated_at,
        })
    }

    async fn create_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        let identifier = identity.identifier.clone();
        let credential_hash = identity.credential_hash.clone();
        let status = identity.status.to_string();
        let metadata =
            serde_json::to_string(&identity.metadata).unwrap_or_else(|_| "{}".to_string());
        let created_at = identity.created_at.to_rfc3339();
        let updated_at = identity.updated_at.to_rfc3339();

        let inserted = self
            .conn()
            .call(move |conn| {
                let result = conn.execute(
                    r#"
                    INSERT INTO identities
                    (identifier, credential_hash, status, metadata, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                    rusqlite::params![
                        identifier,
                        credential_hash,
                        status,
                        metadata,
                        created_at,
                        updated_at
                    ],
                );

                match result {
                    Ok(_) => Ok(true),
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == ErrorCode::ConstraintViolation =>
                    {
                        Ok(false)
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(map_call_error)?;

        if !inserted {
            return Err(StoreError::Conflict(identity.identifier.clone()));
        }

        Ok(())
    }

    async fn set_status(&self, identifier: &str, status: IdentityStatus) -> Result<(), StoreError> {
        let identifier = identifier.to_string();
        let status = status.to_string();
        let updated_at = Utc::now().to_rfc3339();

        let updated = self
            .conn()
            .call(move |conn| {
                let rows = conn.execute(
                    "UPDATE identities SET status = ?1, updated_at = ?2 WHERE identifier = ?3",
                    rusqlite::params![status, updated_at, identifier],
                )?;
                Ok(rows)
            })
            .await
            .map_err(map_call_error)?;

        if updated == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }
}

/// Parse datetime string from SQLite
fn parse_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| {
                // Try parsing SQLite's datetime format
                chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|dt| dt.and_utc())
            })
    })
}
