//! Database migrations for auth-service
//!
//! This module contains SQL migrations for the SQLite credential store schema.

/// SQL statement to create the initial database schema
pub const CREATE_SCHEMA: &str = r#"
-- Registered identities and their hashed credentials
CREATE TABLE IF NOT EXISTS identities (
    identifier TEXT PRIMARY KEY,
    credential_hash TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_identities_status ON identities(status);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: Schema applies cleanly and is idempotent
    #[test]
    fn test_schema_is_idempotent() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(CREATE_SCHEMA).unwrap();
        conn.execute_batch(CREATE_SCHEMA).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'identities'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    // Test 2: Status defaults to active
    #[test]
    fn test_status_default() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(CREATE_SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO identities (identifier, credential_hash) VALUES ('alice', 'h')",
            [],
        )
        .unwrap();

        let status: String = conn
            .query_row(
                "SELECT status FROM identities WHERE identifier = 'alice'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(status, "active");
    }
}
