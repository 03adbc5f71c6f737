//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL batch
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 2;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        2 => apply_v2(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Directory: the slice of users/categories/tasks sharing needs
        CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            email TEXT NOT NULL UNIQUE            -- normalized (trimmed, lower-case)
        );

        CREATE TABLE categories (
            id INTEGER PRIMARY KEY,
            owner_id INTEGER NOT NULL,
            name TEXT NOT NULL
        );

        CREATE TABLE tasks (
            id INTEGER PRIMARY KEY,
            owner_id INTEGER NOT NULL,
            category_id INTEGER,                  -- nullable: uncategorized task
            title TEXT NOT NULL
        );

        -- Share request ledger: never deleted
        CREATE TABLE share_requests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            requester_id INTEGER NOT NULL,
            scope_type TEXT NOT NULL,             -- 'category' | 'task' | 'global'
            resource_id INTEGER,                  -- NULL for 'global'
            recipient_email TEXT NOT NULL,
            token TEXT NOT NULL UNIQUE,
            permission TEXT NOT NULL,             -- 'view' | 'edit'
            status TEXT NOT NULL DEFAULT 'pending',
            expires_at INTEGER NOT NULL,
            responded_at INTEGER,
            created_at INTEGER NOT NULL,

            CHECK (permission IN ('view', 'edit')),
            CHECK (status IN ('pending', 'approved', 'rejected', 'cancelled')),
            CHECK (scope_type IN ('category', 'task', 'global'))
        );

        -- At most one pending request per (requester, scope, recipient)
        CREATE UNIQUE INDEX idx_share_requests_one_pending
            ON share_requests(requester_id, scope_type, IFNULL(resource_id, 0), recipient_email)
            WHERE status = 'pending';

        CREATE INDEX idx_share_requests_requester ON share_requests(requester_id, created_at);
        CREATE INDEX idx_share_requests_recipient ON share_requests(recipient_email, created_at);

        -- Grant store: category grants and legacy per-task grants
        CREATE TABLE grants (
            resource_type TEXT NOT NULL,          -- 'category' | 'task'
            resource_id INTEGER NOT NULL,
            grantee_id INTEGER NOT NULL,
            permission TEXT NOT NULL,
            created_at INTEGER NOT NULL,

            PRIMARY KEY (resource_type, resource_id, grantee_id),
            CHECK (permission IN ('view', 'edit')),
            CHECK (resource_type IN ('category', 'task'))
        );

        CREATE INDEX idx_grants_grantee ON grants(grantee_id);

        -- Legacy "share all my tasks" grants
        CREATE TABLE global_grants (
            owner_id INTEGER NOT NULL,
            grantee_id INTEGER NOT NULL,
            permission TEXT NOT NULL,
            created_at INTEGER NOT NULL,

            PRIMARY KEY (owner_id, grantee_id),
            CHECK (permission IN ('view', 'edit'))
        );
        "#,
    )?;

    Ok(())
}

/// Migration v2: `expired` status and the `granted_at` marker.
///
/// SQLite cannot alter a CHECK constraint, so `share_requests` is rebuilt.
/// Approved category requests whose recipient already holds the grant are
/// marked granted as of their response time.
fn apply_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE share_requests_v2 (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            requester_id INTEGER NOT NULL,
            scope_type TEXT NOT NULL,
            resource_id INTEGER,
            recipient_email TEXT NOT NULL,
            token TEXT NOT NULL UNIQUE,
            permission TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            expires_at INTEGER NOT NULL,
            responded_at INTEGER,
            created_at INTEGER NOT NULL,
            granted_at INTEGER,                   -- set once the grant exists

            CHECK (permission IN ('view', 'edit')),
            CHECK (status IN ('pending', 'approved', 'rejected', 'cancelled', 'expired')),
            CHECK (scope_type IN ('category', 'task', 'global'))
        );

        INSERT INTO share_requests_v2 (
            id, requester_id, scope_type, resource_id, recipient_email, token,
            permission, status, expires_at, responded_at, created_at
        )
        SELECT id, requester_id, scope_type, resource_id, recipient_email, token,
               permission, status, expires_at, responded_at, created_at
        FROM share_requests;

        DROP TABLE share_requests;
        ALTER TABLE share_requests_v2 RENAME TO share_requests;

        CREATE UNIQUE INDEX idx_share_requests_one_pending
            ON share_requests(requester_id, scope_type, IFNULL(resource_id, 0), recipient_email)
            WHERE status = 'pending';

        CREATE INDEX idx_share_requests_requester ON share_requests(requester_id, created_at);
        CREATE INDEX idx_share_requests_recipient ON share_requests(recipient_email, created_at);

        UPDATE share_requests
        SET granted_at = IFNULL(responded_at, created_at)
        WHERE status = 'approved'
          AND scope_type = 'category'
          AND EXISTS (
              SELECT 1 FROM grants g
              JOIN users u ON u.id = g.grantee_id
              WHERE g.resource_type = 'category'
                AND g.resource_id = share_requests.resource_id
                AND u.email = share_requests.recipient_email
          );
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
