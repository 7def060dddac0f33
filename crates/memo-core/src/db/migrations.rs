//! Database migrations
//!
//! The local store and the SQLite-backed remote store keep separate schemas;
//! both are versioned through a `schema_version` table.

use crate::error::Result;
use rusqlite::Connection;

/// A schema with its ordered list of migrations (index + 1 = version).
pub struct Schema {
    pub name: &'static str,
    pub migrations: &'static [&'static str],
}

impl Schema {
    /// Version reached once every migration has been applied.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub const fn current_version(&self) -> i32 {
        self.migrations.len() as i32
    }
}

/// Key-value schema of the on-device store.
pub const LOCAL_SCHEMA: Schema = Schema {
    name: "local",
    migrations: &[
        // v1: key-value collections
        "CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );",
    ],
};

/// User-scoped schema of the SQLite remote store.
pub const REMOTE_SCHEMA: Schema = Schema {
    name: "remote",
    migrations: &[
        // v1: notes, categories and note order per user
        "CREATE TABLE IF NOT EXISTS remote_notes (
            user_id TEXT NOT NULL,
            id INTEGER NOT NULL,
            text TEXT NOT NULL,
            category TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            completed INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT,
            deleted INTEGER NOT NULL DEFAULT 0,
            position INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (user_id, id)
        );
        CREATE INDEX IF NOT EXISTS idx_remote_notes_user ON remote_notes(user_id, position);
        CREATE TABLE IF NOT EXISTS remote_categories (
            user_id TEXT NOT NULL,
            key TEXT NOT NULL,
            name TEXT NOT NULL,
            icon TEXT NOT NULL,
            color TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (user_id, key)
        );
        CREATE TABLE IF NOT EXISTS remote_note_order (
            user_id TEXT PRIMARY KEY,
            note_ids TEXT NOT NULL
        );",
    ],
};

/// Run all pending migrations of `schema`
pub fn run(conn: &Connection, schema: &Schema) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )?;

    let version = get_version(conn)?;
    for (index, statements) in schema.migrations.iter().enumerate() {
        let target = i32::try_from(index + 1).unwrap_or(i32::MAX);
        if target <= version {
            continue;
        }

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(statements)?;
        tx.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [target],
        )?;
        tx.commit()?;

        tracing::info!("Migrated {} database to version {target}", schema.name);
    }

    Ok(())
}

/// Get the current schema version
pub fn get_version(conn: &Connection) -> Result<i32> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}
