//! `SQLite`-backed remote store.
//!
//! Stands in for the cloud backend: a database file shared between devices
//! (for example on a network drive), holding rows for many users. Full
//! replaces run inside one transaction, so a failure between the delete and
//! the insert cannot lose the user's notes.

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for positions

use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tokio::sync::Mutex;

use super::RemoteStore;
use crate::db::migrations::REMOTE_SCHEMA;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{Categories, Category, Note, NoteId};
use crate::session::Identity;
use crate::util::compact_text;

/// `SQLite` implementation of `RemoteStore`
#[derive(Clone)]
pub struct SqliteRemoteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRemoteStore {
    /// Open (or create) the remote database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::open(path, &REMOTE_SCHEMA).map_err(remote_error)?;
        Ok(Self::from_database(db))
    }

    /// Open an in-memory remote database (primarily for tests)
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory(&REMOTE_SCHEMA).map_err(remote_error)?;
        Ok(Self::from_database(db))
    }

    fn from_database(db: Database) -> Self {
        Self {
            conn: Arc::new(Mutex::new(db.into_connection())),
        }
    }

    /// Parse a note from a database row
    fn parse_note(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Note, Option<String>)> {
        let note = Note {
            id: NoteId::from_raw(row.get(0)?),
            text: row.get(1)?,
            category: row.get(2)?,
            timestamp: row.get(3)?,
            completed: row.get::<_, i32>(4)? != 0,
            updated_at: None,
            deleted: row.get::<_, i32>(6)? != 0,
        };
        Ok((note, row.get(5)?))
    }

    fn insert_notes(tx: &Transaction<'_>, user: &Identity, notes: &[Note]) -> Result<()> {
        let mut stmt = tx.prepare(
            "INSERT INTO remote_notes
                (user_id, id, text, category, timestamp, completed, updated_at, deleted, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(user_id, id) DO UPDATE SET
                text = excluded.text,
                category = excluded.category,
                timestamp = excluded.timestamp,
                completed = excluded.completed,
                updated_at = excluded.updated_at,
                deleted = excluded.deleted,
                position = excluded.position",
        )?;
        for (position, note) in notes.iter().enumerate() {
            stmt.execute(params![
                user.user_id,
                note.id.value(),
                note.text,
                note.category,
                note.timestamp,
                i32::from(note.completed),
                note.updated_at.map(|at| at.to_rfc3339()),
                i32::from(note.deleted),
                position as i64,
            ])?;
        }
        Ok(())
    }

    fn replace_notes(tx: &Transaction<'_>, user: &Identity, notes: &[Note]) -> Result<()> {
        tx.execute(
            "DELETE FROM remote_notes WHERE user_id = ?1",
            [&user.user_id],
        )?;
        Self::insert_notes(tx, user, notes)
    }

    fn write_note_order(tx: &Transaction<'_>, user: &Identity, order: &[NoteId]) -> Result<()> {
        tx.execute(
            "INSERT INTO remote_note_order (user_id, note_ids) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET note_ids = excluded.note_ids",
            params![user.user_id, serde_json::to_string(order)?],
        )?;
        Ok(())
    }
}

impl RemoteStore for SqliteRemoteStore {
    async fn load_notes(&self, user: &Identity) -> Result<Vec<Note>> {
        let conn = self.conn.lock().await;
        let rows = (|| -> Result<Vec<(Note, Option<String>)>> {
            let mut stmt = conn.prepare(
                "SELECT id, text, category, timestamp, completed, updated_at, deleted
                 FROM remote_notes
                 WHERE user_id = ?1
                 ORDER BY position ASC, id DESC",
            )?;
            let rows = stmt
                .query_map([&user.user_id], Self::parse_note)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })()
        .map_err(remote_error)?;

        let notes = rows
            .into_iter()
            .map(|(mut note, updated_at)| {
                note.updated_at = updated_at.as_deref().map(parse_updated_at).transpose()?;
                Ok(note)
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!("Loaded {} remote note(s) for {}", notes.len(), user.user_id);
        Ok(notes)
    }

    async fn save_notes(&self, user: &Identity, notes: &[Note]) -> Result<()> {
        let conn = self.conn.lock().await;
        (|| -> Result<()> {
            let tx = conn.unchecked_transaction()?;
            Self::replace_notes(&tx, user, notes)?;
            tx.commit()?;
            Ok(())
        })()
        .map_err(remote_error)?;

        tracing::debug!("Replaced remote notes for {} ({})", user.user_id, notes.len());
        Ok(())
    }

    async fn upsert_notes(&self, user: &Identity, notes: &[Note]) -> Result<()> {
        let conn = self.conn.lock().await;
        (|| -> Result<()> {
            let tx = conn.unchecked_transaction()?;
            let first_position: i64 = tx.query_row(
                "SELECT COALESCE(MIN(position), 0) FROM remote_notes WHERE user_id = ?1",
                [&user.user_id],
                |row| row.get(0),
            )?;
            let mut stmt = tx.prepare(
                "INSERT INTO remote_notes
                    (user_id, id, text, category, timestamp, completed, updated_at, deleted, position)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(user_id, id) DO UPDATE SET
                    text = excluded.text,
                    category = excluded.category,
                    timestamp = excluded.timestamp,
                    completed = excluded.completed,
                    updated_at = excluded.updated_at,
                    deleted = excluded.deleted",
            )?;
            for (offset, note) in notes.iter().enumerate() {
                stmt.execute(params![
                    user.user_id,
                    note.id.value(),
                    note.text,
                    note.category,
                    note.timestamp,
                    i32::from(note.completed),
                    note.updated_at.map(|at| at.to_rfc3339()),
                    i32::from(note.deleted),
                    first_position - 1 - offset as i64,
                ])?;
            }
            drop(stmt);
            tx.commit()?;
            Ok(())
        })()
        .map_err(remote_error)
    }

    async fn load_categories(
        &self,
        user: &Identity,
    ) -> Result<Option<(Categories, Vec<String>)>> {
        let conn = self.conn.lock().await;
        let rows = (|| -> Result<Vec<(String, Category)>> {
            let mut stmt = conn.prepare(
                "SELECT key, name, icon, color
                 FROM remote_categories
                 WHERE user_id = ?1
                 ORDER BY position ASC",
            )?;
            let rows = stmt
                .query_map([&user.user_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        Category::new(
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ),
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })()
        .map_err(remote_error)?;

        if rows.is_empty() {
            return Ok(None);
        }
        let order = rows.iter().map(|(key, _)| key.clone()).collect();
        Ok(Some((rows.into_iter().collect(), order)))
    }

    async fn save_categories(
        &self,
        user: &Identity,
        categories: &Categories,
        order: &[String],
    ) -> Result<()> {
        let order = crate::models::normalize_category_order(categories, order);
        let conn = self.conn.lock().await;
        (|| -> Result<()> {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM remote_categories WHERE user_id = ?1",
                [&user.user_id],
            )?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO remote_categories (user_id, key, name, icon, color, position)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for (position, key) in order.iter().enumerate() {
                    let Some(category) = categories.get(key) else {
                        continue;
                    };
                    stmt.execute(params![
                        user.user_id,
                        key,
                        category.name,
                        category.icon,
                        category.color,
                        position as i64,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })()
        .map_err(remote_error)
    }

    async fn load_note_order(&self, user: &Identity) -> Result<Vec<NoteId>> {
        let conn = self.conn.lock().await;
        let raw: Option<String> = conn
            .query_row(
                "SELECT note_ids FROM remote_note_order WHERE user_id = ?1",
                [&user.user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(remote_error)?;

        match raw {
            Some(raw) => serde_json::from_str(&raw).map_err(remote_error),
            None => Ok(Vec::new()),
        }
    }

    async fn save_note_order(&self, user: &Identity, order: &[NoteId]) -> Result<()> {
        let conn = self.conn.lock().await;
        (|| -> Result<()> {
            let tx = conn.unchecked_transaction()?;
            Self::write_note_order(&tx, user, order)?;
            tx.commit()?;
            Ok(())
        })()
        .map_err(remote_error)
    }

    async fn save_snapshot(&self, user: &Identity, notes: &[Note], order: &[NoteId]) -> Result<()> {
        let conn = self.conn.lock().await;
        (|| -> Result<()> {
            let tx = conn.unchecked_transaction()?;
            Self::replace_notes(&tx, user, notes)?;
            Self::write_note_order(&tx, user, order)?;
            tx.commit()?;
            Ok(())
        })()
        .map_err(remote_error)?;

        tracing::debug!(
            "Replaced remote snapshot for {} ({} notes)",
            user.user_id,
            notes.len()
        );
        Ok(())
    }

    async fn soft_delete(&self, user: &Identity, id: NoteId) -> Result<()> {
        let conn = self.conn.lock().await;
        let rows = conn
            .execute(
                "UPDATE remote_notes SET deleted = 1, updated_at = ?1
                 WHERE user_id = ?2 AND id = ?3",
                params![Utc::now().to_rfc3339(), user.user_id, id.value()],
            )
            .map_err(remote_error)?;

        if rows == 0 {
            tracing::debug!("Soft delete of {} matched no remote row for {}", id, user.user_id);
        }
        Ok(())
    }
}

fn parse_updated_at(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| Error::Network(format!("invalid stored updated_at '{raw}': {error}")))
}

fn remote_error(error: impl Display) -> Error {
    Error::Network(compact_text(&error.to_string()))
}
