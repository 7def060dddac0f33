//! Local store adapter
//!
//! A durable key-value store scoped to the device. Every collection is a JSON
//! value under a well-known key; an absent key means "no prior data".

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::connection::Database;
use super::migrations::LOCAL_SCHEMA;
use crate::error::{Error, Result};
use crate::models::{Categories, Note, NoteId};
use crate::util::unix_millis_now;

/// Keys recognized by the local store.
pub mod keys {
    pub const NOTES: &str = "notes";
    pub const CATEGORIES: &str = "categories";
    pub const CATEGORY_ORDER: &str = "categoryOrder";
    pub const NOTE_ORDER: &str = "noteOrder";
    pub const SESSION: &str = "session";
    pub const PENDING_SYNC: &str = "pendingSync";
    /// Tombstones of notes deleted while the remote store was out of reach
    pub const STAGED_DELETES: &str = "stagedDeletes";
    /// User id whose remote data the local collections last matched
    pub const LAST_SYNCED_USER: &str = "lastSyncedUser";
}

/// Collections written together in one transaction; `None` leaves a key as is.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalSnapshot<'a> {
    pub notes: Option<&'a [Note]>,
    pub categories: Option<&'a Categories>,
    pub category_order: Option<&'a [String]>,
    pub note_order: Option<&'a [NoteId]>,
    pub tombstones: Option<&'a [Note]>,
    pub synced_user: Option<&'a str>,
}

/// Trait for local key-value storage operations
///
/// Implementors provide the raw primitives; typed accessors are derived.
pub trait LocalStore {
    /// Read the raw JSON stored under `key`
    fn get_raw(&self, key: &str) -> Result<Option<String>>;

    /// Write several raw JSON values atomically
    fn put_raw(&self, entries: &[(&str, String)]) -> Result<()>;

    /// Remove keys in one transaction
    fn remove(&self, keys: &[&str]) -> Result<()>;

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get_raw(key)?
            .map(|raw| serde_json::from_str(&raw).map_err(Error::from))
            .transpose()
    }

    fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.put_raw(&[(key, serde_json::to_string(value)?)])
    }

    fn load_notes(&self) -> Result<Option<Vec<Note>>> {
        self.get_json(keys::NOTES)
    }

    fn save_notes(&self, notes: &[Note]) -> Result<()> {
        self.put_json(keys::NOTES, notes)
    }

    fn load_categories(&self) -> Result<Option<Categories>> {
        self.get_json(keys::CATEGORIES)
    }

    fn save_categories(&self, categories: &Categories) -> Result<()> {
        self.put_json(keys::CATEGORIES, categories)
    }

    fn load_category_order(&self) -> Result<Option<Vec<String>>> {
        self.get_json(keys::CATEGORY_ORDER)
    }

    fn save_category_order(&self, order: &[String]) -> Result<()> {
        self.put_json(keys::CATEGORY_ORDER, order)
    }

    fn load_note_order(&self) -> Result<Option<Vec<NoteId>>> {
        self.get_json(keys::NOTE_ORDER)
    }

    fn save_note_order(&self, order: &[NoteId]) -> Result<()> {
        self.put_json(keys::NOTE_ORDER, order)
    }

    /// Write the present parts of `snapshot` in one transaction.
    fn save_snapshot(&self, snapshot: &LocalSnapshot<'_>) -> Result<()> {
        let mut entries = Vec::with_capacity(6);
        if let Some(notes) = snapshot.notes {
            entries.push((keys::NOTES, serde_json::to_string(notes)?));
        }
        if let Some(categories) = snapshot.categories {
            entries.push((keys::CATEGORIES, serde_json::to_string(categories)?));
        }
        if let Some(order) = snapshot.category_order {
            entries.push((keys::CATEGORY_ORDER, serde_json::to_string(order)?));
        }
        if let Some(order) = snapshot.note_order {
            entries.push((keys::NOTE_ORDER, serde_json::to_string(order)?));
        }
        if let Some(tombstones) = snapshot.tombstones {
            entries.push((keys::STAGED_DELETES, serde_json::to_string(tombstones)?));
        }
        if let Some(user_id) = snapshot.synced_user {
            entries.push((keys::LAST_SYNCED_USER, serde_json::to_string(user_id)?));
        }
        if entries.is_empty() {
            return Ok(());
        }
        self.put_raw(&entries)
    }

    /// Whether local state holds changes the remote store has not seen.
    fn is_pending_sync(&self) -> Result<bool> {
        Ok(self.get_json(keys::PENDING_SYNC)?.unwrap_or(false))
    }

    fn mark_pending_sync(&self) -> Result<()> {
        self.put_json(keys::PENDING_SYNC, &true)
    }

    /// Tombstones waiting to reach the remote store.
    fn load_tombstones(&self) -> Result<Vec<Note>> {
        Ok(self.get_json(keys::STAGED_DELETES)?.unwrap_or_default())
    }

    fn last_synced_user(&self) -> Result<Option<String>> {
        self.get_json(keys::LAST_SYNCED_USER)
    }

    /// Drop the staging marker and staged tombstones after a successful
    /// reconciliation.
    fn clear_staged(&self) -> Result<()> {
        self.remove(&[keys::PENDING_SYNC, keys::STAGED_DELETES])
    }
}

/// `SQLite` implementation of `LocalStore`
#[derive(Clone)]
pub struct SqliteLocalStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLocalStore {
    /// Open (or create) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::open(path, &LOCAL_SCHEMA)?;
        Ok(Self::from_database(db))
    }

    /// Open an in-memory store (primarily for tests)
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory(&LOCAL_SCHEMA)?;
        Ok(Self::from_database(db))
    }

    fn from_database(db: Database) -> Self {
        Self {
            conn: Arc::new(Mutex::new(db.into_connection())),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("local store lock poisoned".to_string()))
    }
}

impl LocalStore for SqliteLocalStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn put_raw(&self, entries: &[(&str, String)]) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let now = unix_millis_now();
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )?;
        }
        tx.commit()?;
        tracing::debug!("Wrote {} local key(s)", entries.len());
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        for key in keys {
            tx.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::default_categories;
    use pretty_assertions::assert_eq;

    fn setup() -> SqliteLocalStore {
        SqliteLocalStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_absent_keys_mean_no_prior_data() {
        let store = setup();
        assert!(store.load_notes().unwrap().is_none());
        assert!(store.load_categories().unwrap().is_none());
        assert!(store.load_category_order().unwrap().is_none());
        assert!(store.load_note_order().unwrap().is_none());
        assert!(!store.is_pending_sync().unwrap());
    }

    #[test]
    fn test_collections_persist_under_their_keys() {
        let store = setup();
        let notes = vec![Note::new("one", "work"), Note::new("two", "idea")];
        let order: Vec<NoteId> = notes.iter().map(|note| note.id).collect();

        store.save_notes(&notes).unwrap();
        store.save_note_order(&order).unwrap();

        assert_eq!(store.load_notes().unwrap(), Some(notes));
        assert_eq!(store.load_note_order().unwrap(), Some(order));
        assert!(store.get_raw(keys::NOTE_ORDER).unwrap().unwrap().starts_with('['));
    }

    #[test]
    fn test_snapshot_writes_only_present_parts() {
        let store = setup();
        let (categories, category_order) = default_categories();
        store.save_notes(&[Note::new("keep", "work")]).unwrap();

        store
            .save_snapshot(&LocalSnapshot {
                categories: Some(&categories),
                category_order: Some(&category_order),
                ..LocalSnapshot::default()
            })
            .unwrap();

        assert_eq!(store.load_notes().unwrap().unwrap().len(), 1);
        assert_eq!(store.load_categories().unwrap(), Some(categories));
        assert_eq!(store.load_category_order().unwrap(), Some(category_order));
    }

    #[test]
    fn test_pending_sync_marker() {
        let store = setup();
        store.mark_pending_sync().unwrap();
        assert!(store.is_pending_sync().unwrap());
        store.clear_staged().unwrap();
        assert!(!store.is_pending_sync().unwrap());
    }

    #[test]
    fn test_clear_staged_drops_tombstones_and_keeps_sync_owner() {
        let store = setup();
        let mut gone = Note::new("gone", "work");
        gone.deleted = true;

        store
            .save_snapshot(&LocalSnapshot {
                notes: Some(&[]),
                tombstones: Some(std::slice::from_ref(&gone)),
                synced_user: Some("alice"),
                ..LocalSnapshot::default()
            })
            .unwrap();
        store.mark_pending_sync().unwrap();
        assert_eq!(store.load_tombstones().unwrap(), vec![gone]);

        store.clear_staged().unwrap();
        assert!(store.load_tombstones().unwrap().is_empty());
        assert!(!store.is_pending_sync().unwrap());
        assert_eq!(store.last_synced_user().unwrap(), Some("alice".to_string()));
    }

    #[test]
    fn test_reopen_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("memo.db");
        {
            let store = SqliteLocalStore::open(&path).unwrap();
            store.save_category_order(&["todo".to_string()]).unwrap();
        }
        let store = SqliteLocalStore::open(&path).unwrap();
        assert_eq!(
            store.load_category_order().unwrap(),
            Some(vec!["todo".to_string()])
        );
    }
}
