//! Remote store adapter
//!
//! The remote store holds the same collections as the local store, scoped to
//! an authenticated user. Every operation takes the identity explicitly and
//! every call may suspend on I/O.

mod memory;
mod sqlite;

pub use memory::{MemoryRemoteStore, RemoteOp};
pub use sqlite::SqliteRemoteStore;

use crate::error::Result;
use crate::models::{Categories, Note, NoteId};
use crate::session::Identity;

/// Trait for remote storage operations (async)
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    /// Load every stored note for the user, tombstones included
    async fn load_notes(&self, user: &Identity) -> Result<Vec<Note>>;

    /// Replace the user's whole note collection
    async fn save_notes(&self, user: &Identity, notes: &[Note]) -> Result<()>;

    /// Insert or update individual notes, leaving the rest untouched
    async fn upsert_notes(&self, user: &Identity, notes: &[Note]) -> Result<()>;

    /// Load categories and their order; `None` when the user has none stored
    async fn load_categories(&self, user: &Identity)
        -> Result<Option<(Categories, Vec<String>)>>;

    /// Replace the user's categories and category order
    async fn save_categories(
        &self,
        user: &Identity,
        categories: &Categories,
        order: &[String],
    ) -> Result<()>;

    /// Load the manual note order (empty when never saved)
    async fn load_note_order(&self, user: &Identity) -> Result<Vec<NoteId>>;

    /// Replace the manual note order
    async fn save_note_order(&self, user: &Identity, order: &[NoteId]) -> Result<()>;

    /// Replace notes and note order together.
    ///
    /// Implementations backed by a transactional store should override this
    /// so a failure cannot leave one half written.
    async fn save_snapshot(&self, user: &Identity, notes: &[Note], order: &[NoteId]) -> Result<()> {
        self.save_notes(user, notes).await?;
        self.save_note_order(user, order).await
    }

    /// Mark one of the user's notes deleted; other users' rows are never touched
    async fn soft_delete(&self, user: &Identity, id: NoteId) -> Result<()>;
}
