//! In-process remote store.
//!
//! Used by tests and offline demos. Individual operations can be switched to
//! fail so callers' recovery paths can be exercised.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use super::RemoteStore;
use crate::error::{Error, Result};
use crate::models::{Categories, Note, NoteId};
use crate::session::Identity;

/// Remote operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    LoadNotes,
    SaveNotes,
    UpsertNotes,
    LoadCategories,
    SaveCategories,
    LoadNoteOrder,
    SaveNoteOrder,
    SoftDelete,
}

#[derive(Debug, Default, Clone)]
struct UserData {
    notes: Vec<Note>,
    categories: Option<(Categories, Vec<String>)>,
    note_order: Vec<NoteId>,
}

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<String, UserData>,
    failing: HashSet<RemoteOp>,
    calls: HashMap<RemoteOp, usize>,
}

impl MemoryState {
    fn enter(&mut self, op: RemoteOp) -> Result<()> {
        *self.calls.entry(op).or_default() += 1;
        if self.failing.contains(&op) {
            return Err(Error::Network(format!("simulated failure in {op:?}")));
        }
        Ok(())
    }

    fn user(&mut self, user: &Identity) -> &mut UserData {
        self.users.entry(user.user_id.clone()).or_default()
    }
}

/// In-memory implementation of `RemoteStore`
#[derive(Debug, Clone, Default)]
pub struct MemoryRemoteStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call of `op` fail (or succeed again) until changed.
    pub async fn set_failing(&self, op: RemoteOp, failing: bool) {
        let mut state = self.state.lock().await;
        if failing {
            state.failing.insert(op);
        } else {
            state.failing.remove(&op);
        }
    }

    /// Number of times `op` was invoked, failed calls included.
    pub async fn call_count(&self, op: RemoteOp) -> usize {
        self.state.lock().await.calls.get(&op).copied().unwrap_or(0)
    }

    /// Seed a user's notes directly, bypassing failure injection.
    pub async fn seed_notes(&self, user: &Identity, notes: Vec<Note>) {
        self.state.lock().await.user(user).notes = notes;
    }

    /// Raw view of a user's stored notes, tombstones included.
    pub async fn stored_notes(&self, user: &Identity) -> Vec<Note> {
        self.state
            .lock()
            .await
            .users
            .get(&user.user_id)
            .map(|data| data.notes.clone())
            .unwrap_or_default()
    }
}

impl RemoteStore for MemoryRemoteStore {
    async fn load_notes(&self, user: &Identity) -> Result<Vec<Note>> {
        let mut state = self.state.lock().await;
        state.enter(RemoteOp::LoadNotes)?;
        Ok(state.user(user).notes.clone())
    }

    async fn save_notes(&self, user: &Identity, notes: &[Note]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter(RemoteOp::SaveNotes)?;
        state.user(user).notes = notes.to_vec();
        Ok(())
    }

    async fn upsert_notes(&self, user: &Identity, notes: &[Note]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter(RemoteOp::UpsertNotes)?;
        let stored = &mut state.user(user).notes;
        for note in notes {
            match stored.iter_mut().find(|existing| existing.id == note.id) {
                Some(existing) => *existing = note.clone(),
                None => stored.insert(0, note.clone()),
            }
        }
        Ok(())
    }

    async fn load_categories(
        &self,
        user: &Identity,
    ) -> Result<Option<(Categories, Vec<String>)>> {
        let mut state = self.state.lock().await;
        state.enter(RemoteOp::LoadCategories)?;
        Ok(state.user(user).categories.clone())
    }

    async fn save_categories(
        &self,
        user: &Identity,
        categories: &Categories,
        order: &[String],
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter(RemoteOp::SaveCategories)?;
        state.user(user).categories = Some((categories.clone(), order.to_vec()));
        Ok(())
    }

    async fn load_note_order(&self, user: &Identity) -> Result<Vec<NoteId>> {
        let mut state = self.state.lock().await;
        state.enter(RemoteOp::LoadNoteOrder)?;
        Ok(state.user(user).note_order.clone())
    }

    async fn save_note_order(&self, user: &Identity, order: &[NoteId]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter(RemoteOp::SaveNoteOrder)?;
        state.user(user).note_order = order.to_vec();
        Ok(())
    }

    async fn save_snapshot(&self, user: &Identity, notes: &[Note], order: &[NoteId]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter(RemoteOp::SaveNotes)?;
        state.enter(RemoteOp::SaveNoteOrder)?;
        let data = state.user(user);
        data.notes = notes.to_vec();
        data.note_order = order.to_vec();
        Ok(())
    }

    async fn soft_delete(&self, user: &Identity, id: NoteId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.enter(RemoteOp::SoftDelete)?;
        if let Some(note) = state
            .user(user)
            .notes
            .iter_mut()
            .find(|note| note.id == id)
        {
            note.deleted = true;
            note.updated_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failing_operation_reports_network_error_and_counts_calls() {
        let store = MemoryRemoteStore::new();
        let alice = Identity::new("alice", None).unwrap();
        store.set_failing(RemoteOp::LoadNotes, true).await;

        assert!(matches!(
            store.load_notes(&alice).await,
            Err(Error::Network(_))
        ));
        assert_eq!(store.call_count(RemoteOp::LoadNotes).await, 1);

        store.set_failing(RemoteOp::LoadNotes, false).await;
        assert!(store.load_notes(&alice).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn soft_delete_does_not_touch_other_users() {
        let store = MemoryRemoteStore::new();
        let alice = Identity::new("alice", None).unwrap();
        let bob = Identity::new("bob", None).unwrap();
        let note = Note::new("same id", "work");
        store.seed_notes(&alice, vec![note.clone()]).await;
        store.seed_notes(&bob, vec![note.clone()]).await;

        store.soft_delete(&alice, note.id).await.unwrap();

        assert!(store.stored_notes(&alice).await[0].deleted);
        assert!(!store.stored_notes(&bob).await[0].deleted);
    }
}
