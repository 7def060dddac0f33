//! The application controller.
//!
//! `MemoService` owns the in-memory collections and decides when to talk to
//! the remote store. Every mutation is written to the local store first; the
//! remote write that follows falls back to a staged local copy when no user is
//! signed in or the remote store fails.

use chrono::Utc;

use crate::db::{LocalSnapshot, LocalStore};
use crate::error::{Error, Result};
use crate::export::{parse_import, render_export, ExportDocument, ExportFormat};
use crate::models::{
    custom_category_key, default_categories, normalize_category_order, Categories, Category, Note,
    NoteId,
};
use crate::remote::RemoteStore;
use crate::session::{Identity, SessionManager, SessionTransition};
use crate::state::SyncState;
use crate::sync::{
    move_in_order, reconcile_order, ReconcileOutcome, Reconciled, ReconciliationEngine,
    VolumeChoice, VolumeMismatch,
};
use crate::util::unix_millis_now;
use crate::view::{visible_notes, NoteFilter, SortMode};

/// The four collections owned by the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppState {
    pub notes: Vec<Note>,
    pub categories: Categories,
    pub category_order: Vec<String>,
    pub note_order: Vec<NoteId>,
}

/// Result of a sign-in, cloud save or re-sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Local and remote notes were reconciled (or the remote overwritten)
    Reconciled(Reconciled),
    /// The volume guard tripped; nothing was changed
    NeedsDecision(VolumeMismatch),
    /// Local state was replaced by the remote store's view
    Resynced { notes: usize },
}

impl From<ReconcileOutcome> for SyncOutcome {
    fn from(outcome: ReconcileOutcome) -> Self {
        match outcome {
            ReconcileOutcome::Completed(reconciled) => Self::Reconciled(reconciled),
            ReconcileOutcome::NeedsDecision(mismatch) => Self::NeedsDecision(mismatch),
        }
    }
}

/// How far a delete got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Removed locally only; staged for the next reconcile
    LocalOnly,
    /// Removed locally and tombstoned remotely
    Tombstoned,
    /// The tombstone write failed and state was re-synced from the remote store
    Resynced,
}

enum RemoteChange {
    Notes(Vec<Note>),
    NoteOrder,
    Categories,
}

/// Owns application state and coordinates the stores.
pub struct MemoService<R: RemoteStore, L: LocalStore + Clone> {
    engine: ReconciliationEngine<R, L>,
    session: SessionManager<L>,
    state: AppState,
    sync_state: SyncState,
}

impl<R: RemoteStore, L: LocalStore + Clone> MemoService<R, L> {
    /// Load local state and restore any persisted session.
    ///
    /// Missing categories fall back to the defaults, which are written back.
    pub fn open(remote: R, local: L) -> Result<Self> {
        let notes = local.load_notes()?.unwrap_or_default();

        let (categories, category_order) = match local.load_categories()? {
            Some(categories) => {
                let stored = local.load_category_order()?.unwrap_or_default();
                let order = normalize_category_order(&categories, &stored);
                if order != stored {
                    local.save_category_order(&order)?;
                }
                (categories, order)
            }
            None => {
                let (categories, order) = default_categories();
                local.save_snapshot(&LocalSnapshot {
                    categories: Some(&categories),
                    category_order: Some(&order),
                    ..LocalSnapshot::default()
                })?;
                (categories, order)
            }
        };

        let stored_order = local.load_note_order()?.unwrap_or_default();
        let note_order = reconcile_order(&notes, &stored_order);

        let session = SessionManager::restore(local.clone())?;
        let sync_state = match (session.current_user(), local.is_pending_sync()?) {
            (None, _) => SyncState::Offline,
            (Some(_), true) => SyncState::Pending,
            (Some(_), false) => SyncState::Synced,
        };

        tracing::debug!(
            "Opened with {} note(s) and {} categories",
            notes.len(),
            categories.len()
        );

        Ok(Self {
            engine: ReconciliationEngine::new(remote, local),
            session,
            state: AppState {
                notes,
                categories,
                category_order,
                note_order,
            },
            sync_state,
        })
    }

    #[must_use]
    pub fn with_volume_tolerance(mut self, tolerance: usize) -> Self {
        self.engine = self.engine.with_volume_tolerance(tolerance);
        self
    }

    pub const fn state(&self) -> &AppState {
        &self.state
    }

    pub fn notes(&self) -> &[Note] {
        &self.state.notes
    }

    pub fn note(&self, id: NoteId) -> Option<&Note> {
        self.state.notes.iter().find(|note| note.id == id)
    }

    pub const fn sync_state(&self) -> SyncState {
        self.sync_state
    }

    pub fn current_user(&self) -> Option<Identity> {
        self.session.current_user()
    }

    pub const fn session(&self) -> &SessionManager<L> {
        &self.session
    }

    /// Whether local changes are waiting for the next reconcile.
    pub fn has_staged_changes(&self) -> Result<bool> {
        self.engine.local().is_pending_sync()
    }

    /// Filtered, sorted view of the notes.
    pub fn visible_notes(&self, filter: &NoteFilter, sort: SortMode) -> Vec<&Note> {
        visible_notes(
            &self.state.notes,
            &self.state.note_order,
            &self.state.category_order,
            filter,
            sort,
        )
    }

    // ---------------------------------------------------------------------
    // Notes
    // ---------------------------------------------------------------------

    pub async fn add_note(&mut self, text: &str, category: &str) -> Result<Note> {
        let text = required_text(text)?;
        self.require_category(category)?;

        let note = Note::new(text, category);
        self.state.notes.insert(0, note.clone());
        self.state.note_order.insert(0, note.id);
        self.save_local_notes()?;
        self.push_remote(RemoteChange::Notes(vec![note.clone()])).await?;

        tracing::debug!("Added note {}", note.id);
        Ok(note)
    }

    pub async fn edit_note(&mut self, id: NoteId, text: &str) -> Result<Note> {
        let text = required_text(text)?;
        self.update_note(id, |note| note.text = text).await
    }

    /// Flip the completed flag; returns the updated note.
    pub async fn toggle_completed(&mut self, id: NoteId) -> Result<Note> {
        self.update_note(id, |note| note.completed = !note.completed)
            .await
    }

    pub async fn move_to_category(&mut self, id: NoteId, category: &str) -> Result<Note> {
        self.require_category(category)?;
        let category = category.to_string();
        self.update_note(id, |note| note.category = category).await
    }

    /// Duplicate a note into `category` under a fresh id.
    pub async fn copy_to_category(&mut self, id: NoteId, category: &str) -> Result<Note> {
        self.require_category(category)?;
        let source = self.find_note(id)?;

        let mut copy = Note::new(source.text.clone(), category);
        copy.completed = source.completed;

        self.state.notes.insert(0, copy.clone());
        self.state.note_order.insert(0, copy.id);
        self.save_local_notes()?;
        self.push_remote(RemoteChange::Notes(vec![copy.clone()])).await?;

        tracing::debug!("Copied note {} to {} as {}", id, copy.category, copy.id);
        Ok(copy)
    }

    /// Remove a note locally, then tombstone it remotely.
    ///
    /// Offline, the tombstone is staged locally and carried to the remote
    /// store by the next reconcile. When the remote tombstone write fails the
    /// state is re-synced from the remote store; if that fails too the error
    /// is returned and the local removal stands.
    pub async fn delete_note(&mut self, id: NoteId) -> Result<DeleteOutcome> {
        let mut tombstone = self.find_note(id)?.clone();
        tombstone.deleted = true;
        tombstone.touch();

        let notes: Vec<Note> = self
            .state
            .notes
            .iter()
            .filter(|note| note.id != id)
            .cloned()
            .collect();
        let note_order: Vec<NoteId> = self
            .state
            .note_order
            .iter()
            .copied()
            .filter(|candidate| *candidate != id)
            .collect();
        self.state.notes = notes;
        self.state.note_order = note_order;

        let Some(user) = self.session.current_user() else {
            let local = self.engine.local();
            let mut staged = local.load_tombstones()?;
            staged.retain(|note| note.id != id);
            staged.push(tombstone);
            local.save_snapshot(&LocalSnapshot {
                notes: Some(&self.state.notes),
                note_order: Some(&self.state.note_order),
                tombstones: Some(&staged),
                ..LocalSnapshot::default()
            })?;
            self.stage_offline()?;
            return Ok(DeleteOutcome::LocalOnly);
        };
        self.save_local_notes()?;

        self.sync_state = SyncState::Syncing;
        match self.engine.remote().soft_delete(&user, id).await {
            Ok(()) => {
                self.sync_state = self.settled_state()?;
                tracing::debug!("Tombstoned note {} for {}", id, user);
                Ok(DeleteOutcome::Tombstoned)
            }
            Err(error) => {
                tracing::warn!("Tombstone write for {} failed: {}; re-syncing", id, error);
                self.adopt_remote(&user).await?;
                Ok(DeleteOutcome::Resynced)
            }
        }
    }

    /// Move a note to `position` in the manual order.
    pub async fn move_note(&mut self, id: NoteId, position: usize) -> Result<()> {
        self.find_note(id)?;
        self.state.note_order =
            move_in_order(&self.state.notes, &self.state.note_order, id, position);
        self.save_local_notes()?;
        self.push_remote(RemoteChange::NoteOrder).await
    }

    // ---------------------------------------------------------------------
    // Categories
    // ---------------------------------------------------------------------

    /// Create a custom category; returns its key.
    pub async fn add_category(&mut self, name: &str, icon: &str, color: &str) -> Result<String> {
        let name = required_text(name)?;

        let mut stamp = unix_millis_now();
        let mut key = custom_category_key(stamp);
        while self.state.categories.contains_key(&key) {
            stamp += 1;
            key = custom_category_key(stamp);
        }

        let mut categories = self.state.categories.clone();
        categories.insert(key.clone(), Category::new(name, icon.trim(), color.trim()));
        let mut order = self.state.category_order.clone();
        order.push(key.clone());

        self.replace_categories(categories, &order).await?;
        Ok(key)
    }

    pub async fn update_category(
        &mut self,
        key: &str,
        name: Option<&str>,
        icon: Option<&str>,
        color: Option<&str>,
    ) -> Result<Category> {
        let mut category = self
            .state
            .categories
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("category '{key}'")))?;

        if let Some(name) = name {
            category.name = required_text(name)?;
        }
        if let Some(icon) = icon {
            category.icon = icon.trim().to_string();
        }
        if let Some(color) = color {
            category.color = color.trim().to_string();
        }

        let mut categories = self.state.categories.clone();
        categories.insert(key.to_string(), category.clone());
        let order = self.state.category_order.clone();
        self.replace_categories(categories, &order).await?;
        Ok(category)
    }

    /// Remove a category. Notes keep the dangling key.
    pub async fn delete_category(&mut self, key: &str) -> Result<()> {
        if !self.state.categories.contains_key(key) {
            return Err(Error::NotFound(format!("category '{key}'")));
        }

        let mut categories = self.state.categories.clone();
        categories.remove(key);
        let order = self.state.category_order.clone();
        self.replace_categories(categories, &order).await
    }

    // ---------------------------------------------------------------------
    // Session and sync
    // ---------------------------------------------------------------------

    /// Sign in and reconcile with the user's remote data.
    ///
    /// When the local collections last matched another user's data, either
    /// through a direct switch or a sign-out in between, the new user's remote
    /// state is adopted instead of merging the previous user's notes into it.
    pub async fn sign_in(&mut self, identity: Identity, choice: VolumeChoice) -> Result<SyncOutcome> {
        let last_synced = self.engine.local().last_synced_user()?;
        match self.session.sign_in(identity.clone())? {
            SessionTransition::SwitchedUser { from, to } => {
                tracing::info!("Switched from {} to {}; loading remote state", from, to);
                let notes = self.adopt_remote(&to).await?;
                Ok(SyncOutcome::Resynced { notes })
            }
            SessionTransition::SignedIn(to)
                if last_synced
                    .as_deref()
                    .is_some_and(|previous| previous != to.user_id) =>
            {
                tracing::info!(
                    "Local data belongs to another account; loading remote state for {}",
                    to
                );
                let notes = self.adopt_remote(&to).await?;
                Ok(SyncOutcome::Resynced { notes })
            }
            SessionTransition::SignedIn(_)
            | SessionTransition::SignedOut(_)
            | SessionTransition::Unchanged => self.reconcile_with(&identity, choice).await,
        }
    }

    /// Sign out; local data stays on the device.
    pub fn sign_out(&mut self) -> Result<Option<Identity>> {
        let transition = self.session.sign_out()?;
        self.sync_state = SyncState::Offline;
        Ok(match transition {
            SessionTransition::SignedOut(identity) => Some(identity),
            _ => None,
        })
    }

    /// Reconcile the current state with the remote store.
    pub async fn cloud_save(&mut self, choice: VolumeChoice) -> Result<SyncOutcome> {
        let user = self.session.require_user()?;
        self.reconcile_with(&user, choice).await
    }

    /// Replace local state with the remote store's view.
    pub async fn full_resync(&mut self) -> Result<SyncOutcome> {
        let user = self.session.require_user()?;
        let notes = self.adopt_remote(&user).await?;
        Ok(SyncOutcome::Resynced { notes })
    }

    // ---------------------------------------------------------------------
    // Export / import
    // ---------------------------------------------------------------------

    pub fn export_document(&self) -> ExportDocument {
        ExportDocument::new(
            &self.state.notes,
            &self.state.categories,
            &self.state.category_order,
            &self.state.note_order,
            Utc::now(),
        )
    }

    pub fn export(&self, format: ExportFormat) -> Result<String> {
        Ok(render_export(&self.export_document(), format)?)
    }

    /// Replace all state with an import document.
    ///
    /// A malformed document changes nothing. When signed in the imported
    /// state also replaces the remote copy.
    pub async fn import(&mut self, payload: &str) -> Result<usize> {
        let imported = parse_import(payload)?;

        self.engine.local().save_snapshot(&LocalSnapshot {
            notes: Some(&imported.notes),
            categories: Some(&imported.categories),
            category_order: Some(&imported.category_order),
            note_order: Some(&imported.note_order),
            tombstones: Some(&[]),
            ..LocalSnapshot::default()
        })?;
        self.engine.local().mark_pending_sync()?;

        let count = imported.notes.len();
        self.state = AppState {
            notes: imported.notes,
            categories: imported.categories,
            category_order: imported.category_order,
            note_order: imported.note_order,
        };
        tracing::info!("Imported {} note(s)", count);

        let Some(user) = self.session.current_user() else {
            self.sync_state = SyncState::Offline;
            return Ok(count);
        };

        self.sync_state = SyncState::Syncing;
        let remote = self.engine.remote();
        let pushed = match remote
            .save_snapshot(&user, &self.state.notes, &self.state.note_order)
            .await
        {
            Ok(()) => {
                remote
                    .save_categories(&user, &self.state.categories, &self.state.category_order)
                    .await
            }
            Err(error) => Err(error),
        };

        match pushed {
            Ok(()) => {
                self.engine.local().save_snapshot(&LocalSnapshot {
                    synced_user: Some(&user.user_id),
                    ..LocalSnapshot::default()
                })?;
                self.engine.local().clear_staged()?;
                self.sync_state = SyncState::Synced;
            }
            Err(error) => {
                tracing::warn!("Imported data kept locally; remote replace failed: {}", error);
                self.sync_state = SyncState::Pending;
            }
        }
        Ok(count)
    }

    // ---------------------------------------------------------------------
    // Private
    // ---------------------------------------------------------------------

    fn find_note(&self, id: NoteId) -> Result<&Note> {
        self.note(id)
            .ok_or_else(|| Error::NotFound(format!("note {id}")))
    }

    fn require_category(&self, key: &str) -> Result<()> {
        if self.state.categories.contains_key(key) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("category '{key}'")))
        }
    }

    async fn update_note(&mut self, id: NoteId, change: impl FnOnce(&mut Note)) -> Result<Note> {
        let mut note = self.find_note(id)?.clone();
        change(&mut note);
        note.touch();

        let notes: Vec<Note> = self
            .state
            .notes
            .iter()
            .map(|existing| {
                if existing.id == id {
                    note.clone()
                } else {
                    existing.clone()
                }
            })
            .collect();
        self.state.notes = notes;
        self.save_local_notes()?;
        self.push_remote(RemoteChange::Notes(vec![note.clone()])).await?;
        Ok(note)
    }

    async fn replace_categories(&mut self, categories: Categories, order: &[String]) -> Result<()> {
        let order = normalize_category_order(&categories, order);
        self.engine.local().save_snapshot(&LocalSnapshot {
            categories: Some(&categories),
            category_order: Some(&order),
            ..LocalSnapshot::default()
        })?;
        self.state.categories = categories;
        self.state.category_order = order;
        self.push_remote(RemoteChange::Categories).await
    }

    fn save_local_notes(&self) -> Result<()> {
        self.engine.local().save_snapshot(&LocalSnapshot {
            notes: Some(&self.state.notes),
            note_order: Some(&self.state.note_order),
            ..LocalSnapshot::default()
        })
    }

    fn stage_offline(&mut self) -> Result<()> {
        self.engine.local().mark_pending_sync()?;
        self.sync_state = SyncState::Offline;
        Ok(())
    }

    fn settled_state(&self) -> Result<SyncState> {
        Ok(if self.engine.local().is_pending_sync()? {
            SyncState::Pending
        } else {
            SyncState::Synced
        })
    }

    /// Write a change through to the remote store, staging it locally when
    /// that is not possible.
    async fn push_remote(&mut self, change: RemoteChange) -> Result<()> {
        let Some(user) = self.session.current_user() else {
            tracing::debug!("Not signed in; change kept locally");
            return self.stage_offline();
        };

        self.sync_state = SyncState::Syncing;
        let remote = self.engine.remote();
        let result = match &change {
            RemoteChange::Notes(notes) => match remote.upsert_notes(&user, notes).await {
                Ok(()) => remote.save_note_order(&user, &self.state.note_order).await,
                Err(error) => Err(error),
            },
            RemoteChange::NoteOrder => {
                remote.save_note_order(&user, &self.state.note_order).await
            }
            RemoteChange::Categories => {
                remote
                    .save_categories(&user, &self.state.categories, &self.state.category_order)
                    .await
            }
        };

        match result {
            Ok(()) => self.sync_state = self.settled_state()?,
            Err(error) => {
                tracing::warn!("Remote write failed, keeping change locally: {}", error);
                self.engine.local().mark_pending_sync()?;
                self.sync_state = SyncState::Pending;
            }
        }
        Ok(())
    }

    async fn reconcile_with(&mut self, user: &Identity, choice: VolumeChoice) -> Result<SyncOutcome> {
        self.sync_state = SyncState::Syncing;
        match self.try_reconcile(user, choice).await {
            Ok(outcome) => {
                self.sync_state = match outcome {
                    SyncOutcome::NeedsDecision(_) => self.settled_state()?,
                    _ => SyncState::Synced,
                };
                Ok(outcome)
            }
            Err(error) => {
                tracing::warn!("Reconcile for {} failed: {}", user, error);
                self.sync_state = SyncState::Error;
                Err(error)
            }
        }
    }

    /// Reconcile notes, staged tombstones and categories in one step.
    ///
    /// State is only replaced once the engine reports a completed run.
    async fn try_reconcile(&mut self, user: &Identity, choice: VolumeChoice) -> Result<SyncOutcome> {
        let mut local_notes = self.state.notes.clone();
        local_notes.extend(self.engine.local().load_tombstones()?);

        let outcome = self
            .engine
            .reconcile_with_categories(
                user,
                &local_notes,
                &self.state.note_order,
                (&self.state.categories, self.state.category_order.as_slice()),
                choice,
            )
            .await?;
        if let ReconcileOutcome::Completed(reconciled) = &outcome {
            self.state.notes = reconciled.notes.clone();
            self.state.note_order = reconciled.order.clone();
            if let Some((categories, order)) = &reconciled.categories {
                self.state.categories = categories.clone();
                self.state.category_order = order.clone();
            }
        }
        Ok(outcome.into())
    }

    async fn adopt_remote(&mut self, user: &Identity) -> Result<usize> {
        self.sync_state = SyncState::Syncing;
        let snapshot = match self.engine.full_resync(user).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                self.sync_state = SyncState::Error;
                return Err(error);
            }
        };

        let count = snapshot.notes.len();
        self.state.notes = snapshot.notes;
        self.state.note_order = snapshot.order;
        if let Some((categories, order)) = snapshot.categories {
            self.state.categories = categories;
            self.state.category_order = order;
        }
        self.sync_state = SyncState::Synced;
        Ok(count)
    }
}

fn required_text(value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(Error::InvalidInput("text must not be empty".to_string()))
    } else {
        Ok(trimmed.to_string())
    }
}
