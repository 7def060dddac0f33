//! Reconciliation of local state with the remote store.
//!
//! Runs when a user signs in, saves to the cloud or asks for a full re-sync:
//!
//! 1. Volume guard: a local set much larger than the remote one needs an
//!    explicit decision before anything is merged.
//! 2. Last-write-wins merge per note id, tombstones excluded.
//! 3. Manual order reconciliation with new notes in front.
//! 4. One full replace on the remote store, then the local store.
//!
//! Categories, when passed in, are merged up front but only written in step 4
//! together with the notes. A failed remote call aborts before anything is
//! written locally; the caller's state is only replaced from a successful
//! result.

mod guard;
mod merge;
mod order;

pub use guard::SingleFlight;
pub(crate) use merge::supersedes;
pub use merge::{merge_notes, MergeReport, MergeResult, Origin};
pub use order::{apply_order, move_in_order, reconcile_order, OrphanPolicy};

use crate::db::{LocalSnapshot, LocalStore};
use crate::error::Result;
use crate::models::{normalize_category_order, Categories, Note, NoteId};
use crate::remote::RemoteStore;
use crate::session::Identity;

/// Allowed surplus of local notes over remote notes before asking the user.
pub const DEFAULT_VOLUME_TOLERANCE: usize = 10;

/// How to proceed when the volume guard trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VolumeChoice {
    /// Stop and report the mismatch
    #[default]
    Ask,
    /// Replace the remote notes with the local ones verbatim
    OverwriteRemote,
    /// Merge regardless of the difference
    Merge,
}

/// Local/remote note counts that tripped the volume guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeMismatch {
    pub local: usize,
    pub remote: usize,
    pub tolerance: usize,
}

/// Returns the mismatch when `local > remote + tolerance`.
pub const fn check_volume(local: usize, remote: usize, tolerance: usize) -> Option<VolumeMismatch> {
    if local > remote.saturating_add(tolerance) {
        Some(VolumeMismatch {
            local,
            remote,
            tolerance,
        })
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    Merged,
    OverwroteRemote,
}

/// New state produced by a successful reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub notes: Vec<Note>,
    pub order: Vec<NoteId>,
    /// Merged categories and order, when categories took part
    pub categories: Option<(Categories, Vec<String>)>,
    pub report: MergeReport,
    pub mode: ReconcileMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Completed(Reconciled),
    NeedsDecision(VolumeMismatch),
}

/// Remote state adopted by a full re-sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSnapshot {
    pub notes: Vec<Note>,
    pub order: Vec<NoteId>,
    pub categories: Option<(Categories, Vec<String>)>,
}

/// Merge categories: remote entries win on equal keys, remote order first.
///
/// With no remote categories the local ones are kept as they are.
pub fn merge_categories(
    local: &Categories,
    local_order: &[String],
    remote: Option<(Categories, Vec<String>)>,
) -> (Categories, Vec<String>) {
    let Some((remote, remote_order)) = remote else {
        return (local.clone(), normalize_category_order(local, local_order));
    };

    let mut merged = local.clone();
    merged.extend(remote);
    let combined: Vec<String> = remote_order
        .into_iter()
        .chain(local_order.iter().cloned())
        .collect();
    let order = normalize_category_order(&merged, &combined);
    (merged, order)
}

/// Merges local and remote notes and persists the result to both stores.
pub struct ReconciliationEngine<R: RemoteStore, L: LocalStore> {
    remote: R,
    local: L,
    volume_tolerance: usize,
    in_flight: SingleFlight,
}

impl<R: RemoteStore, L: LocalStore> ReconciliationEngine<R, L> {
    pub fn new(remote: R, local: L) -> Self {
        Self {
            remote,
            local,
            volume_tolerance: DEFAULT_VOLUME_TOLERANCE,
            in_flight: SingleFlight::default(),
        }
    }

    #[must_use]
    pub fn with_volume_tolerance(mut self, tolerance: usize) -> Self {
        self.volume_tolerance = tolerance;
        self
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    pub const fn local(&self) -> &L {
        &self.local
    }

    pub const fn volume_tolerance(&self) -> usize {
        self.volume_tolerance
    }

    /// Reconcile `local_notes`/`local_order` with the user's remote notes.
    ///
    /// The caller's collections are only borrowed; the new state is returned.
    /// Concurrent calls for the same identity run one after the other.
    pub async fn reconcile(
        &self,
        user: &Identity,
        local_notes: &[Note],
        local_order: &[NoteId],
        choice: VolumeChoice,
    ) -> Result<ReconcileOutcome> {
        let _flight = self.in_flight.acquire(&user.user_id).await;
        self.reconcile_locked(user, local_notes, local_order, None, choice)
            .await
    }

    /// Like [`Self::reconcile`], with categories merged and written in the
    /// same step as the notes.
    pub async fn reconcile_with_categories(
        &self,
        user: &Identity,
        local_notes: &[Note],
        local_order: &[NoteId],
        (categories, category_order): (&Categories, &[String]),
        choice: VolumeChoice,
    ) -> Result<ReconcileOutcome> {
        let _flight = self.in_flight.acquire(&user.user_id).await;
        let remote = self.remote.load_categories(user).await?;
        let merged = merge_categories(categories, category_order, remote);
        self.reconcile_locked(user, local_notes, local_order, Some(merged), choice)
            .await
    }

    async fn reconcile_locked(
        &self,
        user: &Identity,
        local_notes: &[Note],
        local_order: &[NoteId],
        categories: Option<(Categories, Vec<String>)>,
        choice: VolumeChoice,
    ) -> Result<ReconcileOutcome> {
        let remote_notes = self.remote.load_notes(user).await?;

        if let Some(mismatch) =
            check_volume(local_notes.len(), remote_notes.len(), self.volume_tolerance)
        {
            match choice {
                VolumeChoice::Ask => {
                    tracing::warn!(
                        "Local has {} notes but remote only {}; waiting for a decision",
                        mismatch.local,
                        mismatch.remote
                    );
                    return Ok(ReconcileOutcome::NeedsDecision(mismatch));
                }
                VolumeChoice::OverwriteRemote => {
                    return self
                        .overwrite_remote(
                            user,
                            local_notes,
                            local_order,
                            categories,
                            remote_notes.len(),
                        )
                        .await
                        .map(ReconcileOutcome::Completed);
                }
                VolumeChoice::Merge => {
                    tracing::info!(
                        "Merging despite volume mismatch (local {}, remote {})",
                        mismatch.local,
                        mismatch.remote
                    );
                }
            }
        }

        let MergeResult { notes, report } = merge_notes(local_notes, &remote_notes);
        let order = reconcile_order(&notes, local_order);
        let notes = apply_order(notes, &order, OrphanPolicy::Drop);

        if notes.is_empty() {
            tracing::info!("Nothing to merge for {}; writing empty replace", user.user_id);
        }
        self.persist(user, &notes, &order, categories.as_ref())
            .await?;

        tracing::info!(
            "Reconciled {} local + {} remote note(s) into {} (tombstoned {}, single-origin {}, conflicts {})",
            report.local_count,
            report.remote_count,
            report.merged_count,
            report.excluded_tombstones,
            report.single_origin,
            report.conflicts
        );

        Ok(ReconcileOutcome::Completed(Reconciled {
            notes,
            order,
            categories,
            report,
            mode: ReconcileMode::Merged,
        }))
    }

    async fn overwrite_remote(
        &self,
        user: &Identity,
        local_notes: &[Note],
        local_order: &[NoteId],
        categories: Option<(Categories, Vec<String>)>,
        remote_count: usize,
    ) -> Result<Reconciled> {
        // Tombstoned notes vanish from the full replace
        let notes: Vec<Note> = local_notes
            .iter()
            .filter(|note| !note.deleted)
            .cloned()
            .collect();
        let order = reconcile_order(&notes, local_order);
        self.persist(user, &notes, &order, categories.as_ref())
            .await?;

        tracing::warn!(
            "Overwrote {} remote note(s) for {} with {} local note(s)",
            remote_count,
            user.user_id,
            notes.len()
        );

        let report = MergeReport {
            local_count: notes.len(),
            remote_count,
            merged_count: notes.len(),
            ..MergeReport::default()
        };
        Ok(Reconciled {
            notes,
            order,
            categories,
            report,
            mode: ReconcileMode::OverwroteRemote,
        })
    }

    async fn persist(
        &self,
        user: &Identity,
        notes: &[Note],
        order: &[NoteId],
        categories: Option<&(Categories, Vec<String>)>,
    ) -> Result<()> {
        self.remote.save_snapshot(user, notes, order).await?;
        if let Some((categories, category_order)) = categories {
            self.remote
                .save_categories(user, categories, category_order)
                .await?;
        }
        self.local.save_snapshot(&LocalSnapshot {
            notes: Some(notes),
            note_order: Some(order),
            categories: categories.map(|(categories, _)| categories),
            category_order: categories.map(|(_, order)| order.as_slice()),
            synced_user: Some(&user.user_id),
            ..LocalSnapshot::default()
        })?;
        self.local.clear_staged()
    }

    /// Replace local state with the remote store's view.
    pub async fn full_resync(&self, user: &Identity) -> Result<RemoteSnapshot> {
        let _flight = self.in_flight.acquire(&user.user_id).await;

        let stored = self.remote.load_notes(user).await?;
        let remote_order = self.remote.load_note_order(user).await?;
        let categories = self
            .remote
            .load_categories(user)
            .await?
            .map(|(categories, order)| {
                let order = normalize_category_order(&categories, &order);
                (categories, order)
            });

        let live: Vec<Note> = stored.into_iter().filter(|note| !note.deleted).collect();
        let order = reconcile_order(&live, &remote_order);
        let notes = apply_order(live, &order, OrphanPolicy::Drop);

        self.local.save_snapshot(&LocalSnapshot {
            notes: Some(&notes),
            note_order: Some(&order),
            categories: categories.as_ref().map(|(categories, _)| categories),
            category_order: categories.as_ref().map(|(_, order)| order.as_slice()),
            synced_user: Some(&user.user_id),
            ..LocalSnapshot::default()
        })?;
        self.local.clear_staged()?;

        tracing::info!("Full re-sync loaded {} note(s) for {}", notes.len(), user.user_id);
        Ok(RemoteSnapshot {
            notes,
            order,
            categories,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteLocalStore;
    use crate::models::{default_categories, Category};
    use crate::remote::{MemoryRemoteStore, RemoteOp};
    use chrono::{DateTime, Utc};
    use pretty_assertions::assert_eq;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap()
    }

    fn note(id: i64, text: &str, updated: i64) -> Note {
        Note {
            id: NoteId::from_raw(id),
            text: text.to_string(),
            category: "work".to_string(),
            timestamp: "2023-11-14 22:13:20".to_string(),
            completed: false,
            updated_at: Some(at(updated)),
            deleted: false,
        }
    }

    fn ids(notes: &[Note]) -> Vec<i64> {
        notes.iter().map(|note| note.id.value()).collect()
    }

    fn alice() -> Identity {
        Identity::new("alice", None).unwrap()
    }

    fn engine() -> ReconciliationEngine<MemoryRemoteStore, SqliteLocalStore> {
        ReconciliationEngine::new(
            MemoryRemoteStore::new(),
            SqliteLocalStore::open_in_memory().unwrap(),
        )
    }

    fn completed(outcome: ReconcileOutcome) -> Reconciled {
        match outcome {
            ReconcileOutcome::Completed(reconciled) => reconciled,
            ReconcileOutcome::NeedsDecision(mismatch) => {
                panic!("unexpected volume decision: {mismatch:?}")
            }
        }
    }

    #[test]
    fn volume_guard_threshold() {
        assert_eq!(
            check_volume(25, 10, DEFAULT_VOLUME_TOLERANCE),
            Some(VolumeMismatch {
                local: 25,
                remote: 10,
                tolerance: 10
            })
        );
        assert_eq!(check_volume(20, 10, DEFAULT_VOLUME_TOLERANCE), None);
        assert_eq!(check_volume(0, 0, DEFAULT_VOLUME_TOLERANCE), None);
    }

    #[tokio::test]
    async fn scenario_remote_edit_wins() {
        let engine = engine();
        engine
            .remote()
            .seed_notes(&alice(), vec![note(1, "a-edited", 10)])
            .await;

        let local = vec![note(1, "a", 0)];
        let order = vec![NoteId::from_raw(1)];
        let result = completed(
            engine
                .reconcile(&alice(), &local, &order, VolumeChoice::Ask)
                .await
                .unwrap(),
        );

        assert_eq!(result.notes.len(), 1);
        assert_eq!(result.notes[0].text, "a-edited");
        assert_eq!(result.mode, ReconcileMode::Merged);
    }

    #[tokio::test]
    async fn scenario_remote_tombstone_removes_note() {
        let engine = engine();
        let mut tombstone = note(2, "x", 10);
        tombstone.deleted = true;
        engine.remote().seed_notes(&alice(), vec![tombstone]).await;

        let result = completed(
            engine
                .reconcile(&alice(), &[note(2, "x", 0)], &[], VolumeChoice::Ask)
                .await
                .unwrap(),
        );

        assert!(result.notes.is_empty());
        assert!(result.order.is_empty());
        assert_eq!(result.report.excluded_tombstones, 1);
        // Explicit empty replace reached the remote store
        assert!(engine.remote().stored_notes(&alice()).await.is_empty());
    }

    #[tokio::test]
    async fn volume_guard_requests_decision_without_writing() {
        let engine = engine();
        let remote: Vec<Note> = (0..10).map(|i| note(i, "remote", 0)).collect();
        engine.remote().seed_notes(&alice(), remote.clone()).await;
        let local: Vec<Note> = (100..125).map(|i| note(i, "local", 0)).collect();

        let outcome = engine
            .reconcile(&alice(), &local, &[], VolumeChoice::Ask)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::NeedsDecision(VolumeMismatch {
                local: 25,
                remote: 10,
                tolerance: 10
            })
        );
        assert_eq!(engine.remote().stored_notes(&alice()).await, remote);
        assert!(engine.local().load_notes().unwrap().is_none());
    }

    #[tokio::test]
    async fn overwrite_choice_replaces_remote_verbatim() {
        let engine = engine();
        engine
            .remote()
            .seed_notes(&alice(), (0..10).map(|i| note(i, "remote", 0)).collect())
            .await;
        let local: Vec<Note> = (100..125).map(|i| note(i, "local", 0)).collect();

        let result = completed(
            engine
                .reconcile(&alice(), &local, &[], VolumeChoice::OverwriteRemote)
                .await
                .unwrap(),
        );

        assert_eq!(result.mode, ReconcileMode::OverwroteRemote);
        assert_eq!(result.notes, local);
        assert_eq!(engine.remote().stored_notes(&alice()).await, local);
    }

    #[tokio::test]
    async fn merge_choice_proceeds_past_volume_guard() {
        let engine = engine();
        engine
            .remote()
            .seed_notes(&alice(), vec![note(1, "remote", 0)])
            .await;
        let local: Vec<Note> = (100..115).map(|i| note(i, "local", 0)).collect();

        let result = completed(
            engine
                .reconcile(&alice(), &local, &[], VolumeChoice::Merge)
                .await
                .unwrap(),
        );

        assert_eq!(result.notes.len(), 16);
        assert_eq!(result.mode, ReconcileMode::Merged);
    }

    #[tokio::test]
    async fn new_ids_lead_and_prior_order_is_stable() {
        let engine = engine();
        engine
            .remote()
            .seed_notes(&alice(), vec![note(4, "remote new", 50), note(2, "b", 0)])
            .await;
        let local = vec![note(1, "a", 0), note(2, "b", 0), note(3, "c", 0), note(5, "local new", 60)];
        let prior: Vec<NoteId> = [3, 1, 2].into_iter().map(NoteId::from_raw).collect();

        let result = completed(
            engine
                .reconcile(&alice(), &local, &prior, VolumeChoice::Ask)
                .await
                .unwrap(),
        );

        assert_eq!(ids(&result.notes), vec![5, 4, 3, 1, 2]);
        assert_eq!(
            result.order,
            result.notes.iter().map(|note| note.id).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn reconcile_is_idempotent() {
        let engine = engine();
        engine
            .remote()
            .seed_notes(&alice(), vec![note(1, "remote", 10), note(7, "only remote", 3)])
            .await;
        let local = vec![note(1, "local", 0), note(2, "only local", 5)];

        let first = completed(
            engine
                .reconcile(&alice(), &local, &[], VolumeChoice::Ask)
                .await
                .unwrap(),
        );
        let second = completed(
            engine
                .reconcile(&alice(), &first.notes, &first.order, VolumeChoice::Ask)
                .await
                .unwrap(),
        );

        assert_eq!(first.notes, second.notes);
        assert_eq!(first.order, second.order);
        assert_eq!(second.report.single_origin, 0);
    }

    #[tokio::test]
    async fn result_is_written_to_both_stores_and_clears_staging() {
        let engine = engine();
        engine.local().mark_pending_sync().unwrap();
        let local = vec![note(1, "a", 0)];

        let result = completed(
            engine
                .reconcile(&alice(), &local, &[], VolumeChoice::Ask)
                .await
                .unwrap(),
        );

        assert_eq!(engine.remote().stored_notes(&alice()).await, result.notes);
        assert_eq!(engine.local().load_notes().unwrap(), Some(result.notes));
        assert_eq!(engine.local().load_note_order().unwrap(), Some(result.order));
        assert!(!engine.local().is_pending_sync().unwrap());
    }

    #[tokio::test]
    async fn fetch_failure_aborts_without_local_writes() {
        let engine = engine();
        engine.remote().set_failing(RemoteOp::LoadNotes, true).await;

        let error = engine
            .reconcile(&alice(), &[note(1, "a", 0)], &[], VolumeChoice::Ask)
            .await
            .unwrap_err();

        assert!(error.is_network());
        assert!(engine.local().load_notes().unwrap().is_none());
    }

    #[tokio::test]
    async fn persist_failure_aborts_without_local_writes() {
        let engine = engine();
        engine
            .remote()
            .seed_notes(&alice(), vec![note(9, "remote", 0)])
            .await;
        engine.remote().set_failing(RemoteOp::SaveNotes, true).await;

        let error = engine
            .reconcile(&alice(), &[note(1, "a", 0)], &[], VolumeChoice::Ask)
            .await
            .unwrap_err();

        assert!(error.is_network());
        assert!(engine.local().load_notes().unwrap().is_none());
        assert_eq!(engine.remote().stored_notes(&alice()).await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_reconciles_for_one_user_both_complete() {
        let engine = engine();
        let user = alice();
        let local = vec![note(1, "a", 0), note(2, "b", 1)];

        let (first, second) = tokio::join!(
            engine.reconcile(&user, &local, &[], VolumeChoice::Ask),
            engine.reconcile(&user, &local, &[], VolumeChoice::Ask),
        );

        let first = completed(first.unwrap());
        let second = completed(second.unwrap());
        assert_eq!(first.notes, second.notes);
        assert_eq!(engine.remote().stored_notes(&alice()).await, first.notes);
    }

    #[tokio::test]
    async fn categories_are_written_with_the_notes() {
        let engine = engine();
        let (categories, order) = default_categories();
        let mut remote_categories = Categories::new();
        remote_categories.insert("work".to_string(), Category::new("Job", "🏢", "navy"));
        engine
            .remote()
            .save_categories(&alice(), &remote_categories, &["work".to_string()])
            .await
            .unwrap();

        let result = completed(
            engine
                .reconcile_with_categories(
                    &alice(),
                    &[note(1, "a", 0)],
                    &[],
                    (&categories, order.as_slice()),
                    VolumeChoice::Ask,
                )
                .await
                .unwrap(),
        );

        let (merged, merged_order) = result.categories.unwrap();
        assert_eq!(merged["work"].name, "Job");
        assert_eq!(engine.local().load_categories().unwrap(), Some(merged));
        assert_eq!(engine.local().load_category_order().unwrap(), Some(merged_order));
        assert_eq!(engine.local().last_synced_user().unwrap(), Some("alice".to_string()));
    }

    #[tokio::test]
    async fn failed_note_fetch_leaves_categories_unwritten() {
        let engine = engine();
        let (categories, order) = default_categories();
        let mut remote_categories = Categories::new();
        remote_categories.insert("work".to_string(), Category::new("Job", "🏢", "navy"));
        engine
            .remote()
            .save_categories(&alice(), &remote_categories, &["work".to_string()])
            .await
            .unwrap();
        engine.remote().set_failing(RemoteOp::LoadNotes, true).await;

        let error = engine
            .reconcile_with_categories(
                &alice(),
                &[note(1, "a", 0)],
                &[],
                (&categories, order.as_slice()),
                VolumeChoice::Ask,
            )
            .await
            .unwrap_err();

        assert!(error.is_network());
        assert!(engine.local().load_categories().unwrap().is_none());
        let (stored, _) = engine.remote().load_categories(&alice()).await.unwrap().unwrap();
        assert_eq!(stored, remote_categories);
    }

    #[tokio::test]
    async fn local_tombstone_beats_older_remote_copy() {
        let engine = engine();
        engine
            .remote()
            .seed_notes(&alice(), vec![note(1, "keep", 0), note(2, "delete me", 0)])
            .await;
        let mut tombstone = note(2, "delete me", 10);
        tombstone.deleted = true;

        let result = completed(
            engine
                .reconcile(&alice(), &[note(1, "keep", 0), tombstone], &[], VolumeChoice::Ask)
                .await
                .unwrap(),
        );

        assert_eq!(ids(&result.notes), vec![1]);
        assert_eq!(ids(&engine.remote().stored_notes(&alice()).await), vec![1]);
    }

    #[tokio::test]
    async fn full_resync_adopts_remote_state() {
        let engine = engine();
        let mut gone = note(3, "gone", 5);
        gone.deleted = true;
        engine
            .remote()
            .seed_notes(&alice(), vec![note(1, "one", 0), note(2, "two", 0), gone])
            .await;
        engine
            .remote()
            .save_note_order(&alice(), &[NoteId::from_raw(1), NoteId::from_raw(2)])
            .await
            .unwrap();

        let snapshot = engine.full_resync(&alice()).await.unwrap();

        assert_eq!(ids(&snapshot.notes), vec![1, 2]);
        assert!(snapshot.categories.is_none());
        assert_eq!(engine.local().load_notes().unwrap(), Some(snapshot.notes));
    }

    #[test]
    fn merge_categories_prefers_remote_entries() {
        let (local, local_order) = default_categories();
        let mut remote = Categories::new();
        remote.insert("work".to_string(), Category::new("Job", "🏢", "navy"));
        remote.insert("custom_1".to_string(), Category::new("Books", "📚", "purple"));
        let remote_order = vec!["custom_1".to_string(), "work".to_string()];

        let (merged, order) = merge_categories(&local, &local_order, Some((remote, remote_order)));

        assert_eq!(merged["work"].name, "Job");
        assert_eq!(merged.len(), 5);
        assert_eq!(order, vec!["custom_1", "work", "personal", "idea", "todo"]);
    }

    #[test]
    fn merge_categories_without_remote_keeps_local() {
        let (local, local_order) = default_categories();
        let (merged, order) = merge_categories(&local, &local_order, None);
        assert_eq!(merged, local);
        assert_eq!(order, local_order);
    }
}
