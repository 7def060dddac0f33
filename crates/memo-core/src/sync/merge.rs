//! Last-write-wins merge of local and remote note sets.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{Note, NoteId};

/// Which side a copy of a note came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

/// Diagnostics describing what a merge kept and dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub local_count: usize,
    pub remote_count: usize,
    pub merged_count: usize,
    /// Ids whose surviving copy carried `deleted == true`
    pub excluded_tombstones: usize,
    /// Ids present in exactly one origin
    pub single_origin: usize,
    pub local_only: usize,
    pub remote_only: usize,
    /// Ids present in both origins
    pub conflicts: usize,
    pub local_wins: usize,
    pub remote_wins: usize,
    /// Extra copies of an id inside one origin that were folded away
    pub duplicates_collapsed: usize,
}

/// Merged notes (ascending id order) plus the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub notes: Vec<Note>,
    pub report: MergeReport,
}

#[derive(Default)]
struct Copies {
    local: Option<Note>,
    remote: Option<Note>,
}

impl Copies {
    fn slot(&mut self, origin: Origin) -> &mut Option<Note> {
        match origin {
            Origin::Local => &mut self.local,
            Origin::Remote => &mut self.remote,
        }
    }
}

/// Whether `candidate` should replace `current` as the surviving copy.
///
/// Later recency wins; on equal recency the candidate wins, which makes the
/// remote copy the tie winner because it is offered second.
pub(crate) fn supersedes(candidate: &Note, current: &Note) -> bool {
    candidate.recency() >= current.recency()
}

/// Merge local and remote notes into one deduplicated, tombstone-free set.
pub fn merge_notes(local: &[Note], remote: &[Note]) -> MergeResult {
    let mut report = MergeReport {
        local_count: local.len(),
        remote_count: remote.len(),
        ..MergeReport::default()
    };

    let mut grouped: BTreeMap<NoteId, Copies> = BTreeMap::new();
    let tagged = local
        .iter()
        .map(|note| (Origin::Local, note))
        .chain(remote.iter().map(|note| (Origin::Remote, note)));

    for (origin, note) in tagged {
        let slot = grouped.entry(note.id).or_default().slot(origin);
        if let Some(existing) = slot.as_mut() {
            report.duplicates_collapsed += 1;
            if supersedes(note, existing) {
                *existing = note.clone();
            }
        } else {
            *slot = Some(note.clone());
        }
    }

    let mut notes = Vec::with_capacity(grouped.len());
    for copies in grouped.into_values() {
        let winner = match (copies.local, copies.remote) {
            (Some(local), Some(remote)) => {
                report.conflicts += 1;
                if supersedes(&remote, &local) {
                    report.remote_wins += 1;
                    remote
                } else {
                    report.local_wins += 1;
                    local
                }
            }
            (Some(local), None) => {
                report.single_origin += 1;
                report.local_only += 1;
                local
            }
            (None, Some(remote)) => {
                report.single_origin += 1;
                report.remote_only += 1;
                remote
            }
            (None, None) => continue,
        };

        if winner.deleted {
            report.excluded_tombstones += 1;
        } else {
            notes.push(winner);
        }
    }

    report.merged_count = notes.len();
    MergeResult { notes, report }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
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

    #[test]
    fn later_remote_edit_wins() {
        let local = vec![note(1, "a", 0)];
        let remote = vec![note(1, "a-edited", 10)];

        let merged = merge_notes(&local, &remote);

        assert_eq!(merged.notes.len(), 1);
        assert_eq!(merged.notes[0].text, "a-edited");
        assert_eq!(merged.report.remote_wins, 1);
        assert_eq!(merged.report.conflicts, 1);
    }

    #[test]
    fn later_local_edit_wins_including_completed_flag() {
        let mut newer = note(1, "local text", 20);
        newer.completed = true;
        let merged = merge_notes(&[newer.clone()], &[note(1, "remote text", 10)]);

        assert_eq!(merged.notes, vec![newer]);
        assert_eq!(merged.report.local_wins, 1);
    }

    #[test]
    fn remote_tombstone_excludes_note() {
        let local = vec![note(2, "x", 0)];
        let mut tombstone = note(2, "x", 5);
        tombstone.deleted = true;

        let merged = merge_notes(&local, &[tombstone]);

        assert!(merged.notes.is_empty());
        assert_eq!(merged.report.excluded_tombstones, 1);
    }

    #[test]
    fn newer_local_copy_resurrects_over_older_tombstone() {
        let mut tombstone = note(3, "x", 0);
        tombstone.deleted = true;
        let merged = merge_notes(&[note(3, "edited after delete", 5)], &[tombstone]);

        assert_eq!(merged.notes.len(), 1);
        assert_eq!(merged.report.excluded_tombstones, 0);
    }

    #[test]
    fn single_copies_are_kept_unless_tombstoned() {
        let mut gone = note(5, "gone", 0);
        gone.deleted = true;
        let merged = merge_notes(&[note(4, "local only", 0)], &[note(6, "remote only", 0), gone]);

        let ids: Vec<i64> = merged.notes.iter().map(|n| n.id.value()).collect();
        assert_eq!(ids, vec![4, 6]);
        assert_eq!(merged.report.single_origin, 3);
        assert_eq!(merged.report.local_only, 1);
        assert_eq!(merged.report.remote_only, 2);
        assert_eq!(merged.report.excluded_tombstones, 1);
    }

    #[test]
    fn missing_updated_at_falls_back_to_timestamp() {
        let mut legacy = note(7, "legacy", 0);
        legacy.updated_at = None;
        legacy.timestamp = "2030-01-01 00:00:00".to_string();

        let merged = merge_notes(&[legacy.clone()], &[note(7, "newer?", 100)]);
        assert_eq!(merged.notes[0].text, "legacy");
    }

    #[test]
    fn equal_recency_keeps_one_of_the_copies() {
        // Which copy survives a tie is unspecified; only membership is asserted.
        let local = note(8, "left", 0);
        let remote = note(8, "right", 0);
        let merged = merge_notes(&[local.clone()], &[remote.clone()]);

        assert_eq!(merged.notes.len(), 1);
        assert!(merged.notes[0] == local || merged.notes[0] == remote);
    }

    #[test]
    fn duplicates_within_one_origin_collapse_to_latest() {
        let older = note(9, "older", 0);
        let newer = note(9, "newer", 30);
        let merged = merge_notes(&[newer, older], &[]);

        assert_eq!(merged.notes.len(), 1);
        assert_eq!(merged.notes[0].text, "newer");
        assert_eq!(merged.report.duplicates_collapsed, 1);
    }

    #[test]
    fn merge_is_idempotent() {
        let local = vec![note(1, "a", 0), note(2, "b", 5)];
        let mut remote_edit = note(2, "b2", 10);
        remote_edit.updated_at = Some(at(10) + Duration::seconds(1));
        let remote = vec![remote_edit, note(3, "c", 1)];

        let first = merge_notes(&local, &remote);
        let second = merge_notes(&first.notes, &first.notes);

        assert_eq!(first.notes, second.notes);
    }
}
