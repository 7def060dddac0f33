//! Manual note order reconciliation.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use crate::models::{Note, NoteId};

/// What to do with notes whose id does not appear in the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrphanPolicy {
    /// Leave them out of the ordered result
    #[default]
    Drop,
    /// Keep them after the ordered notes, in their original relative order
    Append,
}

/// Compute the order for `notes` given the user's prior manual order.
///
/// Prior ids that still exist keep their relative order (first occurrence
/// wins for repeats). Ids the prior order does not know go in front, most
/// recently touched first.
pub fn reconcile_order(notes: &[Note], prior_order: &[NoteId]) -> Vec<NoteId> {
    let surviving: HashSet<NoteId> = notes.iter().map(|note| note.id).collect();
    let mut seen = HashSet::new();
    let existing: Vec<NoteId> = prior_order
        .iter()
        .copied()
        .filter(|id| surviving.contains(id) && seen.insert(*id))
        .collect();

    let mut new_notes: Vec<&Note> = notes
        .iter()
        .filter(|note| !seen.contains(&note.id))
        .collect();
    new_notes.sort_by_key(|note| Reverse((note.recency(), note.id)));

    let mut order = Vec::with_capacity(existing.len() + new_notes.len());
    for note in new_notes {
        if seen.insert(note.id) {
            order.push(note.id);
        }
    }
    order.extend(existing);
    order
}

/// Arrange `notes` to follow `order`.
pub fn apply_order(notes: Vec<Note>, order: &[NoteId], policy: OrphanPolicy) -> Vec<Note> {
    let original_ids: Vec<NoteId> = notes.iter().map(|note| note.id).collect();
    let mut by_id: HashMap<NoteId, Note> = notes.into_iter().map(|note| (note.id, note)).collect();

    let mut ordered: Vec<Note> = order.iter().filter_map(|id| by_id.remove(id)).collect();

    if !by_id.is_empty() {
        match policy {
            OrphanPolicy::Drop => {
                tracing::debug!("Dropping {} note(s) absent from the order", by_id.len());
            }
            OrphanPolicy::Append => {
                for id in original_ids {
                    if let Some(note) = by_id.remove(&id) {
                        ordered.push(note);
                    }
                }
            }
        }
    }
    ordered
}

/// Move `id` to `position` in the manual order.
///
/// Notes missing from `order` are backfilled first so the move is applied to
/// the order the user actually sees. The position is clamped to the list.
pub fn move_in_order(notes: &[Note], order: &[NoteId], id: NoteId, position: usize) -> Vec<NoteId> {
    let mut order = reconcile_order(notes, order);
    let Some(current) = order.iter().position(|candidate| *candidate == id) else {
        return order;
    };
    order.remove(current);
    let position = position.min(order.len());
    order.insert(position, id);
    order
}
