//! Application services shared by Quick Memo front ends.

mod memo;

pub use memo::{AppState, DeleteOutcome, MemoService, SyncOutcome};
