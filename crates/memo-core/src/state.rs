//! Sync status shown by front ends.

use std::fmt;

/// Where the in-memory state stands relative to the remote store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// No identity signed in
    Offline,
    /// A reconcile or remote write is running
    Syncing,
    /// Last remote operation succeeded and nothing is staged
    Synced,
    /// Local changes are staged after a failed or skipped remote write
    Pending,
    /// Last remote operation failed
    Error,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Error => "error",
        })
    }
}
