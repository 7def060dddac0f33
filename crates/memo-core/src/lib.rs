//! memo-core - Core library for Quick Memo
//!
//! This crate contains the models, local and remote stores, the
//! reconciliation engine and the application controller used by every
//! Quick Memo front end.

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod remote;
pub mod services;
pub mod session;
pub mod state;
pub mod sync;
pub mod util;
pub mod view;

pub use error::{Error, Result};
pub use models::{Categories, Category, Note, NoteId};
pub use services::{MemoService, SyncOutcome};
pub use session::Identity;
pub use state::SyncState;
pub use sync::{ReconcileOutcome, VolumeChoice};
