//! Database layer for Quick Memo

mod connection;
mod local_store;
pub mod migrations;

pub use connection::Database;
pub use local_store::{keys, LocalSnapshot, LocalStore, SqliteLocalStore};
