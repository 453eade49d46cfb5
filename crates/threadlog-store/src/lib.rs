//! # threadlog-store
//!
//! Local thread index backed by SQLite.
//!
//! Holds per-thread head pointers, one metadata record per indexed block,
//! the per-thread peer roster, the local profile and cafe sessions.  The
//! crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for every model.

pub mod blocks;
pub mod database;
pub mod invites;
pub mod migrations;
pub mod models;
pub mod peers;
pub mod profile;
pub mod sessions;
pub mod threads;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
