//! # Repo Sync Core
//!
//! Runtime-agnostic logic for repo-sync: file and repository models,
//! reconciliation of source listings against stored state, the typed AI
//! analysis schema with its tolerant parser, regex structure extraction,
//! and the [`store::SyncStateStore`] abstraction with an in-memory
//! implementation.
//!
//! This crate does no network or filesystem I/O. The SQLite store, source
//! adapters, summarizers and the sync engine live in the `repo-sync` crate.

pub mod analysis;
pub mod error;
pub mod language;
pub mod models;
pub mod reconcile;
pub mod store;
pub mod structure;

pub use error::SyncError;
