//! # Repo Sync
//!
//! Incremental repository synchronization with AI enrichment.
//!
//! Repo Sync lists the files of a repository from a source (GitHub or a
//! local checkout), reconciles the listing against what was stored on the
//! previous run, sends only new or changed files through a bounded,
//! retrying summarizer pipeline, and commits the result to a SQLite sync
//! state store in idempotent chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌─────────────┐   ┌──────────┐
//! │   Sources   │──▶│  Reconcile  │──▶│   Enrich    │──▶│  SQLite  │
//! │ GitHub/Local│   │ new/mod/del │   │ summarizer  │   │  store   │
//! └─────────────┘   └─────────────┘   └─────────────┘   └────┬─────┘
//!                                                            │
//!                                                            ▼
//!                                                      ┌──────────┐
//!                                                      │   CLI    │
//!                                                      │(reposync)│
//!                                                      └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! reposync init                          # create database
//! reposync sync acme/app                 # sync from GitHub
//! reposync sync acme/app --local ./app   # sync a local checkout
//! reposync status acme/app               # sync state and recent runs
//! reposync files acme/app --status deleted
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`traits`] | Source and summarizer extension traits |
//! | [`connector_github`] | GitHub contents API source |
//! | [`connector_fs`] | Local checkout source |
//! | [`summarizer`] | Gemini summarizer client |
//! | [`enrich`] | Bounded, retrying enrichment pipeline |
//! | [`sync`] | Sync orchestration and status transitions |
//! | [`sqlite_store`] | SQLite sync state store |
//! | [`progress`] | Progress reporting |
//! | [`stats`] | `status` command |
//! | [`get`] | `files`, `get` and `purge` commands |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//!
//! Pure logic (reconciliation, records, code analysis parsing, the store
//! trait and its in-memory implementation) lives in the `repo-sync-core`
//! crate.

pub mod config;
pub mod connector_fs;
pub mod connector_github;
pub mod db;
pub mod enrich;
pub mod get;
pub mod migrate;
pub mod progress;
pub mod sqlite_store;
pub mod stats;
pub mod summarizer;
pub mod sync;
pub mod traits;
