//! # nanorss
//!
//! A small self-hosted aggregator for RSS/Atom feeds and monitored web pages.
//!
//! ## Architecture
//!
//! ```text
//! Worker → Fetcher → Normalizer → Store ← HTTP server
//! ```
//!
//! Every persistent record lives in one ordered key-value table. Multi-key
//! updates are written to a transaction log first and replayed on open, so
//! an interrupted update is either completed or never visible.
//!
//! ## Quick Start
//!
//! ```bash
//! # Create a user
//! nanorss set-password user01 secret
//!
//! # Start the server and the refresh worker
//! DATABASE_DIR=/var/lib/nanorss nanorss serve
//!
//! # Snapshot the database
//! nanorss backup --output nanorss.json
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together the store, the
/// fetcher and the configuration.
pub mod app;

/// Command-line interface using clap.
pub mod cli;

/// Configuration from an optional TOML file and environment variables.
pub mod config;

/// Core domain models.
///
/// - [`User`](domain::User): credentials and subscription documents
/// - [`Feeditem`](domain::Feeditem): one entry of a feed
/// - [`PagemonitorPage`](domain::PagemonitorPage): filtered text of a watched page
/// - [`FetchStatus`](domain::FetchStatus): last fetch outcomes
pub mod domain;

/// HTTP fetching.
///
/// - [`Fetcher`](fetcher::Fetcher): async trait for fetching a URL
/// - [`HttpFetcher`](fetcher::HttpFetcher): reqwest-based implementation
/// - [`ParallelFetcher`](fetcher::ParallelFetcher): refreshes subscriptions behind a semaphore
pub mod fetcher;

/// Feed parsing and page filtering.
pub mod normalizer;

/// HTTP UI and API built on axum.
pub mod server;

/// Key-value persistence layer.
///
/// - [`Database`](store::Database): entity stores, read status, TTL sweeper, backup
/// - [`KvBackend`](store::KvBackend): ordered key-value engine behind the database
pub mod store;

/// Periodic refresh and garbage collection.
pub mod worker;
