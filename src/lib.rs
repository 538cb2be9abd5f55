//! # Lectern
//!
//! A document management server for teaching departments, usable both as a
//! standalone binary and as a library.
//!
//! Teachers upload, version, categorize and share documents and submit them
//! for review. Administrators manage accounts, storage quotas, runtime
//! configuration and backups.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! lectern = { version = "0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lectern::config::ServerConfig;
//! use lectern::server::{AppState, create_router};
//! use lectern::store::{SqliteStore, Store};
//!
//! let config = ServerConfig::default();
//! let store = SqliteStore::new(config.db_path()).unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState::new(Arc::new(store), config));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `lectern` binary. Disable with `default-features = false`.

pub mod auth;
pub mod config;
pub mod documents;
pub mod error;
pub mod server;
pub mod storage;
pub mod store;
pub mod system;
pub mod types;
