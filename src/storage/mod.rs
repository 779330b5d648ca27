//! Storage module for persistent data management.
//!
//! The oracle persists one snapshot (registry, latest aggregate, deviation
//! threshold and role table) after every successful mutation.
//!
//! ## Backends
//!
//! - **InMemoryStore**: process-local, used by tests and storage-less setups
//! - **FileStore**: file per key with atomic replacement
//!
//! ## Usage
//!
//! ```rust,ignore
//! use price_oracle::storage::{put_json, FileStore};
//! use price_oracle::utils::constants::SNAPSHOT_KEY;
//!
//! let store = FileStore::new("/var/lib/price-oracle")?;
//! put_json(&store, SNAPSHOT_KEY, &oracle.snapshot())?;
//! ```

pub mod backend;

pub use backend::*;
