//! Oracle module for weighted price aggregation.
//!
//! This module provides:
//! - A bounded registry of weighted price sources
//! - Concurrent sample fetching with per-source timeouts
//! - Staleness filtering and the weighted mean
//! - An advisory deviation monitor
//! - The [`OracleAggregator`] service boundary tying it all together
//!
//! ## Usage
//!
//! ```rust,ignore
//! use price_oracle::oracle::{OracleAggregator, StaticPriceFetcher};
//!
//! let oracle = OracleAggregator::new("admin", Arc::new(StaticPriceFetcher::new()));
//! let price = oracle.get_latest_price();
//! ```

pub mod aggregator;
pub mod config;
pub mod deviation;
pub mod events;
pub mod fetchers;
pub mod registry;
pub mod service;

pub use aggregator::*;
pub use config::{ConfigError, OracleConfig, SourceSpec};
pub use deviation::*;
pub use events::*;
pub use fetchers::*;
pub use registry::*;
pub use service::{OracleAggregator, OracleSnapshot, OracleStatistics};
