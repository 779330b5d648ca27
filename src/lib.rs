//! # Price Oracle
//!
//! A weighted price oracle aggregator. Up to ten independent price sources
//! are registered with a weight and a staleness budget; on demand the oracle
//! fetches every active source, drops samples that are too old, and publishes
//! the weighted mean as the canonical price.
//!
//! ## Architecture
//!
//! - **Oracle**: source registry, aggregation engine, deviation monitor and
//!   the single-writer [`oracle::OracleAggregator`] service
//! - **Access**: role-based gate applied to every mutating call
//! - **Storage**: snapshot persistence backends
//! - **CLI / RPC**: operator tooling and an HTTP/JSON front end
//!
//! ## Example
//!
//! ```rust,ignore
//! use price_oracle::prelude::*;
//!
//! let oracle = OracleAggregator::new("admin", fetcher);
//! let admin = AuthorizationContext::new("admin");
//!
//! oracle.add_source(&admin, "chainlink".into(), 6_000, 60).await?;
//! oracle.add_source(&admin, "pyth".into(), 4_000, 60).await?;
//! let result = oracle.recompute_aggregate(&admin).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod access;
pub mod cli;
pub mod error;
pub mod oracle;
#[cfg(feature = "rpc-server")]
pub mod rpc;
pub mod storage;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::access::{AccessControl, AuthorizationContext, Principal, Role};
    pub use crate::error::{Error, Result};
    pub use crate::oracle::{
        aggregator::{AggregateResult, PriceAggregator},
        config::OracleConfig,
        deviation::{DeviationConfig, DeviationReport},
        events::{OracleEvent, OracleEventKind},
        fetchers::{PriceFetcher, Sample, SourceSample, StaticPriceFetcher},
        registry::{Source, SourceId},
        service::OracleAggregator,
    };
    pub use crate::storage::{FileStore, InMemoryStore, StorageBackend};
    pub use crate::utils::time::{Clock, ManualClock, SystemClock};
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
