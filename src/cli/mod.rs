//! Price oracle command line support.
//!
//! Output formatting plus the wiring that turns an [`OracleConfig`] into a
//! running [`OracleAggregator`] (fetcher, store, clock).

pub mod output;

pub use output::*;

use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::oracle::{
    OracleAggregator, OracleConfig, PriceFetcher, Sample, SourceSpec, StaticPriceFetcher,
};
use crate::storage::{FileStore, StorageBackend};
use crate::utils::constants::MAX_CONFIDENCE_BPS;
use crate::utils::time::{Clock, SystemClock};

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE WIRING
// ═══════════════════════════════════════════════════════════════════════════════

/// Static fetcher serving each configured fixed `price`, stamped at `now`.
///
/// Sources without a fixed price fail every fetch.
pub fn static_fetcher(config: &OracleConfig, now: u64) -> Result<StaticPriceFetcher> {
    let fetcher = StaticPriceFetcher::new();
    for spec in &config.sources {
        if let Some(price) = spec.price {
            let confidence = spec.confidence_bps.unwrap_or(MAX_CONFIDENCE_BPS);
            fetcher.set_sample(spec.id.as_str(), Sample::new(price, now, confidence))?;
        }
    }
    Ok(fetcher)
}

/// Fetcher for the configured sources.
///
/// With the `http-fetcher` feature and at least one `url` configured, sources
/// are read over HTTP; otherwise the fixed prices are served.
pub fn fetcher_from_config(config: &OracleConfig, now: u64) -> Result<Arc<dyn PriceFetcher>> {
    #[cfg(feature = "http-fetcher")]
    {
        let endpoints: std::collections::HashMap<_, _> = config
            .sources
            .iter()
            .filter_map(|s| s.url.clone().map(|url| (s.id.as_str().into(), url)))
            .collect();
        if !endpoints.is_empty() {
            let fetcher: Arc<dyn PriceFetcher> =
                Arc::new(crate::oracle::HttpPriceFetcher::new(&config.http, endpoints)?);
            return Ok(fetcher);
        }
    }

    let fetcher: Arc<dyn PriceFetcher> = Arc::new(static_fetcher(config, now)?);
    Ok(fetcher)
}

/// File store under `data_dir`, if one is configured
pub fn store_from_config(config: &OracleConfig) -> Result<Option<Arc<dyn StorageBackend>>> {
    match &config.data_dir {
        Some(dir) => {
            let store: Arc<dyn StorageBackend> = Arc::new(FileStore::new(dir)?);
            Ok(Some(store))
        }
        None => Ok(None),
    }
}

/// Build an oracle from configuration using the wall clock
pub fn oracle_from_config(config: &OracleConfig) -> Result<OracleAggregator> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let fetcher = fetcher_from_config(config, clock.now())?;
    let store = store_from_config(config)?;
    OracleAggregator::from_config(config, fetcher, clock, store)
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIG FILE EDITS
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration as stored at `path`, without environment overrides
fn stored_config(path: &Path) -> Result<OracleConfig> {
    if path.exists() {
        Ok(OracleConfig::load(path)?)
    } else {
        Ok(OracleConfig::default())
    }
}

/// Record where a source's samples come from in the config file at `path`.
///
/// Later runs build their fetcher from this entry; the registry itself lives
/// in the stored snapshot.
pub fn record_source_endpoint(path: &Path, spec: SourceSpec) -> Result<()> {
    let mut config = stored_config(path)?;
    config.upsert_source(spec);
    config.validate()?;
    config.save(path)?;
    Ok(())
}

/// Drop a source's entry from the config file at `path`
pub fn forget_source_endpoint(path: &Path, id: &str) -> Result<bool> {
    let mut config = stored_config(path)?;
    if !config.remove_source(id) {
        return Ok(false);
    }
    config.save(path)?;
    Ok(true)
}
