//! Aggregation engine.
//!
//! Turns the samples of the active sources into one weighted price:
//! 1. fetch every active source concurrently, each bounded by a timeout
//!    derived from its staleness budget
//! 2. drop failed, timed-out, invalid and stale samples
//! 3. `Σ(price × weight) / Σ(weight)` over the survivors only
//!
//! Outlier rejection is deliberately not done here; see
//! [`crate::oracle::deviation`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use crate::error::{Error, Result};
use crate::oracle::fetchers::{PriceFetcher, Sample, SourceSample};
use crate::oracle::registry::{Source, SourceId};
use crate::utils::constants::{DEFAULT_MAX_FETCH_TIMEOUT_MS, DEFAULT_MIN_FETCH_TIMEOUT_MS};
use crate::utils::math::weighted_mean;

// ═══════════════════════════════════════════════════════════════════════════════
// AGGREGATION RESULT
// ═══════════════════════════════════════════════════════════════════════════════

/// Why a source did not contribute to an aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExclusionReason {
    /// Sample older than the source's staleness budget
    Stale {
        /// Sample age in seconds
        age_secs: u64,
        /// Configured budget in seconds
        max_staleness_secs: u64,
    },
    /// Fetch did not answer in time
    Timeout {
        /// Timeout applied in milliseconds
        timeout_ms: u64,
    },
    /// Fetch failed or returned an invalid sample
    Failed(String),
}

/// A source left out of an aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedSource {
    /// Source identifier
    pub source: SourceId,
    /// Why it was excluded
    pub reason: ExclusionReason,
}

/// The published weighted price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Weighted mean price
    pub price: Decimal,
    /// Unix timestamp of computation
    pub computed_at: u64,
    /// Sources whose samples were used, in registry order
    pub contributing_sources: Vec<SourceId>,
    /// Sum of the contributing weights
    pub total_weight: u64,
    /// Sources queried but left out
    pub excluded_sources: Vec<ExcludedSource>,
}

/// Outcome of fetching one source
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Source configuration at fetch time
    pub source: Source,
    /// Sample or failure
    pub result: Result<Sample>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE AGGREGATOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Fetch fan-out and weighted averaging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceAggregator {
    min_fetch_timeout: Duration,
    max_fetch_timeout: Duration,
}

impl Default for PriceAggregator {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_MIN_FETCH_TIMEOUT_MS),
            Duration::from_millis(DEFAULT_MAX_FETCH_TIMEOUT_MS),
        )
    }
}

impl PriceAggregator {
    /// Create an aggregator with per-source fetch timeouts clamped to `[min, max]`
    pub fn new(min_fetch_timeout: Duration, max_fetch_timeout: Duration) -> Self {
        Self {
            min_fetch_timeout,
            max_fetch_timeout: max_fetch_timeout.max(min_fetch_timeout),
        }
    }

    /// Timeout applied to `source`
    pub fn timeout_for(&self, source: &Source) -> Duration {
        source.fetch_timeout(self.min_fetch_timeout, self.max_fetch_timeout)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // FETCHING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Fetch every source concurrently.
    ///
    /// Outcomes come back in the order of `sources`. A source that fails,
    /// times out or returns an invalid sample yields an `Err` outcome; it
    /// never fails the whole round.
    pub async fn collect(
        &self,
        fetcher: Arc<dyn PriceFetcher>,
        sources: Vec<Source>,
    ) -> Vec<FetchOutcome> {
        let mut results: Vec<Result<Sample>> = sources
            .iter()
            .map(|s| {
                Err(Error::Internal(format!("fetch task for {} did not complete", s.id)))
            })
            .collect();

        let mut tasks = JoinSet::new();
        for (idx, source) in sources.iter().enumerate() {
            let fetcher = Arc::clone(&fetcher);
            let id = source.id.clone();
            let timeout = self.timeout_for(source);

            tasks.spawn(async move {
                let result = match tokio::time::timeout(timeout, fetcher.fetch(&id)).await {
                    Ok(Ok(sample)) => sample.validate(&id).map(|_| sample),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(Error::FetchTimeout {
                        source_id: id.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    }),
                };
                (idx, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, result)) => results[idx] = result,
                Err(e) => tracing::error!(error = %e, "price fetch task panicked"),
            }
        }

        sources
            .into_iter()
            .zip(results)
            .map(|(source, result)| FetchOutcome { source, result })
            .collect()
    }

    /// Raw samples from the sources that answered, stale ones included
    pub fn fetched_samples(outcomes: &[FetchOutcome]) -> Vec<SourceSample> {
        outcomes
            .iter()
            .filter_map(|outcome| match &outcome.result {
                Ok(sample) => Some(SourceSample {
                    source: outcome.source.id.clone(),
                    sample: sample.clone(),
                }),
                Err(e) => {
                    tracing::debug!(source = %outcome.source.id, error = %e, "sample unavailable");
                    None
                }
            })
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // AGGREGATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Filter outcomes by freshness and compute the weighted mean.
    ///
    /// Fails with `NoFreshSources` when nothing survives; the weights of
    /// excluded sources take no part in either sum.
    pub fn aggregate(&self, outcomes: Vec<FetchOutcome>, now: u64) -> Result<AggregateResult> {
        let active = outcomes.len();
        let mut included: Vec<(SourceId, Decimal, u64)> = Vec::with_capacity(active);
        let mut excluded = Vec::new();

        for FetchOutcome { source, result } in outcomes {
            let reason = match result {
                Ok(sample) if source.is_fresh(sample.timestamp, now) => {
                    tracing::debug!(
                        source = %source.id,
                        price = %sample.price,
                        weight = source.weight,
                        confidence_bps = sample.confidence_bps,
                        "sample included"
                    );
                    included.push((source.id, sample.price, source.weight));
                    continue;
                }
                Ok(sample) => ExclusionReason::Stale {
                    age_secs: sample.age(now),
                    max_staleness_secs: source.max_staleness_secs,
                },
                Err(Error::FetchTimeout { timeout_ms, .. }) => ExclusionReason::Timeout { timeout_ms },
                Err(e) => ExclusionReason::Failed(e.to_string()),
            };

            tracing::warn!(source = %source.id, reason = ?reason, "source excluded from aggregation");
            excluded.push(ExcludedSource {
                source: source.id,
                reason,
            });
        }

        if included.is_empty() {
            return Err(Error::NoFreshSources {
                active,
                excluded: excluded.len(),
            });
        }

        let (price, total_weight) =
            weighted_mean(included.iter().map(|(_, price, weight)| (*price, *weight)))?;

        Ok(AggregateResult {
            price,
            computed_at: now,
            contributing_sources: included.into_iter().map(|(id, _, _)| id).collect(),
            total_weight,
            excluded_sources: excluded,
        })
    }
}
