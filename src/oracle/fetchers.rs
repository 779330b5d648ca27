//! Price fetchers.
//!
//! A fetcher reads one raw [`Sample`] from one source on demand. Sources are
//! independent feeds; the aggregator only relies on the [`PriceFetcher`]
//! contract and treats any failure as "source absent this round".
//!
//! Implementations:
//! - [`StaticPriceFetcher`]: in-memory table, used by tests and the CLI
//! - [`HttpPriceFetcher`]: JSON over HTTP (requires the `http-fetcher` feature)

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::oracle::registry::SourceId;
use crate::utils::constants::MAX_CONFIDENCE_BPS;

// ═══════════════════════════════════════════════════════════════════════════════
// SAMPLE
// ═══════════════════════════════════════════════════════════════════════════════

/// One reading from a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Reported price (non-negative)
    pub price: Decimal,
    /// Unix timestamp at which the source produced the price
    pub timestamp: u64,
    /// Source confidence in basis points (informational only)
    pub confidence_bps: u16,
}

impl Sample {
    /// Create a new sample
    pub fn new(price: Decimal, timestamp: u64, confidence_bps: u16) -> Self {
        Self {
            price,
            timestamp,
            confidence_bps,
        }
    }

    /// Check the collaborator contract: price ≥ 0, confidence ≤ 10000
    pub fn validate(&self, source: &SourceId) -> Result<()> {
        if self.price.is_sign_negative() && !self.price.is_zero() {
            return Err(Error::InvalidSample {
                source_id: source.to_string(),
                reason: format!("negative price {}", self.price),
            });
        }
        if self.confidence_bps > MAX_CONFIDENCE_BPS {
            return Err(Error::InvalidSample {
                source_id: source.to_string(),
                reason: format!("confidence {} exceeds {}", self.confidence_bps, MAX_CONFIDENCE_BPS),
            });
        }
        Ok(())
    }

    /// Age of the sample at `now` (zero for future timestamps)
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.timestamp)
    }
}

/// A sample tagged with the source it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSample {
    /// Source queried
    pub source: SourceId,
    /// Sample returned
    pub sample: Sample,
}

// ═══════════════════════════════════════════════════════════════════════════════
// FETCHER TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Reads samples from price sources
#[async_trait]
pub trait PriceFetcher: Send + Sync {
    /// Fetch the current sample from `source`
    async fn fetch(&self, source: &SourceId) -> Result<Sample>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATIC FETCHER
// ═══════════════════════════════════════════════════════════════════════════════

/// Scripted reply of a [`StaticPriceFetcher`] entry
#[derive(Debug, Clone)]
pub enum StaticReply {
    /// Return the sample immediately
    Sample(Sample),
    /// Return the sample after a delay
    Delayed(Sample, Duration),
    /// Fail with the given reason
    Fail(String),
}

/// In-memory fetcher with a scripted reply per source
#[derive(Debug, Default)]
pub struct StaticPriceFetcher {
    replies: RwLock<HashMap<SourceId, StaticReply>>,
}

impl StaticPriceFetcher {
    /// Create an empty fetcher (every source fails)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sample served for `source`
    pub fn set_sample(&self, source: impl Into<SourceId>, sample: Sample) -> Result<()> {
        self.set_reply(source, StaticReply::Sample(sample))
    }

    /// Set the reply served for `source`
    pub fn set_reply(&self, source: impl Into<SourceId>, reply: StaticReply) -> Result<()> {
        self.replies
            .write()
            .map_err(|_| Error::Lock)?
            .insert(source.into(), reply);
        Ok(())
    }

    /// Stop serving `source`
    pub fn clear(&self, source: &SourceId) -> Result<()> {
        self.replies.write().map_err(|_| Error::Lock)?.remove(source);
        Ok(())
    }
}

#[async_trait]
impl PriceFetcher for StaticPriceFetcher {
    async fn fetch(&self, source: &SourceId) -> Result<Sample> {
        let reply = self
            .replies
            .read()
            .map_err(|_| Error::Lock)?
            .get(source)
            .cloned();

        match reply {
            Some(StaticReply::Sample(sample)) => Ok(sample),
            Some(StaticReply::Delayed(sample, delay)) => {
                tokio::time::sleep(delay).await;
                Ok(sample)
            }
            Some(StaticReply::Fail(reason)) => Err(Error::FetchFailed {
                source_id: source.to_string(),
                reason,
            }),
            None => Err(Error::FetchFailed {
                source_id: source.to_string(),
                reason: "no sample configured".into(),
            }),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HTTP FETCHER
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for HTTP price fetcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpFetcherConfig {
    /// Client-level timeout in milliseconds
    pub timeout_ms: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            user_agent: "price-oracle/0.1".to_string(),
        }
    }
}

/// JSON body served by an HTTP price source
#[derive(Debug, Deserialize)]
pub struct SampleResponse {
    /// Price as a decimal string
    pub price: String,
    /// Unix timestamp in seconds
    pub timestamp: u64,
    /// Confidence in basis points
    #[serde(default)]
    pub confidence_bps: u16,
}

impl SampleResponse {
    /// Parse into a sample without going through floating point
    pub fn into_sample(self, source: &SourceId) -> Result<Sample> {
        let price: Decimal = self.price.trim().parse().map_err(|e| Error::InvalidSample {
            source_id: source.to_string(),
            reason: format!("invalid price format: {}", e),
        })?;
        Ok(Sample::new(price, self.timestamp, self.confidence_bps))
    }
}

/// HTTP-based fetcher; each source id maps to a URL serving [`SampleResponse`]
#[cfg(feature = "http-fetcher")]
pub struct HttpPriceFetcher {
    client: reqwest::Client,
    endpoints: HashMap<SourceId, String>,
}

#[cfg(feature = "http-fetcher")]
impl HttpPriceFetcher {
    /// Create a new HTTP price fetcher
    pub fn new(config: &HttpFetcherConfig, endpoints: HashMap<SourceId, String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, endpoints })
    }
}

#[cfg(feature = "http-fetcher")]
#[async_trait]
impl PriceFetcher for HttpPriceFetcher {
    async fn fetch(&self, source: &SourceId) -> Result<Sample> {
        let url = self.endpoints.get(source).ok_or_else(|| Error::FetchFailed {
            source_id: source.to_string(),
            reason: "no endpoint configured".into(),
        })?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::FetchFailed {
                source_id: source.to_string(),
                reason: e.to_string(),
            })?;

        let body: SampleResponse = response.json().await.map_err(|e| Error::FetchFailed {
            source_id: source.to_string(),
            reason: format!("failed to parse response: {}", e),
        })?;

        body.into_sample(source)
    }
}
