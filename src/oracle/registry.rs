//! Source registry.
//!
//! Owns the set of registered price sources and their configuration. The
//! registry is pure state plus invariants:
//! - at most [`MAX_SOURCES`] sources, active or not
//! - at least [`MIN_ACTIVE_SOURCES`] active sources once that floor is reached
//! - every weight within `[1, 10000]` basis points
//!
//! Authorization is applied by the caller before any method here runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::utils::constants::{MAX_SOURCES, MIN_ACTIVE_SOURCES};
use crate::utils::math::validate_weight;

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE IDENTIFIER
// ═══════════════════════════════════════════════════════════════════════════════

/// Opaque handle identifying a price source
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Create a source id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE
// ═══════════════════════════════════════════════════════════════════════════════

/// A registered price source and its configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Source identifier
    pub id: SourceId,
    /// Weight in basis points (1-10000)
    pub weight: u64,
    /// Maximum tolerated sample age in seconds
    pub max_staleness_secs: u64,
    /// Whether the source participates in aggregation
    pub is_active: bool,
    /// Unix timestamp of registration
    pub added_at: u64,
}

impl Source {
    /// Whether a sample stamped `sample_timestamp` is fresh at `now`.
    ///
    /// Samples stamped in the future have age zero.
    pub fn is_fresh(&self, sample_timestamp: u64, now: u64) -> bool {
        now.saturating_sub(sample_timestamp) <= self.max_staleness_secs
    }

    /// Fetch timeout derived from the staleness budget, clamped to `[min, max]`
    pub fn fetch_timeout(&self, min: Duration, max: Duration) -> Duration {
        Duration::from_secs(self.max_staleness_secs).clamp(min, max.max(min))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Bounded registry of price sources, kept in registration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRegistry {
    sources: Vec<Source>,
}

impl SourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new active source
    pub fn add(
        &mut self,
        id: SourceId,
        weight: u64,
        max_staleness_secs: u64,
        now: u64,
    ) -> Result<&Source> {
        validate_weight(weight)?;

        if id.as_str().trim().is_empty() {
            return Err(Error::InvalidParameter {
                name: "source_id".into(),
                reason: "source id cannot be empty".into(),
            });
        }

        if self.sources.len() >= MAX_SOURCES {
            return Err(Error::TooManyRegistered { max: MAX_SOURCES });
        }

        if self.position(&id).is_some() {
            return Err(Error::SourceAlreadyExists(id.to_string()));
        }

        self.sources.push(Source {
            id,
            weight,
            max_staleness_secs,
            is_active: true,
            added_at: now,
        });

        let idx = self.sources.len() - 1;
        Ok(&self.sources[idx])
    }

    /// Remove a source, keeping the active floor
    pub fn remove(&mut self, id: &SourceId) -> Result<Source> {
        let idx = self
            .position(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if self.sources[idx].is_active {
            self.check_active_floor()?;
        }

        Ok(self.sources.remove(idx))
    }

    /// Change a source's weight, returning the previous weight
    pub fn update_weight(&mut self, id: &SourceId, weight: u64) -> Result<u64> {
        validate_weight(weight)?;

        let source = self.get_mut(id)?;
        let previous = source.weight;
        source.weight = weight;
        Ok(previous)
    }

    /// Activate or deactivate a source.
    ///
    /// Returns `false` if the source was already in the requested state.
    pub fn set_active(&mut self, id: &SourceId, active: bool) -> Result<bool> {
        let idx = self
            .position(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if self.sources[idx].is_active == active {
            return Ok(false);
        }
        if !active {
            self.check_active_floor()?;
        }

        self.sources[idx].is_active = active;
        Ok(true)
    }

    /// Look up a source
    pub fn get(&self, id: &SourceId) -> Option<&Source> {
        self.sources.iter().find(|s| &s.id == id)
    }

    /// All sources in registration order
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Active sources in registration order
    pub fn active(&self) -> Vec<&Source> {
        self.sources.iter().filter(|s| s.is_active).collect()
    }

    /// Number of active sources
    pub fn active_count(&self) -> usize {
        self.sources.iter().filter(|s| s.is_active).count()
    }

    /// Number of registered sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    fn position(&self, id: &SourceId) -> Option<usize> {
        self.sources.iter().position(|s| &s.id == id)
    }

    fn get_mut(&mut self, id: &SourceId) -> Result<&mut Source> {
        self.sources
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Fails if taking one active source away would breach the floor
    fn check_active_floor(&self) -> Result<()> {
        let active = self.active_count();
        if active.saturating_sub(1) < MIN_ACTIVE_SOURCES {
            return Err(Error::InsufficientActiveSources {
                active,
                min: MIN_ACTIVE_SOURCES,
            });
        }
        Ok(())
    }
}
