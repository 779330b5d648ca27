//! Oracle configuration.
//!
//! Loaded from a JSON file, overridable through `ORACLE_*` environment
//! variables, and validated before an oracle instance is built from it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::oracle::fetchers::HttpFetcherConfig;
use crate::utils::constants::{
    DEFAULT_DEVIATION_THRESHOLD_BPS, DEFAULT_EVENT_CAPACITY, DEFAULT_MAX_FETCH_TIMEOUT_MS,
    DEFAULT_MIN_FETCH_TIMEOUT_MS, MAX_SOURCES,
};
use crate::utils::math::validate_weight;

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE SPEC
// ═══════════════════════════════════════════════════════════════════════════════

/// A source registered when the oracle is bootstrapped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Source identifier
    pub id: String,
    /// Weight in basis points
    pub weight: u64,
    /// Maximum tolerated sample age in seconds
    pub max_staleness_secs: u64,
    /// HTTP endpoint serving samples (used with the `http-fetcher` feature)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Fixed price served by the static fetcher
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    /// Confidence reported with the fixed price
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_bps: Option<u16>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for an oracle instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Principal holding the initial admin role
    pub admin: String,
    /// Principals granted the manager role at bootstrap
    pub managers: Vec<String>,
    /// Deviation monitor threshold in basis points
    pub deviation_threshold_bps: u64,
    /// Lower bound on per-source fetch timeouts (milliseconds)
    pub min_fetch_timeout_ms: u64,
    /// Upper bound on per-source fetch timeouts (milliseconds)
    pub max_fetch_timeout_ms: u64,
    /// Event channel capacity
    pub event_capacity: usize,
    /// Directory for snapshot persistence; in-memory when unset
    pub data_dir: Option<PathBuf>,
    /// Sources registered at bootstrap
    pub sources: Vec<SourceSpec>,
    /// HTTP fetcher settings
    pub http: HttpFetcherConfig,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            admin: "admin".into(),
            managers: Vec::new(),
            deviation_threshold_bps: DEFAULT_DEVIATION_THRESHOLD_BPS,
            min_fetch_timeout_ms: DEFAULT_MIN_FETCH_TIMEOUT_MS,
            max_fetch_timeout_ms: DEFAULT_MAX_FETCH_TIMEOUT_MS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            data_dir: None,
            sources: Vec::new(),
            http: HttpFetcherConfig::default(),
        }
    }
}

impl OracleConfig {
    /// Load from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))
    }

    /// Apply `ORACLE_*` environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(admin) = std::env::var("ORACLE_ADMIN") {
            self.admin = admin;
        }

        if let Ok(dir) = std::env::var("ORACLE_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }

        if let Some(bps) = env_u64("ORACLE_DEVIATION_THRESHOLD_BPS") {
            self.deviation_threshold_bps = bps;
        }

        if let Some(ms) = env_u64("ORACLE_MIN_FETCH_TIMEOUT_MS") {
            self.min_fetch_timeout_ms = ms;
        }

        if let Some(ms) = env_u64("ORACLE_MAX_FETCH_TIMEOUT_MS") {
            self.max_fetch_timeout_ms = ms;
        }

        self
    }

    /// Insert `spec`, replacing any spec with the same id
    pub fn upsert_source(&mut self, spec: SourceSpec) {
        match self.sources.iter_mut().find(|s| s.id == spec.id) {
            Some(existing) => *existing = spec,
            None => self.sources.push(spec),
        }
    }

    /// Drop the spec for `id`, reporting whether one existed
    pub fn remove_source(&mut self, id: &str) -> bool {
        let before = self.sources.len();
        self.sources.retain(|s| s.id != id);
        self.sources.len() != before
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        default_data_dir().join("config.json")
    }

    /// Lower fetch timeout bound
    pub fn min_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.min_fetch_timeout_ms)
    }

    /// Upper fetch timeout bound
    pub fn max_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.max_fetch_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.admin.trim().is_empty() {
            return Err(ConfigError::Validation("admin principal cannot be empty".into()));
        }

        if self.min_fetch_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "min_fetch_timeout_ms must be greater than 0".into(),
            ));
        }

        if self.min_fetch_timeout_ms > self.max_fetch_timeout_ms {
            return Err(ConfigError::Validation(format!(
                "min_fetch_timeout_ms ({}) exceeds max_fetch_timeout_ms ({})",
                self.min_fetch_timeout_ms, self.max_fetch_timeout_ms
            )));
        }

        if self.event_capacity == 0 {
            return Err(ConfigError::Validation("event_capacity must be greater than 0".into()));
        }

        if self.sources.len() > MAX_SOURCES {
            return Err(ConfigError::Validation(format!(
                "{} sources configured, at most {} allowed",
                self.sources.len(),
                MAX_SOURCES
            )));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(ConfigError::Validation("source id cannot be empty".into()));
            }
            if !seen.insert(source.id.as_str()) {
                return Err(ConfigError::Validation(format!("duplicate source id: {}", source.id)));
            }
            validate_weight(source.weight)
                .map_err(|e| ConfigError::Validation(format!("source {}: {}", source.id, e)))?;
        }

        Ok(())
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIG ERROR
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration error
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(String),
    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),
    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<ConfigError> for crate::error::Error {
    fn from(e: ConfigError) -> Self {
        crate::error::Error::Config(e.to_string())
    }
}

/// Get default data directory
fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".price-oracle");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library/Application Support/price-oracle");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("price-oracle");
        }
    }

    PathBuf::from(".price-oracle")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn spec(id: &str, weight: u64) -> SourceSpec {
        SourceSpec {
            id: id.into(),
            weight,
            max_staleness_secs: 60,
            url: None,
            price: None,
            confidence_bps: None,
        }
    }

    #[test]
    fn test_config_default() {
        let config = OracleConfig::default();
        assert_eq!(config.deviation_threshold_bps, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = OracleConfig::default();
        config.admin = " ".into();
        assert!(config.validate().is_err());

        let mut config = OracleConfig::default();
        config.min_fetch_timeout_ms = 5_000;
        config.max_fetch_timeout_ms = 1_000;
        assert!(config.validate().is_err());

        let mut config = OracleConfig::default();
        config.sources = vec![spec("a", 100), spec("a", 200)];
        assert!(config.validate().is_err());

        let mut config = OracleConfig::default();
        config.sources = vec![spec("a", 0)];
        assert!(config.validate().is_err());

        let mut config = OracleConfig::default();
        config.sources = (0..11).map(|i| spec(&format!("s{}", i), 100)).collect();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_upsert_and_remove_source() {
        let mut config = OracleConfig::default();
        config.upsert_source(spec("a", 100));
        config.upsert_source(spec("b", 200));
        config.upsert_source(spec("a", 300));

        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].weight, 300);

        assert!(config.remove_source("a"));
        assert!(!config.remove_source("a"));
        assert_eq!(config.sources, vec![spec("b", 200)]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = OracleConfig::default();
        config.sources = vec![spec("chainlink", 6_000)];
        config.sources[0].price = Some(Decimal::from(3350));
        config.save(&path).unwrap();

        let loaded = OracleConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: OracleConfig = serde_json::from_str(r#"{"admin":"ops"}"#).unwrap();
        assert_eq!(config.admin, "ops");
        assert_eq!(config.max_fetch_timeout_ms, DEFAULT_MAX_FETCH_TIMEOUT_MS);
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let err = OracleConfig::load(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
