//! Deviation monitor.
//!
//! Compares a candidate price with the last published aggregate and reports
//! whether the move exceeds the configured threshold. The report is advisory:
//! the aggregator publishes unconditionally and never consults it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::utils::constants::DEFAULT_DEVIATION_THRESHOLD_BPS;
use crate::utils::math::deviation_bps;

/// Threshold configuration for the deviation monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviationConfig {
    /// Largest accepted move in basis points
    pub threshold_bps: u64,
}

impl Default for DeviationConfig {
    fn default() -> Self {
        Self {
            threshold_bps: DEFAULT_DEVIATION_THRESHOLD_BPS,
        }
    }
}

/// Result of a deviation check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviationReport {
    /// Whether `deviation_bps` is strictly above the threshold
    pub exceeded: bool,
    /// Rounded relative move in basis points
    pub deviation_bps: u64,
    /// Price checked
    pub candidate: Decimal,
    /// Aggregate price used as the reference
    pub baseline: Decimal,
    /// Threshold in force
    pub threshold_bps: u64,
}

impl DeviationConfig {
    /// Create with a threshold
    pub fn new(threshold_bps: u64) -> Self {
        Self { threshold_bps }
    }

    /// Check `candidate` against `baseline`
    pub fn check(&self, candidate: Decimal, baseline: Decimal) -> Result<DeviationReport> {
        let deviation_bps = deviation_bps(candidate, baseline)?;
        Ok(DeviationReport {
            exceeded: deviation_bps > self.threshold_bps,
            deviation_bps,
            candidate,
            baseline,
            threshold_bps: self.threshold_bps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_large_move_exceeds() {
        let report = DeviationConfig::default().check(dec("3687.2"), dec("3352")).unwrap();
        assert!(report.exceeded);
        assert_eq!(report.deviation_bps, 1_000);
    }

    #[test]
    fn test_small_move_within_threshold() {
        let report = DeviationConfig::default().check(dec("3419.04"), dec("3352")).unwrap();
        assert!(!report.exceeded);
        assert_eq!(report.deviation_bps, 200);
    }

    #[test]
    fn test_threshold_is_strict() {
        let config = DeviationConfig::new(200);
        assert!(!config.check(dec("102"), dec("100")).unwrap().exceeded);
        assert!(config.check(dec("102.02"), dec("100")).unwrap().exceeded);
    }

    #[test]
    fn test_downward_moves_count() {
        let report = DeviationConfig::new(500).check(dec("90"), dec("100")).unwrap();
        assert!(report.exceeded);
        assert_eq!(report.deviation_bps, 1_000);
    }

    #[test]
    fn test_zero_baseline_rejected() {
        assert!(DeviationConfig::default().check(dec("1"), Decimal::ZERO).is_err());
    }
}
