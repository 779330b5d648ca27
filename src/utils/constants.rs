//! Oracle constants and policy bounds.
//!
//! All oracle-wide constants are defined here for easy auditing and modification.

// ═══════════════════════════════════════════════════════════════════════════════
// BASIS POINTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Basis points divisor (10000 = 100%)
pub const BPS_DIVISOR: u64 = 10_000;

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRY POLICY
// ═══════════════════════════════════════════════════════════════════════════════

/// Maximum number of registered sources, active or not
pub const MAX_SOURCES: usize = 10;

/// Minimum number of active sources the registry must keep
pub const MIN_ACTIVE_SOURCES: usize = 2;

/// Smallest accepted source weight (basis points)
pub const MIN_SOURCE_WEIGHT_BPS: u64 = 1;

/// Largest accepted source weight (basis points)
pub const MAX_SOURCE_WEIGHT_BPS: u64 = BPS_DIVISOR;

/// Largest accepted sample confidence (basis points)
pub const MAX_CONFIDENCE_BPS: u16 = 10_000;

// ═══════════════════════════════════════════════════════════════════════════════
// AGGREGATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Decimal places kept on published aggregate prices
pub const PRICE_SCALE: u32 = 8;

/// Default deviation threshold - 5%
pub const DEFAULT_DEVIATION_THRESHOLD_BPS: u64 = 500;

/// Lower bound on a per-source fetch timeout (milliseconds)
pub const DEFAULT_MIN_FETCH_TIMEOUT_MS: u64 = 100;

/// Upper bound on a per-source fetch timeout (milliseconds)
pub const DEFAULT_MAX_FETCH_TIMEOUT_MS: u64 = 10_000;

// ═══════════════════════════════════════════════════════════════════════════════
// EVENTS & STORAGE
// ═══════════════════════════════════════════════════════════════════════════════

/// Default capacity of the event broadcast channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Storage key of the persisted oracle snapshot
pub const SNAPSHOT_KEY: &str = "oracle/snapshot";

/// Length of a content fingerprint in bytes (SHA256)
pub const FINGERPRINT_LENGTH: usize = 32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_bounds() {
        assert!(MIN_ACTIVE_SOURCES <= MAX_SOURCES);
        assert!(MIN_SOURCE_WEIGHT_BPS > 0);
        assert_eq!(MAX_SOURCE_WEIGHT_BPS, BPS_DIVISOR);
    }

    #[test]
    fn test_timeout_bounds() {
        assert!(DEFAULT_MIN_FETCH_TIMEOUT_MS < DEFAULT_MAX_FETCH_TIMEOUT_MS);
        assert!(DEFAULT_DEVIATION_THRESHOLD_BPS < BPS_DIVISOR);
    }
}
