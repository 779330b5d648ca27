//! Fixed-point arithmetic for price aggregation.
//!
//! All price math runs on `rust_decimal::Decimal` with checked operations so
//! results are exact and reproducible across platforms. Floating point is
//! never used on a price path.

use num_traits::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{Error, Result};
use crate::utils::constants::{
    BPS_DIVISOR, MAX_SOURCE_WEIGHT_BPS, MIN_SOURCE_WEIGHT_BPS, PRICE_SCALE,
};

// ═══════════════════════════════════════════════════════════════════════════════
// WEIGHTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate a source weight in basis points
pub fn validate_weight(weight: u64) -> Result<()> {
    if !(MIN_SOURCE_WEIGHT_BPS..=MAX_SOURCE_WEIGHT_BPS).contains(&weight) {
        return Err(Error::InvalidWeight {
            weight,
            min: MIN_SOURCE_WEIGHT_BPS,
            max: MAX_SOURCE_WEIGHT_BPS,
        });
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE ROUNDING
// ═══════════════════════════════════════════════════════════════════════════════

/// Round a price to the published scale, midpoint away from zero
pub fn round_price(price: Decimal) -> Decimal {
    price
        .round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}

// ═══════════════════════════════════════════════════════════════════════════════
// WEIGHTED MEAN
// ═══════════════════════════════════════════════════════════════════════════════

/// Weighted arithmetic mean `Σ(price × weight) / Σ(weight)`.
///
/// Returns the rounded mean and the total weight that participated.
/// Fails if there are no entries or every weight is zero.
pub fn weighted_mean<I>(entries: I) -> Result<(Decimal, u64)>
where
    I: IntoIterator<Item = (Decimal, u64)>,
{
    let mut weighted_sum = Decimal::ZERO;
    let mut total_weight: u64 = 0;

    for (price, weight) in entries {
        let term = price
            .checked_mul(Decimal::from(weight))
            .ok_or_else(|| Error::Overflow {
                operation: format!("{} * {}", price, weight),
            })?;
        weighted_sum = weighted_sum.checked_add(term).ok_or_else(|| Error::Overflow {
            operation: "weighted sum".into(),
        })?;
        total_weight = total_weight.checked_add(weight).ok_or_else(|| Error::Overflow {
            operation: "total weight".into(),
        })?;
    }

    if total_weight == 0 {
        return Err(Error::InvalidParameter {
            name: "weights".into(),
            reason: "total weight is zero".into(),
        });
    }

    let mean = weighted_sum
        .checked_div(Decimal::from(total_weight))
        .ok_or_else(|| Error::Overflow {
            operation: "weighted mean division".into(),
        })?;

    Ok((round_price(mean), total_weight))
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEVIATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Relative distance `|candidate - baseline| / baseline` in basis points,
/// rounded to the nearest integer (midpoint away from zero).
pub fn deviation_bps(candidate: Decimal, baseline: Decimal) -> Result<u64> {
    if baseline <= Decimal::ZERO {
        return Err(Error::InvalidParameter {
            name: "baseline".into(),
            reason: format!("baseline price must be positive, got {}", baseline),
        });
    }
    if candidate.is_sign_negative() && !candidate.is_zero() {
        return Err(Error::InvalidParameter {
            name: "candidate".into(),
            reason: format!("candidate price must be non-negative, got {}", candidate),
        });
    }

    let diff = (candidate - baseline).abs();
    let scaled = diff
        .checked_mul(Decimal::from(BPS_DIVISOR))
        .and_then(|v| v.checked_div(baseline))
        .ok_or_else(|| Error::Overflow {
            operation: format!("deviation of {} from {}", candidate, baseline),
        })?;

    scaled
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
        .ok_or_else(|| Error::Overflow {
            operation: "deviation to u64".into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_validate_weight_bounds() {
        assert!(validate_weight(0).is_err());
        assert!(validate_weight(1).is_ok());
        assert!(validate_weight(10_000).is_ok());
        assert!(matches!(
            validate_weight(10_001),
            Err(Error::InvalidWeight { weight: 10_001, .. })
        ));
    }

    #[test]
    fn test_weighted_mean_exact() {
        let (mean, total) =
            weighted_mean(vec![(dec("3350"), 6_000), (dec("3355"), 4_000)]).unwrap();
        assert_eq!(mean, dec("3352"));
        assert_eq!(total, 10_000);
    }

    #[test]
    fn test_weighted_mean_rounds_to_scale() {
        let (mean, _) = weighted_mean(vec![(dec("1"), 1), (dec("2"), 2)]).unwrap();
        // 5/3 = 1.666...
        assert_eq!(mean, dec("1.66666667"));
    }

    #[test]
    fn test_weighted_mean_empty() {
        assert!(weighted_mean(Vec::new()).is_err());
    }

    #[test]
    fn test_deviation_bps() {
        assert_eq!(deviation_bps(dec("110"), dec("100")).unwrap(), 1_000);
        assert_eq!(deviation_bps(dec("98"), dec("100")).unwrap(), 200);
        assert_eq!(deviation_bps(dec("100"), dec("100")).unwrap(), 0);
        // 0.005% rounds up to 1bp
        assert_eq!(deviation_bps(dec("100.005"), dec("100")).unwrap(), 1);
    }

    #[test]
    fn test_deviation_rejects_bad_inputs() {
        assert!(deviation_bps(dec("1"), Decimal::ZERO).is_err());
        assert!(deviation_bps(dec("-1"), dec("100")).is_err());
    }
}
