//! Utility modules for the price oracle.
//!
//! This module contains shared utilities used across the crate:
//! - Policy constants
//! - Fixed-point arithmetic
//! - Content fingerprints
//! - Injectable clocks

pub mod constants;
pub mod fingerprint;
pub mod math;
pub mod time;

pub use constants::*;
pub use fingerprint::*;
pub use math::*;
pub use time::*;
