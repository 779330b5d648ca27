//! Access control for oracle administration.
//!
//! Every mutating oracle call receives an [`AuthorizationContext`] naming the
//! caller. The gate checks that caller against the instance's [`AccessControl`]
//! role table before any state is touched:
//!
//! - `Admin` may grant and revoke roles, and implicitly holds `Manager`.
//! - `Manager` may mutate the source registry, trigger recomputation and
//!   change the deviation threshold.
//!
//! Read-only operations take no context.

pub mod roles;

pub use roles::*;
