//! Security primitives for the Swarmgate hub.
//!
//! # Main types
//!
//! - [`RateGovernor`] / [`RateWindow`] — Fixed-window per-connection rate limiting.
//! - [`Sanitizer`] — Content validation and sanitization.
//! - [`TokenVerifier`] — Constant-time shared-secret verification.

/// Fixed-window rate limiting.
pub mod rate;
/// Content validation and sanitization.
pub mod sanitizer;
/// Shared-token verification.
pub mod token;

pub use rate::{RateDecision, RateGovernor, RateWindow};
pub use sanitizer::{ContentGuard, Sanitizer, Validation};
pub use token::TokenVerifier;
