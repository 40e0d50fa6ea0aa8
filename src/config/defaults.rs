//! System-wide default constants.
//!
//! Centralises the pipeline's tunable values so nothing is hardcoded at the
//! call sites. Grouped by subsystem.

// ============================================================================
// Resilient call executor
// ============================================================================

/// Default attempt budget per stage call (first try + retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Hard cap on the attempt budget, regardless of configuration.
pub const MAX_ATTEMPTS_CAP: u32 = 4;

/// Base backoff delay between attempts (ms). Doubles each retry.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 200;

/// Maximum backoff delay between attempts (ms).
pub const DEFAULT_BACKOFF_CAP_MS: u64 = 2_000;

// ============================================================================
// Provider
// ============================================================================

/// Default sampling temperature for extraction/validation calls.
///
/// Kept low for consistent structured output.
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Default per-call provider timeout (seconds).
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Risk tiers and routing
// ============================================================================

/// Scores below this are `low` risk.
pub const RISK_LOW_BELOW: f64 = 0.3;

/// Scores below this (and >= low) are `medium` risk.
pub const RISK_MEDIUM_BELOW: f64 = 0.6;

/// Scores below this (and >= medium) are `high` risk; at or above is `critical`.
pub const RISK_HIGH_BELOW: f64 = 0.8;

/// Scores at or above this force manual review regardless of the provider's
/// routing suggestion.
pub const FORCED_REVIEW_SCORE: f64 = 0.8;
