//! Risk assessment result produced by the risk stage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RiskThresholds;

/// Risk tier derived deterministically from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    /// Derive the tier from a score in [0, 1] using configured thresholds.
    pub fn from_score(score: f64, thresholds: &RiskThresholds) -> Self {
        if score < thresholds.low_below {
            Self::Low
        } else if score < thresholds.medium_below {
            Self::Medium
        } else if score < thresholds.high_below {
            Self::High
        } else {
            Self::Critical
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Immutable assessment attached to a claim after the risk stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Fraud/risk score, bounded to [0.0, 1.0].
    pub score: f64,
    /// Tier derived from `score` via [`RiskTier::from_score`].
    pub tier: RiskTier,
    /// Ordered contributing factors, most significant first.
    pub factors: Vec<String>,
    /// Provider confidence in the assessment, [0.0, 1.0].
    pub confidence: f64,
    pub assessed_at: DateTime<Utc>,
}
