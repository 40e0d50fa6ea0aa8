//! Structured claim facts produced by the extraction stage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Claim category label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimCategory {
    Auto,
    Home,
    Health,
    Liability,
    Other,
}

impl ClaimCategory {
    /// Known labels in schema declaration order.
    pub const LABELS: [&'static str; 5] = ["auto", "home", "health", "liability", "other"];

    /// Case-insensitive label match; unknown labels map to `Other`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "auto" => Self::Auto,
            "home" => Self::Home,
            "health" => Self::Health,
            "liability" => Self::Liability,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for ClaimCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Auto => "auto",
            Self::Home => "home",
            Self::Health => "health",
            Self::Liability => "liability",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// Immutable structured summary of a claim, attached after extraction.
///
/// Never edited in place: a correction produces a new value that replaces
/// the old reference on the claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimFacts {
    pub category: ClaimCategory,
    /// Claimed amount, non-negative (schema-enforced).
    pub amount: f64,
    /// When the incident occurred; must not be in the future at processing time.
    pub incident_date: DateTime<Utc>,
    pub description: String,
    pub location: String,
    pub claimant_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_labels_match_case_insensitively() {
        assert_eq!(ClaimCategory::from_label("AUTO"), ClaimCategory::Auto);
        assert_eq!(ClaimCategory::from_label(" Home "), ClaimCategory::Home);
        assert_eq!(ClaimCategory::from_label("bicycle"), ClaimCategory::Other);
    }
}
