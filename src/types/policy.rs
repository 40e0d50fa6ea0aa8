//! Policy reference records
//!
//! Read-only lookup entities consulted by the policy validation stage.
//! This core never creates or mutates policies; they arrive through the
//! [`PolicyLookup`](crate::ports::PolicyLookup) port.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Administrative status of a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyStatus {
    Active,
    Lapsed,
    Cancelled,
}

/// External policy record (lookup-only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub policy_id: String,
    /// Customer key the policy belongs to; matched against the claimant id.
    pub customer_id: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    /// Maximum covered amount per claim.
    pub coverage_limit: f64,
    pub status: PolicyStatus,
}

impl PolicyRecord {
    /// Whether the policy is active and in its validity window at `at`.
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.status == PolicyStatus::Active && self.valid_from <= at && at <= self.valid_until
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(status: PolicyStatus) -> PolicyRecord {
        let now = Utc::now();
        PolicyRecord {
            policy_id: "POL-7".to_string(),
            customer_id: "CUST-7".to_string(),
            valid_from: now - Duration::days(30),
            valid_until: now + Duration::days(335),
            coverage_limit: 50_000.0,
            status,
        }
    }

    #[test]
    fn active_inside_window() {
        assert!(record(PolicyStatus::Active).is_active_at(Utc::now()));
    }

    #[test]
    fn inactive_when_cancelled_or_outside_window() {
        assert!(!record(PolicyStatus::Cancelled).is_active_at(Utc::now()));
        let expired = record(PolicyStatus::Active);
        assert!(!expired.is_active_at(Utc::now() + Duration::days(400)));
    }
}
