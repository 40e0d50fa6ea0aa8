//! Claim domain events
//!
//! Every stage completion emits exactly one `ClaimEvent`. Events are
//! immutable once published, carry their own timestamp, and serialize as
//! tagged records (`{type, claim_id, timestamp, ...payload}`) so external
//! audit consumers can log them without knowing the payload shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ClaimFacts, ClaimId, RejectionReason, RiskAssessment};

/// Discriminant for bus subscription, one per event variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimEventKind {
    FactsExtracted,
    PolicyValidated,
    RiskAssessed,
    Routed,
    Rejected,
}

impl ClaimEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FactsExtracted => "facts_extracted",
            Self::PolicyValidated => "policy_validated",
            Self::RiskAssessed => "risk_assessed",
            Self::Routed => "routed",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ClaimEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a routed claim is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingDestination {
    /// Straight-through processing, no human touch.
    AutomatedProcessing,
    /// Manual adjudication queue.
    ManualReviewQueue,
    /// Special investigation (suspected fraud).
    InvestigationQueue,
}

impl RoutingDestination {
    /// Known labels in schema declaration order.
    pub const LABELS: [&'static str; 3] = [
        "automated-processing",
        "manual-review-queue",
        "investigation-queue",
    ];

    /// Case-insensitive label match.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().replace('_', "-").as_str() {
            "automated-processing" => Some(Self::AutomatedProcessing),
            "manual-review-queue" => Some(Self::ManualReviewQueue),
            "investigation-queue" => Some(Self::InvestigationQueue),
            _ => None,
        }
    }

    /// Whether this destination requires a human decision.
    pub fn requires_review(self) -> bool {
        matches!(self, Self::ManualReviewQueue | Self::InvestigationQueue)
    }
}

impl std::fmt::Display for RoutingDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AutomatedProcessing => "automated-processing",
            Self::ManualReviewQueue => "manual-review-queue",
            Self::InvestigationQueue => "investigation-queue",
        };
        f.write_str(s)
    }
}

/// Immutable, timestamped domain event marking a stage completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaimEvent {
    FactsExtracted {
        claim_id: ClaimId,
        facts: ClaimFacts,
        timestamp: DateTime<Utc>,
    },
    PolicyValidated {
        claim_id: ClaimId,
        policy_id: String,
        coverage_confirmed: bool,
        timestamp: DateTime<Utc>,
    },
    RiskAssessed {
        claim_id: ClaimId,
        assessment: RiskAssessment,
        timestamp: DateTime<Utc>,
    },
    Routed {
        claim_id: ClaimId,
        destination: RoutingDestination,
        timestamp: DateTime<Utc>,
    },
    Rejected {
        claim_id: ClaimId,
        reason: RejectionReason,
        timestamp: DateTime<Utc>,
    },
}

impl ClaimEvent {
    pub fn facts_extracted(claim_id: ClaimId, facts: ClaimFacts) -> Self {
        Self::FactsExtracted {
            claim_id,
            facts,
            timestamp: Utc::now(),
        }
    }

    pub fn policy_validated(
        claim_id: ClaimId,
        policy_id: String,
        coverage_confirmed: bool,
    ) -> Self {
        Self::PolicyValidated {
            claim_id,
            policy_id,
            coverage_confirmed,
            timestamp: Utc::now(),
        }
    }

    pub fn risk_assessed(claim_id: ClaimId, assessment: RiskAssessment) -> Self {
        Self::RiskAssessed {
            claim_id,
            assessment,
            timestamp: Utc::now(),
        }
    }

    pub fn routed(claim_id: ClaimId, destination: RoutingDestination) -> Self {
        Self::Routed {
            claim_id,
            destination,
            timestamp: Utc::now(),
        }
    }

    pub fn rejected(claim_id: ClaimId, reason: RejectionReason) -> Self {
        Self::Rejected {
            claim_id,
            reason,
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> ClaimEventKind {
        match self {
            Self::FactsExtracted { .. } => ClaimEventKind::FactsExtracted,
            Self::PolicyValidated { .. } => ClaimEventKind::PolicyValidated,
            Self::RiskAssessed { .. } => ClaimEventKind::RiskAssessed,
            Self::Routed { .. } => ClaimEventKind::Routed,
            Self::Rejected { .. } => ClaimEventKind::Rejected,
        }
    }

    pub fn claim_id(&self) -> ClaimId {
        match self {
            Self::FactsExtracted { claim_id, .. }
            | Self::PolicyValidated { claim_id, .. }
            | Self::RiskAssessed { claim_id, .. }
            | Self::Routed { claim_id, .. }
            | Self::Rejected { claim_id, .. } => *claim_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::FactsExtracted { timestamp, .. }
            | Self::PolicyValidated { timestamp, .. }
            | Self::RiskAssessed { timestamp, .. }
            | Self::Routed { timestamp, .. }
            | Self::Rejected { timestamp, .. } => *timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let id = ClaimId::new();
        let event = ClaimEvent::rejected(id, RejectionReason::PolicyNotFound);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "rejected");
        assert_eq!(json["reason"], "policy_not_found");
        assert!(json["timestamp"].is_string());
        assert_eq!(json["claim_id"], serde_json::to_value(id).unwrap());
    }

    #[test]
    fn destination_labels_round_trip() {
        for label in RoutingDestination::LABELS {
            let dest = RoutingDestination::from_label(label).unwrap();
            assert_eq!(dest.to_string(), label);
        }
        assert_eq!(
            RoutingDestination::from_label("Manual_Review_Queue"),
            Some(RoutingDestination::ManualReviewQueue)
        );
        assert_eq!(RoutingDestination::from_label("nowhere"), None);
    }
}
