//! Claim aggregate and status state machine
//!
//! A `Claim` advances through a fixed stage sequence:
//!
//! ```text
//! Created → FactsExtracted → PolicyChecked → RiskAssessed → Routed
//!                                                         ↘ Rejected
//! ```
//!
//! Status only moves forward. Transitions are applied exclusively through
//! [`Claim::apply_event`], which asserts the claim is in the expected
//! predecessor state; a violation is an internal-consistency defect, not a
//! retryable condition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ClaimEvent, ClaimFacts, RiskAssessment, RoutingDestination};

/// Unique claim identifier (UUID v4 newtype).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimId(pub Uuid);

impl ClaimId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClaimId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClaimId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Claim processing status.
///
/// Ordering of the variants matches the pipeline sequence; `Rejected` is a
/// terminal branch reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimStatus {
    Created,
    FactsExtracted,
    PolicyChecked,
    RiskAssessed,
    Routed,
    Rejected,
}

impl ClaimStatus {
    /// Whether no further stage may run against this claim.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Routed | Self::Rejected)
    }
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::FactsExtracted => "facts_extracted",
            Self::PolicyChecked => "policy_checked",
            Self::RiskAssessed => "risk_assessed",
            Self::Routed => "routed",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Reason codes for terminal rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// No active policy matched the claimant.
    PolicyNotFound,
    /// A policy exists but is lapsed, cancelled, or outside its validity window.
    PolicyInactive,
    /// Claimed amount exceeds the policy coverage limit.
    CoverageExceeded,
    /// The policy does not cover this category of claim.
    CoverageNotApplicable,
    /// The pipeline could not complete processing (provider exhaustion).
    ProcessingUnavailable,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PolicyNotFound => "policy_not_found",
            Self::PolicyInactive => "policy_inactive",
            Self::CoverageExceeded => "coverage_exceeded",
            Self::CoverageNotApplicable => "coverage_not_applicable",
            Self::ProcessingUnavailable => "processing_unavailable",
        };
        f.write_str(s)
    }
}

/// Errors raised when an event is applied to a claim in the wrong state.
#[derive(thiserror::Error, Debug)]
pub enum StateError {
    /// The claim is not in the predecessor state the event requires.
    ///
    /// This is a programming error in the orchestration logic, never a
    /// condition to retry.
    #[error("claim {claim_id} is {actual} but event {event} requires {expected}")]
    UnexpectedState {
        claim_id: ClaimId,
        event: &'static str,
        expected: ClaimStatus,
        actual: ClaimStatus,
    },

    /// An event for one claim was applied to another.
    #[error("event for claim {event_claim_id} applied to claim {claim_id}")]
    ClaimMismatch {
        claim_id: ClaimId,
        event_claim_id: ClaimId,
    },

    /// The claim already reached a terminal state.
    #[error("claim {claim_id} is terminal ({status}), no further events accepted")]
    AlreadyTerminal {
        claim_id: ClaimId,
        status: ClaimStatus,
    },
}

/// The claim work item: aggregate root owned by the orchestrator.
///
/// Stages receive a read view of the claim; only `apply_event` mutates it.
/// The `events` list is append-only and forms the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    /// Raw unstructured claim text as submitted.
    pub raw_input: String,
    pub status: ClaimStatus,
    /// Structured summary, present after the extraction stage.
    pub facts: Option<ClaimFacts>,
    /// Policy confirmed by the policy stage.
    pub policy_id: Option<String>,
    /// Risk assessment, present after the risk stage.
    pub assessment: Option<RiskAssessment>,
    /// Routing destination, present once terminal `Routed`.
    pub destination: Option<RoutingDestination>,
    /// Rejection reason, present once terminal `Rejected`.
    pub rejection_reason: Option<RejectionReason>,
    /// Append-only audit trail of every event this claim emitted.
    pub events: Vec<ClaimEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Claim {
    /// Create a new claim in `Created` from raw submission text.
    pub fn new(raw_input: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ClaimId::new(),
            raw_input: raw_input.into(),
            status: ClaimStatus::Created,
            facts: None,
            policy_id: None,
            assessment: None,
            destination: None,
            rejection_reason: None,
            events: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a domain event, advancing the status state machine.
    ///
    /// Asserts the claim is in the event's required predecessor state and
    /// that the event belongs to this claim. On success the stage output is
    /// attached (replacing, never editing, any prior value), the status
    /// advances, and the event is appended to the audit trail.
    pub fn apply_event(&mut self, event: ClaimEvent) -> Result<(), StateError> {
        if event.claim_id() != self.id {
            return Err(StateError::ClaimMismatch {
                claim_id: self.id,
                event_claim_id: event.claim_id(),
            });
        }
        if self.status.is_terminal() {
            return Err(StateError::AlreadyTerminal {
                claim_id: self.id,
                status: self.status,
            });
        }

        let expected = match &event {
            ClaimEvent::FactsExtracted { .. } => ClaimStatus::Created,
            ClaimEvent::PolicyValidated { .. } => ClaimStatus::FactsExtracted,
            ClaimEvent::RiskAssessed { .. } => ClaimStatus::PolicyChecked,
            ClaimEvent::Routed { .. } => ClaimStatus::RiskAssessed,
            // Rejection is legal from any non-terminal state.
            ClaimEvent::Rejected { .. } => self.status,
        };
        if self.status != expected {
            return Err(StateError::UnexpectedState {
                claim_id: self.id,
                event: event.kind().as_str(),
                expected,
                actual: self.status,
            });
        }

        match &event {
            ClaimEvent::FactsExtracted { facts, .. } => {
                self.facts = Some(facts.clone());
                self.status = ClaimStatus::FactsExtracted;
            }
            ClaimEvent::PolicyValidated { policy_id, .. } => {
                self.policy_id = Some(policy_id.clone());
                self.status = ClaimStatus::PolicyChecked;
            }
            ClaimEvent::RiskAssessed { assessment, .. } => {
                self.assessment = Some(assessment.clone());
                self.status = ClaimStatus::RiskAssessed;
            }
            ClaimEvent::Routed { destination, .. } => {
                self.destination = Some(*destination);
                self.status = ClaimStatus::Routed;
            }
            ClaimEvent::Rejected { reason, .. } => {
                self.rejection_reason = Some(*reason);
                self.status = ClaimStatus::Rejected;
            }
        }

        self.updated_at = event.timestamp();
        self.events.push(event);
        Ok(())
    }
}
