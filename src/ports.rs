//! External collaborator ports
//!
//! The pipeline core treats policy lookup, claim persistence, and review
//! escalation as swappable trait seams. The in-memory implementations here
//! back the demo binary and the test suites; production deployments plug in
//! their own.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info};

use crate::types::{Claim, ClaimId, PolicyRecord, RejectionReason};

/// Errors from an external collaborator.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

/// Escalation priority for manually adjudicated claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReviewPriority {
    Routine,
    Urgent,
}

/// Why a claim was handed to the review queue.
#[derive(Debug, Clone)]
pub enum ReviewReason {
    /// Routed to a destination requiring human judgment.
    RoutedForReview,
    /// The pipeline could not complete processing.
    ProcessingFailed(RejectionReason),
}

// ============================================================================
// Ports
// ============================================================================

/// Read-only policy lookup.
#[async_trait]
pub trait PolicyLookup: Send + Sync {
    /// Find an active policy by its identifier.
    async fn find_active(&self, policy_id: &str) -> Result<Option<PolicyRecord>, PortError>;

    /// All policies held by a customer, any status.
    async fn find_by_customer(&self, customer_id: &str) -> Result<Vec<PolicyRecord>, PortError>;
}

/// Claim persistence. The orchestrator saves fire-and-forget after each
/// transition; in-memory processing never depends on a save succeeding.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    async fn save(&self, claim: &Claim) -> Result<(), PortError>;
    async fn find_by_id(&self, id: ClaimId) -> Result<Option<Claim>, PortError>;
}

/// Sink for claims that need manual adjudication. Called exactly once per
/// claim that terminates in a state requiring human judgment.
#[async_trait]
pub trait ReviewQueue: Send + Sync {
    async fn enqueue(
        &self,
        claim: &Claim,
        reason: ReviewReason,
        priority: ReviewPriority,
    ) -> Result<(), PortError>;
}

// ============================================================================
// In-memory implementations
// ============================================================================

/// In-memory policy store seeded at startup.
#[derive(Default)]
pub struct InMemoryPolicyStore {
    policies: RwLock<Vec<PolicyRecord>>,
}

impl InMemoryPolicyStore {
    pub fn new(policies: Vec<PolicyRecord>) -> Self {
        Self {
            policies: RwLock::new(policies),
        }
    }
}

#[async_trait]
impl PolicyLookup for InMemoryPolicyStore {
    async fn find_active(&self, policy_id: &str) -> Result<Option<PolicyRecord>, PortError> {
        let policies = self
            .policies
            .read()
            .map_err(|_| PortError::Unavailable("policy store lock poisoned".to_string()))?;
        Ok(policies
            .iter()
            .find(|p| p.policy_id == policy_id && p.is_active_at(chrono::Utc::now()))
            .cloned())
    }

    async fn find_by_customer(&self, customer_id: &str) -> Result<Vec<PolicyRecord>, PortError> {
        let policies = self
            .policies
            .read()
            .map_err(|_| PortError::Unavailable("policy store lock poisoned".to_string()))?;
        Ok(policies
            .iter()
            .filter(|p| p.customer_id == customer_id)
            .cloned()
            .collect())
    }
}

/// In-memory claim store keyed by claim id.
#[derive(Default)]
pub struct InMemoryClaimStore {
    claims: RwLock<HashMap<ClaimId, Claim>>,
}

impl InMemoryClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.claims.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ClaimStore for InMemoryClaimStore {
    async fn save(&self, claim: &Claim) -> Result<(), PortError> {
        let mut claims = self
            .claims
            .write()
            .map_err(|_| PortError::Unavailable("claim store lock poisoned".to_string()))?;
        claims.insert(claim.id, claim.clone());
        debug!(claim_id = %claim.id, status = %claim.status, "Claim saved");
        Ok(())
    }

    async fn find_by_id(&self, id: ClaimId) -> Result<Option<Claim>, PortError> {
        let claims = self
            .claims
            .read()
            .map_err(|_| PortError::Unavailable("claim store lock poisoned".to_string()))?;
        Ok(claims.get(&id).cloned())
    }
}

/// One review queue entry.
#[derive(Debug, Clone)]
pub struct ReviewEntry {
    pub claim_id: ClaimId,
    pub reason: ReviewReason,
    pub priority: ReviewPriority,
}

/// In-memory review queue; tests assert on its contents.
#[derive(Default)]
pub struct InMemoryReviewQueue {
    entries: RwLock<Vec<ReviewEntry>>,
}

impl InMemoryReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ReviewEntry> {
        self.entries.read().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ReviewQueue for InMemoryReviewQueue {
    async fn enqueue(
        &self,
        claim: &Claim,
        reason: ReviewReason,
        priority: ReviewPriority,
    ) -> Result<(), PortError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| PortError::Unavailable("review queue lock poisoned".to_string()))?;
        info!(claim_id = %claim.id, ?priority, "Claim escalated for manual review");
        entries.push(ReviewEntry {
            claim_id: claim.id,
            reason,
            priority,
        });
        Ok(())
    }
}
