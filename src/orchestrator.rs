//! Orchestrator: claim lifecycle and state machine
//!
//! Owns each claim end to end: creates it, runs the stage sequence, and
//! applies every transition. A claim flows strictly sequentially through
//! its stages; concurrency comes from running independent claims on
//! separate tasks sharing one bus instance.
//!
//! Every stage event is published to the bus first, then applied through
//! the transition handler, which asserts the claim is in the expected
//! predecessor state. A violated assertion is a fatal orchestration defect
//! and aborts processing of that claim with full diagnostic context.
//!
//! Stage failures that exhaust the retry budget do not abort the caller:
//! the claim terminates as `Rejected(ProcessingUnavailable)` and is handed
//! to the review queue exactly once, so the caller always receives a
//! terminal outcome rather than an unresolved hang.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bus::EventBus;
use crate::config::PipelineConfig;
use crate::executor::ResilientExecutor;
use crate::ports::{ClaimStore, PolicyLookup, ReviewPriority, ReviewQueue, ReviewReason};
use crate::provider::TextProvider;
use crate::stages::{
    ClaimStage, ExtractionStage, PolicyCheckStage, RiskStage, RoutingStage, StageContext,
    StageError,
};
use crate::types::{
    Claim, ClaimEvent, ClaimId, ClaimStatus, RejectionReason, RoutingDestination, StateError,
};

/// Terminal disposition reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Routed(RoutingDestination),
    Rejected(RejectionReason),
    /// Processing failed; the claim was escalated for manual review.
    Escalated(RejectionReason),
}

/// Result of processing one claim to a terminal state.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub claim: Claim,
    pub disposition: Disposition,
}

/// Fatal orchestration errors. Everything recoverable is handled
/// internally and surfaces as an `Escalated` disposition instead.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// A transition handler found the claim in the wrong predecessor state.
    #[error("internal consistency violation: {0}")]
    State(#[from] StateError),

    /// Processing was cancelled by the caller.
    #[error("processing cancelled for claim {0}")]
    Cancelled(ClaimId),

    /// A stage was invoked without its declared inputs: a programming
    /// error in the stage sequencing, never retried.
    #[error("orchestration defect: {0}")]
    Defect(String),
}

/// Lifetime counters across all claims this orchestrator has processed.
#[derive(Debug, Default)]
pub struct OrchestratorStats {
    pub submitted: AtomicU64,
    pub routed: AtomicU64,
    pub rejected: AtomicU64,
    pub escalated: AtomicU64,
}

/// Drives claims through the fixed stage sequence.
pub struct Orchestrator {
    bus: Arc<EventBus>,
    executor: Arc<ResilientExecutor>,
    policies: Arc<dyn PolicyLookup>,
    store: Arc<dyn ClaimStore>,
    review_queue: Arc<dyn ReviewQueue>,
    config: Arc<PipelineConfig>,
    extraction: ExtractionStage,
    policy_check: PolicyCheckStage,
    risk: RiskStage,
    routing: RoutingStage,
    stats: OrchestratorStats,
}

impl Orchestrator {
    pub fn new(
        bus: Arc<EventBus>,
        provider: Arc<dyn TextProvider>,
        policies: Arc<dyn PolicyLookup>,
        store: Arc<dyn ClaimStore>,
        review_queue: Arc<dyn ReviewQueue>,
        config: Arc<PipelineConfig>,
    ) -> Self {
        let executor = Arc::new(ResilientExecutor::new(provider, &config));
        Self {
            bus,
            executor,
            policies,
            store,
            review_queue,
            config,
            extraction: ExtractionStage,
            policy_check: PolicyCheckStage,
            risk: RiskStage,
            routing: RoutingStage,
            stats: OrchestratorStats::default(),
        }
    }

    pub fn stats(&self) -> &OrchestratorStats {
        &self.stats
    }

    /// The stage owed to a claim in `status`, or `None` once terminal.
    fn next_stage(&self, status: ClaimStatus) -> Option<&dyn ClaimStage> {
        match status {
            ClaimStatus::Created => Some(&self.extraction),
            ClaimStatus::FactsExtracted => Some(&self.policy_check),
            ClaimStatus::PolicyChecked => Some(&self.risk),
            ClaimStatus::RiskAssessed => Some(&self.routing),
            ClaimStatus::Routed | ClaimStatus::Rejected => None,
        }
    }

    /// Submit raw claim text and process it to a terminal state.
    pub async fn submit(
        &self,
        raw_input: &str,
        cancel: CancellationToken,
    ) -> Result<PipelineOutcome, OrchestratorError> {
        let claim = Claim::new(raw_input);
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        info!(claim_id = %claim.id, chars = raw_input.len(), "Claim submitted");
        self.persist(&claim).await;
        self.process(claim, cancel).await
    }

    async fn process(
        &self,
        mut claim: Claim,
        cancel: CancellationToken,
    ) -> Result<PipelineOutcome, OrchestratorError> {
        let ctx = StageContext {
            executor: Arc::clone(&self.executor),
            policies: Arc::clone(&self.policies),
            config: Arc::clone(&self.config),
            cancel: cancel.clone(),
        };

        while let Some(stage) = self.next_stage(claim.status) {
            if cancel.is_cancelled() {
                // Nothing from the in-flight stage has been committed.
                warn!(claim_id = %claim.id, status = %claim.status, "Processing cancelled");
                return Err(OrchestratorError::Cancelled(claim.id));
            }

            match stage.run(&claim, &ctx).await {
                Ok(event) => self.publish_and_apply(&mut claim, event).await?,
                Err(err) if err.is_cancelled() => {
                    return Err(OrchestratorError::Cancelled(claim.id));
                }
                Err(StageError::MissingInput { stage, what }) => {
                    return Err(OrchestratorError::Defect(format!(
                        "stage {stage} invoked without {what} (claim {})",
                        claim.id
                    )));
                }
                Err(err) => {
                    warn!(
                        claim_id = %claim.id,
                        stage = stage.name(),
                        error = %err,
                        "Stage failed, escalating for manual review"
                    );
                    return self.escalate(claim, err).await;
                }
            }
        }

        self.finalize(claim).await
    }

    /// Publish the stage's event, then apply the transition it triggers.
    async fn publish_and_apply(
        &self,
        claim: &mut Claim,
        event: ClaimEvent,
    ) -> Result<(), OrchestratorError> {
        self.bus.publish(&event);

        if let Err(state_err) = claim.apply_event(event) {
            // Full diagnostic context, then abort this claim.
            error!(
                claim_id = %claim.id,
                status = %claim.status,
                error = %state_err,
                "State machine violation, aborting claim"
            );
            return Err(OrchestratorError::State(state_err));
        }

        self.persist(claim).await;
        Ok(())
    }

    /// Terminal bookkeeping once the state machine stops yielding stages.
    async fn finalize(&self, claim: Claim) -> Result<PipelineOutcome, OrchestratorError> {
        let disposition = match (claim.status, claim.destination, claim.rejection_reason) {
            (ClaimStatus::Routed, Some(destination), _) => {
                if destination.requires_review() {
                    let priority = if destination == RoutingDestination::InvestigationQueue {
                        ReviewPriority::Urgent
                    } else {
                        ReviewPriority::Routine
                    };
                    self.enqueue_review(&claim, ReviewReason::RoutedForReview, priority)
                        .await;
                }
                self.stats.routed.fetch_add(1, Ordering::Relaxed);
                Disposition::Routed(destination)
            }
            (ClaimStatus::Rejected, _, Some(reason)) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                Disposition::Rejected(reason)
            }
            (status, _, _) => {
                return Err(OrchestratorError::Defect(format!(
                    "claim {} finalized in non-terminal state {status}",
                    claim.id
                )));
            }
        };

        info!(claim_id = %claim.id, ?disposition, events = claim.events.len(), "Claim terminal");
        Ok(PipelineOutcome { claim, disposition })
    }

    /// Stage failure fallback: terminate as rejected and hand off for
    /// manual adjudication (exactly once).
    async fn escalate(
        &self,
        mut claim: Claim,
        err: StageError,
    ) -> Result<PipelineOutcome, OrchestratorError> {
        let reason = RejectionReason::ProcessingUnavailable;
        let event = ClaimEvent::rejected(claim.id, reason);
        self.publish_and_apply(&mut claim, event).await?;

        self.enqueue_review(
            &claim,
            ReviewReason::ProcessingFailed(reason),
            ReviewPriority::Urgent,
        )
        .await;

        self.stats.escalated.fetch_add(1, Ordering::Relaxed);
        info!(claim_id = %claim.id, error = %err, "Claim escalated after stage failure");
        Ok(PipelineOutcome {
            claim,
            disposition: Disposition::Escalated(reason),
        })
    }

    /// Fire-and-forget persistence: a failed save is logged, never fatal.
    async fn persist(&self, claim: &Claim) {
        if let Err(e) = self.store.save(claim).await {
            warn!(claim_id = %claim.id, error = %e, "Claim save failed, continuing in-memory");
        }
    }

    async fn enqueue_review(&self, claim: &Claim, reason: ReviewReason, priority: ReviewPriority) {
        if let Err(e) = self.review_queue.enqueue(claim, reason, priority).await {
            error!(claim_id = %claim.id, error = %e, "Review queue enqueue failed");
        }
    }
}
