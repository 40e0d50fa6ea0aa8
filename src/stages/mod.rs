//! Pipeline stages
//!
//! Each stage consumes a read view of the claim plus the prior outputs
//! already attached to it, drives one resilient provider call, applies its
//! own deterministic post-processing, and returns exactly one domain event.
//! Stages never mutate the claim; the orchestrator alone applies
//! transitions.
//!
//! A domain-level rejection (no matching policy, coverage exceeded) is a
//! *successful* stage outcome carrying a `Rejected` event, not an error;
//! `StageError` is reserved for faults the orchestrator must decide a
//! fallback for.

mod extraction;
mod policy_check;
mod risk;
mod routing;

pub use extraction::ExtractionStage;
pub use policy_check::PolicyCheckStage;
pub use risk::RiskStage;
pub use routing::RoutingStage;

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::executor::{CallFailure, ResilientExecutor};
use crate::ports::{PolicyLookup, PortError};
use crate::types::{Claim, ClaimEvent};

/// Shared services handed to every stage invocation.
pub struct StageContext {
    pub executor: Arc<ResilientExecutor>,
    pub policies: Arc<dyn PolicyLookup>,
    pub config: Arc<PipelineConfig>,
    /// Cancellation for the claim currently being processed.
    pub cancel: CancellationToken,
}

/// Stage failure; the orchestrator decides the fallback policy.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The resilient call exhausted its budget or was cancelled.
    #[error("stage {stage} call failed: {source}")]
    Call {
        stage: &'static str,
        #[source]
        source: CallFailure,
    },

    /// An external collaborator was unavailable.
    #[error("stage {stage} collaborator failed: {source}")]
    Collaborator {
        stage: &'static str,
        #[source]
        source: PortError,
    },

    /// The claim is missing an input this stage declared.
    ///
    /// Indicates an orchestration defect, not a provider problem.
    #[error("stage {stage} missing required input: {what}")]
    MissingInput {
        stage: &'static str,
        what: &'static str,
    },

    /// A conformed value could not be converted to its typed output.
    #[error("stage {stage} produced an unusable value: {message}")]
    Malformed {
        stage: &'static str,
        message: String,
    },
}

impl StageError {
    /// Whether the failure came from a cancelled call.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Call {
                source: CallFailure::Cancelled { .. },
                ..
            }
        )
    }
}

/// Shared contract for the four concrete stages.
#[async_trait]
pub trait ClaimStage: Send + Sync {
    /// Stage name for logging and diagnostics.
    fn name(&self) -> &'static str;

    /// Run the stage against a read view of the claim.
    ///
    /// Returns the single event this stage emits; the event payload carries
    /// the stage output the orchestrator will attach to the claim.
    async fn run(&self, claim: &Claim, ctx: &StageContext) -> Result<ClaimEvent, StageError>;
}
