//! Policy validation stage
//!
//! Consults the read-only policy lookup for the claimant's policies, applies
//! the deterministic eligibility rules (policy exists, is active, coverage
//! limit not exceeded), then asks the provider whether the coverage terms
//! apply to this category of loss.
//!
//! Every ineligibility outcome is a `Rejected` event: an expected business
//! result, not a fault.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use super::{ClaimStage, StageContext, StageError};
use crate::executor::{FieldKind, FieldSpec, OutputSchema};
use crate::types::{Claim, ClaimEvent, PolicyRecord, RejectionReason};

const STAGE_NAME: &str = "policy_check";

const POLICY_PROMPT: &str = r#"You are a policy coverage analyst for an insurance carrier.
Decide whether the policy's coverage terms apply to this claim.

### TASK: VALIDATE_POLICY

### CLAIM
Category: {category}
Amount: {amount}
Description: {description}

### POLICY
Policy ID: {policy_id}
coverage_limit: {coverage_limit}
Valid: {valid_from} to {valid_until}

### INSTRUCTIONS
1. Confirm the loss category falls under the policy's coverage terms.
2. Do not re-check the amount against the limit; that is handled separately.
3. Give a one-sentence reason."#;

#[derive(Debug, Deserialize)]
struct CoverageOpinion {
    coverage_confirmed: bool,
    #[allow(dead_code)]
    reason: Option<String>,
}

/// Stage 2: claim facts + policy lookup → policy validated or rejected.
pub struct PolicyCheckStage;

impl PolicyCheckStage {
    fn schema() -> OutputSchema {
        OutputSchema::new(
            "coverage_opinion",
            vec![
                FieldSpec::required("coverage_confirmed", FieldKind::Bool),
                FieldSpec::optional("reason", FieldKind::String),
            ],
        )
    }

    /// Pick the policy to validate against: first one active right now.
    fn select_active(policies: &[PolicyRecord]) -> Option<&PolicyRecord> {
        let now = Utc::now();
        policies.iter().find(|p| p.is_active_at(now))
    }
}

#[async_trait]
impl ClaimStage for PolicyCheckStage {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    async fn run(&self, claim: &Claim, ctx: &StageContext) -> Result<ClaimEvent, StageError> {
        let facts = claim.facts.as_ref().ok_or(StageError::MissingInput {
            stage: STAGE_NAME,
            what: "claim facts",
        })?;

        let policies = ctx
            .policies
            .find_by_customer(&facts.claimant_id)
            .await
            .map_err(|source| StageError::Collaborator {
                stage: STAGE_NAME,
                source,
            })?;

        if policies.is_empty() {
            info!(claim_id = %claim.id, claimant = %facts.claimant_id, "No policy on file");
            return Ok(ClaimEvent::rejected(claim.id, RejectionReason::PolicyNotFound));
        }

        let Some(policy) = Self::select_active(&policies) else {
            info!(claim_id = %claim.id, candidates = policies.len(), "No active policy");
            return Ok(ClaimEvent::rejected(claim.id, RejectionReason::PolicyInactive));
        };

        // Deterministic limit check; never delegated to the provider.
        if facts.amount > policy.coverage_limit {
            info!(
                claim_id = %claim.id,
                amount = facts.amount,
                limit = policy.coverage_limit,
                "Claim exceeds coverage limit"
            );
            return Ok(ClaimEvent::rejected(claim.id, RejectionReason::CoverageExceeded));
        }

        let context = [
            ("category", facts.category.to_string()),
            ("amount", format!("{:.2}", facts.amount)),
            ("description", facts.description.clone()),
            ("policy_id", policy.policy_id.clone()),
            ("coverage_limit", format!("{:.2}", policy.coverage_limit)),
            ("valid_from", policy.valid_from.to_rfc3339()),
            ("valid_until", policy.valid_until.to_rfc3339()),
        ];

        let outcome = ctx
            .executor
            .execute(POLICY_PROMPT, &context, &Self::schema(), &ctx.cancel)
            .await
            .map_err(|source| StageError::Call {
                stage: STAGE_NAME,
                source,
            })?;

        let opinion: CoverageOpinion =
            serde_json::from_value(outcome.value).map_err(|e| StageError::Malformed {
                stage: STAGE_NAME,
                message: e.to_string(),
            })?;

        if !opinion.coverage_confirmed {
            info!(claim_id = %claim.id, policy_id = %policy.policy_id, "Coverage not applicable");
            return Ok(ClaimEvent::rejected(
                claim.id,
                RejectionReason::CoverageNotApplicable,
            ));
        }

        info!(
            claim_id = %claim.id,
            policy_id = %policy.policy_id,
            attempts = outcome.attempts,
            "Policy validated"
        );
        Ok(ClaimEvent::policy_validated(
            claim.id,
            policy.policy_id.clone(),
            true,
        ))
    }
}
