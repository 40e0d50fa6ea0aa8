//! Routing stage
//!
//! Asks the provider for a routing suggestion, then applies the
//! deterministic business overrides: a score at or above the forced-review
//! threshold can never reach automated processing, and a high-tier claim
//! suggested for automated processing is upgraded to the investigation
//! queue, whatever the provider suggested.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::{ClaimStage, StageContext, StageError};
use crate::executor::{FieldKind, FieldSpec, OutputSchema};
use crate::types::{Claim, ClaimEvent, RiskTier, RoutingDestination};

const STAGE_NAME: &str = "routing";

const ROUTING_PROMPT: &str = r#"You are a claims routing analyst for an insurance carrier.
Choose the processing destination for this assessed claim.

### TASK: ROUTE_CLAIM

### CLAIM
Category: {category}
Amount: {amount}
Risk score: {score} ({tier})
Risk factors: {factors}

### INSTRUCTIONS
1. Low-risk routine claims go to automated processing.
2. Claims needing human judgment go to the manual review queue.
3. Suspected fraud goes to the investigation queue.
4. Give a one-sentence rationale."#;

#[derive(Debug, Deserialize)]
struct RoutingSuggestion {
    destination: String,
    #[allow(dead_code)]
    rationale: Option<String>,
}

/// Stage 4: assessed claim → routing decision.
pub struct RoutingStage;

impl RoutingStage {
    fn schema() -> OutputSchema {
        OutputSchema::new(
            "routing_decision",
            vec![
                FieldSpec::required(
                    "destination",
                    FieldKind::Enum {
                        labels: &RoutingDestination::LABELS,
                    },
                ),
                FieldSpec::optional("rationale", FieldKind::String),
            ],
        )
    }

    /// Deterministic overrides applied on top of the provider suggestion:
    /// a score at or above the forced-review threshold always lands in
    /// manual review, and a high-tier claim can never be suggested into
    /// automated processing.
    fn apply_overrides(
        suggested: RoutingDestination,
        score: f64,
        tier: RiskTier,
        forced_review_score: f64,
    ) -> RoutingDestination {
        if score >= forced_review_score && !suggested.requires_review() {
            return RoutingDestination::ManualReviewQueue;
        }
        if tier >= RiskTier::High && suggested == RoutingDestination::AutomatedProcessing {
            return RoutingDestination::InvestigationQueue;
        }
        suggested
    }
}

#[async_trait]
impl ClaimStage for RoutingStage {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    async fn run(&self, claim: &Claim, ctx: &StageContext) -> Result<ClaimEvent, StageError> {
        let facts = claim.facts.as_ref().ok_or(StageError::MissingInput {
            stage: STAGE_NAME,
            what: "claim facts",
        })?;
        let assessment = claim.assessment.as_ref().ok_or(StageError::MissingInput {
            stage: STAGE_NAME,
            what: "risk assessment",
        })?;

        let context = [
            ("category", facts.category.to_string()),
            ("amount", format!("{:.2}", facts.amount)),
            ("score", format!("{:.2}", assessment.score)),
            ("tier", assessment.tier.to_string()),
            ("factors", assessment.factors.join(", ")),
        ];

        let outcome = ctx
            .executor
            .execute(ROUTING_PROMPT, &context, &Self::schema(), &ctx.cancel)
            .await
            .map_err(|source| StageError::Call {
                stage: STAGE_NAME,
                source,
            })?;

        let suggestion: RoutingSuggestion =
            serde_json::from_value(outcome.value).map_err(|e| StageError::Malformed {
                stage: STAGE_NAME,
                message: e.to_string(),
            })?;

        // The schema's enum constraint guarantees a known label here.
        let suggested = RoutingDestination::from_label(&suggestion.destination).ok_or_else(|| {
            StageError::Malformed {
                stage: STAGE_NAME,
                message: format!("unknown destination '{}'", suggestion.destination),
            }
        })?;

        let destination = Self::apply_overrides(
            suggested,
            assessment.score,
            assessment.tier,
            ctx.config.routing.forced_review_score,
        );
        if destination != suggested {
            info!(
                claim_id = %claim.id,
                %suggested,
                %destination,
                score = assessment.score,
                "Routing override applied"
            );
        }

        info!(
            claim_id = %claim.id,
            %destination,
            attempts = outcome.attempts,
            "Claim routed"
        );
        Ok(ClaimEvent::routed(claim.id, destination))
    }
}
