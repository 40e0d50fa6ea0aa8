//! Risk assessment stage
//!
//! Scores the claim for fraud/risk via the provider, then derives the risk
//! tier deterministically from the configured thresholds. The provider
//! supplies the score and contributing factors, never the tier.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use super::{ClaimStage, StageContext, StageError};
use crate::executor::{FieldKind, FieldSpec, OutputSchema};
use crate::types::{Claim, ClaimEvent, RiskAssessment, RiskTier};

const STAGE_NAME: &str = "risk_assessment";

const RISK_PROMPT: &str = r#"You are a fraud and risk analyst for an insurance carrier.
Assess the fraud/risk profile of this validated claim.

### TASK: ASSESS_RISK

### CLAIM
Category: {category}
Amount: {amount}
Incident date: {incident_date}
Description: {description}
Location: {location}
Policy: {policy_id}

### INSTRUCTIONS
1. Score the claim between 0.0 (benign) and 1.0 (near-certain fraud).
2. List the contributing factors, most significant first.
3. State your confidence in the assessment between 0.0 and 1.0."#;

#[derive(Debug, Deserialize)]
struct ScoredRisk {
    score: f64,
    #[serde(default)]
    factors: Vec<String>,
    confidence: f64,
}

/// Stage 3: validated claim → risk assessment.
pub struct RiskStage;

impl RiskStage {
    fn schema() -> OutputSchema {
        OutputSchema::new(
            "risk_assessment",
            vec![
                FieldSpec::required(
                    "score",
                    FieldKind::Number {
                        min: Some(0.0),
                        max: Some(1.0),
                    },
                ),
                FieldSpec::required("factors", FieldKind::StringList),
                FieldSpec::required(
                    "confidence",
                    FieldKind::Number {
                        min: Some(0.0),
                        max: Some(1.0),
                    },
                ),
            ],
        )
    }
}

#[async_trait]
impl ClaimStage for RiskStage {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    async fn run(&self, claim: &Claim, ctx: &StageContext) -> Result<ClaimEvent, StageError> {
        let facts = claim.facts.as_ref().ok_or(StageError::MissingInput {
            stage: STAGE_NAME,
            what: "claim facts",
        })?;
        let policy_id = claim.policy_id.as_ref().ok_or(StageError::MissingInput {
            stage: STAGE_NAME,
            what: "validated policy",
        })?;

        let context = [
            ("category", facts.category.to_string()),
            ("amount", format!("{:.2}", facts.amount)),
            ("incident_date", facts.incident_date.to_rfc3339()),
            ("description", facts.description.clone()),
            ("location", facts.location.clone()),
            ("policy_id", policy_id.clone()),
        ];

        let outcome = ctx
            .executor
            .execute(RISK_PROMPT, &context, &Self::schema(), &ctx.cancel)
            .await
            .map_err(|source| StageError::Call {
                stage: STAGE_NAME,
                source,
            })?;

        let scored: ScoredRisk =
            serde_json::from_value(outcome.value).map_err(|e| StageError::Malformed {
                stage: STAGE_NAME,
                message: e.to_string(),
            })?;

        let assessment = RiskAssessment {
            score: scored.score,
            tier: RiskTier::from_score(scored.score, &ctx.config.risk),
            factors: scored.factors,
            confidence: scored.confidence,
            assessed_at: Utc::now(),
        };

        info!(
            claim_id = %claim.id,
            score = assessment.score,
            tier = %assessment.tier,
            attempts = outcome.attempts,
            "Risk assessed"
        );
        Ok(ClaimEvent::risk_assessed(claim.id, assessment))
    }
}
