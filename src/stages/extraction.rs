//! Extraction stage
//!
//! Turns the raw claim submission into structured [`ClaimFacts`] via one
//! resilient provider call. The schema enforces a non-negative amount and
//! a non-future incident date; a reply that violates either is retried with
//! the stricter instruction rather than silently accepted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use super::{ClaimStage, StageContext, StageError};
use crate::executor::{FieldKind, FieldSpec, OutputSchema};
use crate::types::{Claim, ClaimCategory, ClaimEvent, ClaimFacts};

const STAGE_NAME: &str = "extraction";

/// Instruction template for fact extraction.
const EXTRACTION_PROMPT: &str = r#"You are a claims intake analyst for an insurance carrier.
Read the claim text and extract the structured facts.

### TASK: EXTRACT_CLAIM_FACTS

### CLAIM TEXT
{claim_text}

### INSTRUCTIONS
1. Classify the claim into exactly one category.
2. Extract the claimed amount as a plain number.
3. Extract the incident date; never guess a future date.
4. Summarize what happened in one or two sentences.
5. Extract the incident location and the claimant identifier if present."#;

/// Conformed provider output, deserialized from the normalized value.
#[derive(Debug, Deserialize)]
struct ExtractedFacts {
    category: String,
    amount: f64,
    incident_date: DateTime<Utc>,
    description: String,
    location: Option<String>,
    claimant_id: String,
}

/// Stage 1: raw text → structured claim facts.
pub struct ExtractionStage;

impl ExtractionStage {
    fn schema() -> OutputSchema {
        OutputSchema::new(
            "claim_facts",
            vec![
                FieldSpec::required(
                    "category",
                    FieldKind::Enum {
                        labels: &ClaimCategory::LABELS,
                    },
                ),
                FieldSpec::required(
                    "amount",
                    FieldKind::Number {
                        min: Some(0.0),
                        max: None,
                    },
                ),
                FieldSpec::required("incident_date", FieldKind::Date { not_future: true }),
                FieldSpec::required("description", FieldKind::String),
                FieldSpec::optional("location", FieldKind::String),
                FieldSpec::required("claimant_id", FieldKind::String),
            ],
        )
    }
}

#[async_trait]
impl ClaimStage for ExtractionStage {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    async fn run(&self, claim: &Claim, ctx: &StageContext) -> Result<ClaimEvent, StageError> {
        let outcome = ctx
            .executor
            .execute(
                EXTRACTION_PROMPT,
                &[("claim_text", claim.raw_input.clone())],
                &Self::schema(),
                &ctx.cancel,
            )
            .await
            .map_err(|source| StageError::Call {
                stage: STAGE_NAME,
                source,
            })?;

        let extracted: ExtractedFacts =
            serde_json::from_value(outcome.value).map_err(|e| StageError::Malformed {
                stage: STAGE_NAME,
                message: e.to_string(),
            })?;

        let facts = ClaimFacts {
            category: ClaimCategory::from_label(&extracted.category),
            amount: extracted.amount,
            incident_date: extracted.incident_date,
            description: extracted.description,
            location: extracted.location.unwrap_or_else(|| "unspecified".to_string()),
            claimant_id: extracted.claimant_id,
        };

        info!(
            claim_id = %claim.id,
            category = %facts.category,
            amount = facts.amount,
            attempts = outcome.attempts,
            "Claim facts extracted"
        );
        Ok(ClaimEvent::facts_extracted(claim.id, facts))
    }
}
