//! Resilient Call Executor
//!
//! Wraps a single structured call to the text-generation provider: renders
//! the instruction template, issues the call, runs the reply through the
//! layered decode pipeline and schema conformance, and retries with a
//! progressively stricter instruction and exponential backoff when the
//! reply cannot be trusted.
//!
//! ## Guarantees
//!
//! - Total attempts are bounded (config, hard cap 4); the executor never
//!   raises an unrecoverable fault. Exhaustion returns a typed
//!   [`CallFailure`] carrying the full per-attempt history.
//! - No lock is held during backoff sleeps; the provider call is the sole
//!   suspension point and honors both the per-call timeout and the caller's
//!   cancellation token.
//! - The executor never touches the claim; callers decide fallback policy.

pub mod decode;
pub mod normalize;
pub mod schema;

pub use decode::{DecodeError, DecodeLayer};
pub use schema::{FieldKind, FieldSpec, OutputSchema, SchemaViolation};

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{PipelineConfig, RetryConfig};
use crate::provider::{ProviderError, TextProvider};

/// How many characters of a raw reply are preserved in failure records.
const RAW_EXCERPT_CHARS: usize = 400;

/// One failed attempt, recorded immutably as it happens.
#[derive(Debug, Clone)]
pub struct AttemptFailure {
    /// 1-based attempt number.
    pub attempt: u32,
    /// Leading excerpt of the raw provider reply (empty if the call errored).
    pub raw_excerpt: String,
    /// What went wrong: provider error, decode failure, or violations.
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Terminal failure of a resilient call.
#[derive(Debug, thiserror::Error)]
pub enum CallFailure {
    /// The attempt budget ran out without a trustworthy reply.
    #[error("call exhausted {attempts} attempts; last error: {last_error}")]
    Exhausted {
        attempts: u32,
        /// Per-attempt failure history, oldest first.
        history: Vec<AttemptFailure>,
        /// Raw text of the final reply (excerpt).
        last_raw: String,
        last_error: String,
    },

    /// The caller cancelled processing.
    #[error("call cancelled after {attempts_completed} attempts")]
    Cancelled { attempts_completed: u32 },
}

/// Successful call result plus its retry diagnostics.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    /// Normalized value conforming to the schema.
    pub value: Value,
    /// Attempts consumed, including the successful one.
    pub attempts: u32,
    /// Failures that preceded the success (empty on first-try success).
    pub failures: Vec<AttemptFailure>,
    /// Which decode layer produced the accepted value.
    pub decode_layer: DecodeLayer,
}

/// Executor for resilient structured provider calls.
///
/// Injected into each stage as a composed capability; stages own their
/// templates and schemas, the executor owns the call discipline.
pub struct ResilientExecutor {
    provider: Arc<dyn TextProvider>,
    retry: RetryConfig,
    max_attempts: u32,
    temperature: f32,
    timeout: Duration,
}

impl ResilientExecutor {
    pub fn new(provider: Arc<dyn TextProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            retry: config.retry.clone(),
            max_attempts: config.effective_max_attempts(),
            temperature: config.provider.temperature,
            timeout: config.provider.timeout(),
        }
    }

    /// Render `template`, interpolating `{name}` placeholders from `context`.
    fn render(template: &str, context: &[(&str, String)]) -> String {
        let mut prompt = template.to_string();
        for (name, value) in context {
            prompt = prompt.replace(&format!("{{{name}}}"), value);
        }
        prompt
    }

    /// Issue the call with bounded retries; see module docs for semantics.
    pub async fn execute(
        &self,
        template: &str,
        context: &[(&str, String)],
        schema: &OutputSchema,
        cancel: &CancellationToken,
    ) -> Result<CallOutcome, CallFailure> {
        let base_prompt = Self::render(template, context);
        let field_names = schema.field_names();
        let mut history: Vec<AttemptFailure> = Vec::new();

        for attempt in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                return Err(CallFailure::Cancelled {
                    attempts_completed: attempt - 1,
                });
            }

            if attempt > 1 {
                let delay = self.retry.backoff_delay(attempt - 1);
                debug!(schema = schema.name, attempt, ?delay, "Backing off before retry");
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = cancel.cancelled() => {
                        return Err(CallFailure::Cancelled {
                            attempts_completed: attempt - 1,
                        });
                    }
                }
            }

            // Retries append the stricter shape instruction.
            let prompt = if attempt == 1 {
                format!("{base_prompt}\n{}", schema.render_instructions())
            } else {
                format!("{base_prompt}\n{}", schema.render_strict_instructions())
            };

            let raw = tokio::select! {
                result = self.provider.generate(&prompt, self.temperature, self.timeout) => result,
                () = cancel.cancelled() => {
                    return Err(CallFailure::Cancelled {
                        attempts_completed: attempt - 1,
                    });
                }
            };

            let raw = match raw {
                Ok(text) => text,
                Err(ProviderError::Cancelled) => {
                    return Err(CallFailure::Cancelled {
                        attempts_completed: attempt - 1,
                    });
                }
                Err(err) => {
                    warn!(
                        schema = schema.name,
                        attempt,
                        provider = self.provider.provider_name(),
                        error = %err,
                        "Provider call failed"
                    );
                    history.push(AttemptFailure {
                        attempt,
                        raw_excerpt: String::new(),
                        error: err.to_string(),
                        at: Utc::now(),
                    });
                    continue;
                }
            };

            match decode::decode(&raw, &field_names) {
                Ok((value, layer)) => match schema.conform(&value, Utc::now()) {
                    Ok(normalized) => {
                        if layer != DecodeLayer::Strict {
                            debug!(
                                schema = schema.name,
                                attempt,
                                layer = %layer,
                                "Reply accepted via non-strict decode layer"
                            );
                        }
                        return Ok(CallOutcome {
                            value: normalized,
                            attempts: attempt,
                            failures: history,
                            decode_layer: layer,
                        });
                    }
                    Err(violations) => {
                        let error = format!(
                            "schema validation failed: {}",
                            violations
                                .iter()
                                .map(ToString::to_string)
                                .collect::<Vec<_>>()
                                .join("; ")
                        );
                        warn!(schema = schema.name, attempt, %error, "Reply failed validation");
                        history.push(AttemptFailure {
                            attempt,
                            raw_excerpt: excerpt(&raw),
                            error,
                            at: Utc::now(),
                        });
                    }
                },
                Err(err) => {
                    warn!(schema = schema.name, attempt, error = %err, "Reply failed every decode layer");
                    history.push(AttemptFailure {
                        attempt,
                        raw_excerpt: excerpt(&raw),
                        error: err.to_string(),
                        at: Utc::now(),
                    });
                }
            }
        }

        let last_error = history
            .last()
            .map(|f| f.error.clone())
            .unwrap_or_else(|| "no attempts made".to_string());
        let last_raw = history
            .last()
            .map(|f| f.raw_excerpt.clone())
            .unwrap_or_default();
        Err(CallFailure::Exhausted {
            attempts: self.max_attempts,
            history,
            last_raw,
            last_error,
        })
    }
}

fn excerpt(raw: &str) -> String {
    raw.chars().take(RAW_EXCERPT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ScriptedProvider, ScriptedReply};
    use serde_json::json;

    fn schema() -> OutputSchema {
        OutputSchema::new(
            "assessment",
            vec![
                FieldSpec::required("score", FieldKind::Number { min: Some(0.0), max: Some(1.0) }),
                FieldSpec::required("confidence", FieldKind::Number { min: Some(0.0), max: Some(1.0) }),
            ],
        )
    }

    fn fast_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.retry.backoff_base_ms = 1;
        config.retry.backoff_cap_ms = 2;
        config
    }

    #[tokio::test]
    async fn clean_reply_succeeds_on_first_attempt() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedReply::text(
            r#"{"score": 0.4, "confidence": 0.9}"#,
        )]));
        let executor = ResilientExecutor::new(provider.clone(), &fast_config());

        let outcome = executor
            .execute("{claim}", &[("claim", "demo".to_string())], &schema(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.value["score"], json!(0.4));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn invalid_then_valid_reply_retries_and_records_history() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            // Decodes fine but violates the score range.
            ScriptedReply::text(r#"{"score": -3, "confidence": 0.9}"#),
            ScriptedReply::text(r#"{"score": 0.2, "confidence": 0.8}"#),
        ]));
        let executor = ResilientExecutor::new(provider.clone(), &fast_config());

        let outcome = executor
            .execute("prompt", &[], &schema(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].error.contains("score"));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn garbage_exhausts_bounded_attempts() {
        let provider = Arc::new(ScriptedProvider::always("no structured data here"));
        let executor = ResilientExecutor::new(provider.clone(), &fast_config());

        let failure = executor
            .execute("prompt", &[], &schema(), &CancellationToken::new())
            .await
            .unwrap_err();
        match failure {
            CallFailure::Exhausted { attempts, history, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(history.len(), 3);
            }
            CallFailure::Cancelled { .. } => panic!("expected exhaustion"),
        }
        // Bounded: exactly the attempt budget, no more.
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn provider_errors_retry_then_exhaust() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedReply::Error(crate::provider::ProviderError::Connectivity("down".into())),
            ScriptedReply::Error(crate::provider::ProviderError::Timeout(Duration::from_secs(1))),
            ScriptedReply::Error(crate::provider::ProviderError::Connectivity("down".into())),
        ]));
        let executor = ResilientExecutor::new(provider, &fast_config());

        let failure = executor
            .execute("prompt", &[], &schema(), &CancellationToken::new())
            .await
            .unwrap_err();
        match failure {
            CallFailure::Exhausted { history, last_error, .. } => {
                assert_eq!(history.len(), 3);
                assert!(last_error.contains("unreachable"));
            }
            CallFailure::Cancelled { .. } => panic!("expected exhaustion"),
        }
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_first_call() {
        let provider = Arc::new(ScriptedProvider::always(r#"{"score": 0.1, "confidence": 0.9}"#));
        let executor = ResilientExecutor::new(provider.clone(), &fast_config());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let failure = executor
            .execute("prompt", &[], &schema(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(failure, CallFailure::Cancelled { attempts_completed: 0 }));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn noisy_reply_normalizes_like_clean_reply() {
        let noisy = "Here you go:\n```json\n{\"score\": \"0.4\", \"confidence\": 0.9,}\n```";
        let clean = r#"{"score": 0.4, "confidence": 0.9}"#;

        let run = |text: &str| {
            let provider = Arc::new(ScriptedProvider::new(vec![ScriptedReply::text(text)]));
            let executor = ResilientExecutor::new(provider, &fast_config());
            async move {
                executor
                    .execute("prompt", &[], &schema(), &CancellationToken::new())
                    .await
                    .unwrap()
                    .value
            }
        };

        assert_eq!(run(noisy).await, run(clean).await);
    }
}
