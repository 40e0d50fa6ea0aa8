//! Text-Generation Provider Module
//!
//! Provides a unified interface for text-generation backends so the
//! pipeline can swap between a real HTTP endpoint and deterministic mocks.
//!
//! ## Backends
//!
//! - **HttpProvider**: OpenAI-compatible chat completions endpoint
//! - **MockProvider**: deterministic canned structured output keyed on the
//!   prompt contents (offline demo and tests)
//! - **ScriptedProvider**: replays a fixed script of responses/errors, for
//!   exercising the executor's retry and decode paths in tests

mod http;
mod mock;

pub use http::HttpProvider;
pub use mock::{MockProvider, ScriptedProvider, ScriptedReply};

use async_trait::async_trait;
use std::time::Duration;

/// Errors from a text-generation backend.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The call did not complete within the deadline.
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    /// Transport-level failure (unreachable, connection reset, bad status).
    #[error("provider unreachable: {0}")]
    Connectivity(String),

    /// The backend answered but the response envelope was unusable.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    /// Processing was cancelled by the caller.
    #[error("provider call cancelled")]
    Cancelled,
}

/// Unified trait for text-generation backends.
///
/// The returned string is free-form text; decoding it into a structured
/// value is the executor's job, not the provider's.
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Generate a response for the prompt within the timeout.
    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<String, ProviderError>;

    /// Backend name for logging.
    fn provider_name(&self) -> &'static str;
}
