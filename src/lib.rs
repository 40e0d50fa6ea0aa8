//! Claimflow: event-driven claim processing pipeline
//!
//! Drives a claim through a fixed stage sequence (extraction, policy
//! validation, risk assessment, routing) where each stage calls an
//! unreliable text-generation provider, decodes and repairs its output
//! against a declared schema, and emits one domain event that advances the
//! workflow.
//!
//! ## Architecture
//!
//! - **Resilient Call Executor**: layered decode + schema normalization +
//!   bounded retries with backoff
//! - **Pipeline Stages**: four stages sharing one contract, each a prompt
//!   template plus an output schema plus deterministic post-processing
//! - **Notification Bus**: in-process pub/sub for claim events
//! - **Orchestrator**: owns the claim lifecycle and its state machine

pub mod bus;
pub mod config;
pub mod executor;
pub mod orchestrator;
pub mod ports;
pub mod provider;
pub mod stages;
pub mod types;

// Re-export commonly used types
pub use bus::EventBus;
pub use config::PipelineConfig;
pub use executor::{CallFailure, CallOutcome, OutputSchema, ResilientExecutor};
pub use orchestrator::{Disposition, Orchestrator, OrchestratorError, PipelineOutcome};
pub use ports::{ClaimStore, PolicyLookup, ReviewQueue};
pub use provider::{HttpProvider, MockProvider, TextProvider};
pub use types::{
    Claim, ClaimEvent, ClaimEventKind, ClaimFacts, ClaimId, ClaimStatus, PolicyRecord,
    RejectionReason, RiskAssessment, RiskTier, RoutingDestination,
};
