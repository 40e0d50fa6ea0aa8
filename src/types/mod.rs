//! Shared data structures for the claim processing pipeline
//!
//! This module defines the core types that flow through the pipeline:
//! - Claim: the aggregate work item and its status state machine
//! - ClaimFacts: structured summary produced by the extraction stage
//! - RiskAssessment: bounded score + tier produced by the risk stage
//! - ClaimEvent: immutable domain events forming the audit trail
//! - PolicyRecord: read-only reference record consulted by the policy stage

mod assessment;
mod claim;
mod event;
mod facts;
mod policy;

pub use assessment::*;
pub use claim::*;
pub use event::*;
pub use facts::*;
pub use policy::*;
