//! Claimflow demo binary
//!
//! Processes one claim end to end against seeded in-memory policies and
//! prints the terminal disposition plus the audit trail.
//!
//! # Usage
//!
//! ```bash
//! # Inline claim text with the deterministic mock provider
//! claimflow --text "My car was rear-ended on 2025-11-02, repairs $4,250. CUST-1001"
//!
//! # Claim text from a file, against a real endpoint
//! claimflow --file claim.txt --provider http
//! ```
//!
//! # Environment Variables
//!
//! - `CLAIMFLOW_CONFIG`: Path to a TOML config file
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use claimflow::bus::EventBus;
use claimflow::config::{PipelineConfig, ProviderBackend};
use claimflow::orchestrator::Orchestrator;
use claimflow::ports::{
    InMemoryClaimStore, InMemoryPolicyStore, InMemoryReviewQueue, ReviewQueue,
};
use claimflow::provider::{HttpProvider, MockProvider, TextProvider};
use claimflow::types::{ClaimEventKind, PolicyRecord, PolicyStatus};

#[derive(Parser, Debug)]
#[command(name = "claimflow")]
#[command(about = "Event-driven claim processing pipeline")]
#[command(version)]
struct CliArgs {
    /// Claim text to process
    #[arg(long, conflicts_with = "file")]
    text: Option<String>,

    /// Read claim text from a file
    #[arg(long)]
    file: Option<std::path::PathBuf>,

    /// Path to a TOML config file (overrides CLAIMFLOW_CONFIG)
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Provider backend override: mock or http
    #[arg(long)]
    provider: Option<String>,
}

/// Demo policies so the pipeline has something to validate against.
fn seed_policies() -> Vec<PolicyRecord> {
    let now = Utc::now();
    vec![
        PolicyRecord {
            policy_id: "POL-1001".to_string(),
            customer_id: "CUST-1001".to_string(),
            valid_from: now - Duration::days(120),
            valid_until: now + Duration::days(245),
            coverage_limit: 50_000.0,
            status: PolicyStatus::Active,
        },
        PolicyRecord {
            policy_id: "POL-1002".to_string(),
            customer_id: "CUST-1002".to_string(),
            valid_from: now - Duration::days(800),
            valid_until: now - Duration::days(435),
            coverage_limit: 25_000.0,
            status: PolicyStatus::Lapsed,
        },
    ]
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = CliArgs::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load_from(path)?,
        None => PipelineConfig::load()?,
    };
    if let Some(backend) = &args.provider {
        config.provider.backend = match backend.as_str() {
            "mock" => ProviderBackend::Mock,
            "http" => ProviderBackend::Http,
            other => bail!("unknown provider backend '{other}' (expected mock or http)"),
        };
    }

    let claim_text = match (&args.text, &args.file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read claim file {}", path.display()))?,
        (None, None) => bail!("provide a claim via --text or --file"),
    };

    let provider: Arc<dyn TextProvider> = match config.provider.backend {
        ProviderBackend::Mock => Arc::new(MockProvider::with_latency_jitter(20)),
        ProviderBackend::Http => Arc::new(HttpProvider::new(
            &config.provider.endpoint,
            &config.provider.model,
        )?),
    };
    info!(provider = provider.provider_name(), "Provider selected");

    let bus = Arc::new(EventBus::new());
    // External audit observer: every event kind, logged on arrival.
    for kind in [
        ClaimEventKind::FactsExtracted,
        ClaimEventKind::PolicyValidated,
        ClaimEventKind::RiskAssessed,
        ClaimEventKind::Routed,
        ClaimEventKind::Rejected,
    ] {
        bus.subscribe(kind, move |event| {
            info!(kind = %event.kind(), claim_id = %event.claim_id(), "Audit observer");
        });
    }

    let review_queue = Arc::new(InMemoryReviewQueue::new());
    let orchestrator = Orchestrator::new(
        bus,
        provider,
        Arc::new(InMemoryPolicyStore::new(seed_policies())),
        Arc::new(InMemoryClaimStore::new()),
        Arc::clone(&review_queue) as Arc<dyn ReviewQueue>,
        Arc::new(config),
    );

    let outcome = orchestrator
        .submit(&claim_text, CancellationToken::new())
        .await?;

    println!("claim {}: {:?}", outcome.claim.id, outcome.disposition);
    println!("audit trail:");
    for event in &outcome.claim.events {
        println!("  {} {}", event.timestamp().to_rfc3339(), event.kind());
    }
    for entry in review_queue.entries() {
        println!("review queue: {} ({:?})", entry.claim_id, entry.priority);
    }

    Ok(())
}
