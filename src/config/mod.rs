//! Pipeline Configuration Module
//!
//! Provides pipeline configuration loaded from TOML files, replacing
//! hardcoded retry budgets, risk thresholds, and provider settings with
//! operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. Explicit path passed to [`PipelineConfig::load_from`]
//! 2. `CLAIMFLOW_CONFIG` environment variable (path to TOML file)
//! 3. `claimflow.toml` in the current working directory
//! 4. Built-in defaults (see [`defaults`])
//!
//! The config is constructed once at startup and passed by reference to the
//! orchestrator and stages. There is no process-wide global, so tests can
//! build isolated instances.

pub mod defaults;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Errors raised while loading or validating configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which text-generation backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderBackend {
    /// Deterministic canned responses (testing, offline demo).
    Mock,
    /// OpenAI-compatible chat completions endpoint.
    Http,
}

/// Text-generation provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub backend: ProviderBackend,
    /// Sampling temperature, [0.0, 1.0].
    pub temperature: f32,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    /// Endpoint URL for the HTTP backend.
    pub endpoint: String,
    /// Model name for the HTTP backend.
    pub model: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            backend: ProviderBackend::Mock,
            temperature: defaults::DEFAULT_TEMPERATURE,
            timeout_secs: defaults::DEFAULT_PROVIDER_TIMEOUT_SECS,
            endpoint: "http://localhost:8000/v1/chat/completions".to_string(),
            model: "qwen2.5-7b-instruct".to_string(),
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retry and backoff settings for the resilient call executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempt budget per stage call (first try + retries). Capped at
    /// [`defaults::MAX_ATTEMPTS_CAP`].
    pub max_attempts: u32,
    /// Base delay between attempts (ms); doubles each retry.
    pub backoff_base_ms: u64,
    /// Cap on the backoff delay (ms).
    pub backoff_cap_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::DEFAULT_MAX_ATTEMPTS,
            backoff_base_ms: defaults::DEFAULT_BACKOFF_BASE_MS,
            backoff_cap_ms: defaults::DEFAULT_BACKOFF_CAP_MS,
        }
    }
}

impl RetryConfig {
    /// Backoff delay before retry `attempt` (1-based), exponential and capped.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ms = self
            .backoff_base_ms
            .saturating_mul(1u64 << exp)
            .min(self.backoff_cap_ms);
        Duration::from_millis(ms)
    }
}

/// Score thresholds for risk tier derivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    pub low_below: f64,
    pub medium_below: f64,
    pub high_below: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            low_below: defaults::RISK_LOW_BELOW,
            medium_below: defaults::RISK_MEDIUM_BELOW,
            high_below: defaults::RISK_HIGH_BELOW,
        }
    }
}

/// Deterministic routing overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Scores at or above this always route to manual review, regardless of
    /// the provider's suggestion.
    pub forced_review_score: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            forced_review_score: defaults::FORCED_REVIEW_SCORE,
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub provider: ProviderConfig,
    pub retry: RetryConfig,
    pub risk: RiskThresholds,
    pub routing: RoutingConfig,
}

impl PipelineConfig {
    /// Load using the standard order: `CLAIMFLOW_CONFIG` env var, then
    /// `claimflow.toml` in the working directory, then built-in defaults.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var("CLAIMFLOW_CONFIG") {
            return Self::load_from(&path);
        }
        let cwd_path = Path::new("claimflow.toml");
        if cwd_path.exists() {
            return Self::load_from(cwd_path);
        }
        info!("No config file found, using built-in defaults");
        Ok(Self::default())
    }

    /// Load and validate a specific TOML file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        info!(path = %path.display(), "Loaded pipeline config");
        Ok(config)
    }

    /// Reject configurations that would misbehave at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts > defaults::MAX_ATTEMPTS_CAP {
            warn!(
                configured = self.retry.max_attempts,
                cap = defaults::MAX_ATTEMPTS_CAP,
                "retry.max_attempts exceeds cap, clamping"
            );
        }
        if !(self.risk.low_below < self.risk.medium_below
            && self.risk.medium_below < self.risk.high_below
            && self.risk.high_below <= 1.0
            && self.risk.low_below > 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "risk thresholds must be strictly increasing within (0, 1]: {} / {} / {}",
                self.risk.low_below, self.risk.medium_below, self.risk.high_below
            )));
        }
        if !(0.0..=1.0).contains(&self.routing.forced_review_score) {
            return Err(ConfigError::Invalid(
                "routing.forced_review_score must be within [0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.provider.temperature) {
            return Err(ConfigError::Invalid(
                "provider.temperature must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective attempt budget after clamping to the cap.
    pub fn effective_max_attempts(&self) -> u32 {
        self.retry.max_attempts.min(defaults::MAX_ATTEMPTS_CAP)
    }
}
