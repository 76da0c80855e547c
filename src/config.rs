//! Process configuration for the orchestrator and auditor binaries.
//!
//! No TOML/YAML/config crate is introduced. A plain struct with a
//! [`Default`] impl is built once at startup, with each field optionally
//! overridden by an environment variable. Callers who want something
//! fancier can always construct [`ClearFlowConfig`] by hand.

use std::path::PathBuf;
use std::time::Duration;

/// Global configuration for a `clearflow` process.
///
/// Every field has a sensible default; every field can be overridden by an
/// environment variable at startup. None of the variables are mandatory.
#[derive(Debug, Clone)]
pub struct ClearFlowConfig {
    /// Address the orchestrator HTTP surface binds to.
    pub orchestrator_bind_addr: String,
    /// Address the auditor HTTP surface binds to.
    pub auditor_bind_addr: String,
    /// Path to the agent registry snapshot file.
    pub registry_snapshot_path: PathBuf,
    /// Path to the water counter snapshot file.
    pub water_snapshot_path: PathBuf,
    /// Path to the JSON file mapping LLM provider name to bearer token.
    pub llm_secret_path: PathBuf,
    /// Chat-completions endpoint the LLM Client talks to.
    pub llm_endpoint: String,
    /// Timeout for `GET {base_url}/manifest` during registration.
    pub register_timeout: Duration,
    /// Timeout for `GET {base_url}/metrics` during aggregation.
    pub metrics_timeout: Duration,
    /// Timeout for `GET {base_url}/audit_policy`.
    pub policy_timeout: Duration,
    /// Timeout for `POST {base_url}/execute`.
    pub execute_timeout: Duration,
    /// Timeout for the LLM feasibility-gate call.
    pub llm_feasibility_timeout: Duration,
    /// Timeout for the LLM plan-generation call.
    pub llm_planning_timeout: Duration,
    /// Timeout for the LLM audit call.
    pub llm_audit_timeout: Duration,
}

impl Default for ClearFlowConfig {
    fn default() -> Self {
        Self {
            orchestrator_bind_addr: env_or("ORCHESTRATOR_BIND_ADDR", "127.0.0.1:8000"),
            auditor_bind_addr: env_or("AUDITOR_BIND_ADDR", "127.0.0.1:8001"),
            registry_snapshot_path: env_path_or(
                "ORCHESTRATOR_REGISTRY_SNAPSHOT_PATH",
                "agents.json",
            ),
            water_snapshot_path: env_path_or(
                "ORCHESTRATOR_WATER_SNAPSHOT_PATH",
                "aiwaterdrops.json",
            ),
            llm_secret_path: env_path_or("ORCHESTRATOR_LLM_SECRET_PATH", "license_keys.json"),
            llm_endpoint: env_or(
                "ORCHESTRATOR_LLM_ENDPOINT",
                "https://api.mistral.ai/v1/chat/completions",
            ),
            register_timeout: Duration::from_secs(5),
            metrics_timeout: Duration::from_secs(3),
            policy_timeout: Duration::from_secs(4),
            execute_timeout: Duration::from_secs(30),
            llm_feasibility_timeout: Duration::from_secs(20),
            llm_planning_timeout: Duration::from_secs(30),
            llm_audit_timeout: Duration::from_secs(45),
        }
    }
}

impl ClearFlowConfig {
    /// Load configuration from the environment, falling back to defaults for
    /// anything unset.
    ///
    /// # Example
    ///
    /// ```rust
    /// use clearflow::ClearFlowConfig;
    ///
    /// let config = ClearFlowConfig::from_env();
    /// assert!(!config.orchestrator_bind_addr.is_empty());
    /// ```
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Same as [`ClearFlowConfig::from_env`] but with the auditor's default
    /// LLM endpoint env var (`AUDITOR_LLM_ENDPOINT`) consulted instead of the
    /// orchestrator's, since the two processes may point at different LLM
    /// deployments.
    pub fn from_env_for_auditor() -> Self {
        let mut config = Self::default();
        if let Ok(endpoint) = std::env::var("AUDITOR_LLM_ENDPOINT") {
            config.llm_endpoint = endpoint;
        }
        config
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_path_or(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}
