//! TOML configuration for the orchestrator and its worker client.
//!
//! Every section and field is optional; missing values take the defaults
//! documented on each field.

use crate::engine::{DependencyFailurePolicy, EngineConfig};
use ensemble_core::{CapabilityId, EnsembleError, EnsembleResult, QualityThresholds};
use ensemble_worker::{BreakerConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub router: RouterSettings,
    #[serde(default)]
    pub quality: QualityThresholds,
}

/// Where the remote worker service lives and how to reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token; empty means none.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl WorkerSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// The configured token, treating an empty string as absent.
    pub fn bearer_token(&self) -> Option<String> {
        self.api_key.clone().filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_true")]
    pub parallel: bool,
    #[serde(default)]
    pub dependency_policy: DependencyFailurePolicy,
    /// Whole-assignment re-executions after a failed attempt.
    #[serde(default = "default_assignment_retries")]
    pub assignment_retries: u32,
    #[serde(default = "default_timeout_buffer_ms")]
    pub timeout_buffer_ms: u64,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Number of finished session reports kept for `report`.
    #[serde(default = "default_report_archive")]
    pub report_archive: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            parallel: true,
            dependency_policy: DependencyFailurePolicy::default(),
            assignment_retries: default_assignment_retries(),
            timeout_buffer_ms: default_timeout_buffer_ms(),
            event_capacity: default_event_capacity(),
            report_archive: default_report_archive(),
        }
    }
}

impl EngineSettings {
    pub fn timeout_buffer(&self) -> Duration {
        Duration::from_millis(self.timeout_buffer_ms)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_concurrency: self.max_concurrency,
            parallel: self.parallel,
            dependency_policy: self.dependency_policy,
            assignment_retries: self.assignment_retries,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterSettings {
    /// Capability used when a subtask has no resolvable preset.
    #[serde(default = "default_fallback")]
    pub fallback: CapabilityId,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            fallback: default_fallback(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8700".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_max_concurrency() -> usize {
    10
}
fn default_true() -> bool {
    true
}
fn default_assignment_retries() -> u32 {
    1
}
fn default_timeout_buffer_ms() -> u64 {
    30_000
}
fn default_event_capacity() -> usize {
    256
}
fn default_report_archive() -> usize {
    128
}
fn default_fallback() -> CapabilityId {
    CapabilityId::Generalist
}

impl EnsembleConfig {
    /// Read and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> EnsembleResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> EnsembleResult<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| EnsembleError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EnsembleResult<()> {
        if self.engine.max_concurrency == 0 {
            return Err(EnsembleError::Configuration(
                "engine.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(EnsembleError::Configuration(
                "breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.breaker.half_open_max_calls == 0 {
            return Err(EnsembleError::Configuration(
                "breaker.half_open_max_calls must be at least 1".to_string(),
            ));
        }
        if self.breaker.success_threshold > self.breaker.half_open_max_calls {
            return Err(EnsembleError::Configuration(format!(
                "breaker.success_threshold ({}) exceeds half_open_max_calls ({})",
                self.breaker.success_threshold, self.breaker.half_open_max_calls
            )));
        }
        if self.worker.base_url.trim().is_empty() {
            return Err(EnsembleError::Configuration(
                "worker.base_url must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = EnsembleConfig::from_toml_str("").unwrap();
        assert_eq!(config, EnsembleConfig::default());
        assert_eq!(config.engine.max_concurrency, 10);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.router.fallback, CapabilityId::Generalist);
        assert_eq!(config.quality.min_overall, 0.7);
        assert!(config.worker.bearer_token().is_none());
    }

    #[test]
    fn test_partial_sections() {
        let raw = r#"
            [worker]
            base_url = "http://worker:9000"
            api_key = "secret"

            [engine]
            max_concurrency = 4
            dependency_policy = "block"

            [quality]
            min_style = 0.2
        "#;
        let config = EnsembleConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.worker.base_url, "http://worker:9000");
        assert_eq!(config.worker.bearer_token().as_deref(), Some("secret"));
        assert_eq!(config.worker.connect_timeout_ms, 5_000);
        assert_eq!(config.engine.max_concurrency, 4);
        assert_eq!(config.engine.dependency_policy, DependencyFailurePolicy::Block);
        assert!(config.engine.parallel);
        assert_eq!(config.quality.min_style, 0.2);
        assert_eq!(config.quality.min_overall, 0.7);
    }

    #[test]
    fn test_empty_api_key_is_absent() {
        let config = EnsembleConfig::from_toml_str("[worker]\napi_key = \"\"").unwrap();
        assert!(config.worker.bearer_token().is_none());
    }

    #[test]
    fn test_validation_failures() {
        let err = EnsembleConfig::from_toml_str("[engine]\nmax_concurrency = 0").unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");

        let err = EnsembleConfig::from_toml_str("[breaker]\nfailure_threshold = 0").unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");

        // no trial calls would ever be admitted, so an open breaker never recovers
        let raw = "[breaker]\nfailure_threshold = 1\ncooldown_ms = 10\n\
                   half_open_max_calls = 0\nsuccess_threshold = 0";
        let err = EnsembleConfig::from_toml_str(raw).unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
        assert!(err.to_string().contains("half_open_max_calls"));

        let raw = "[breaker]\nhalf_open_max_calls = 2\nsuccess_threshold = 3";
        assert!(EnsembleConfig::from_toml_str(raw).is_err());

        let raw = "[engine]\nmax_concurrency = \"many\"";
        let err = EnsembleConfig::from_toml_str(raw).unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[retry]\nmax_retries = 1\nbackoff_base_ms = 10").unwrap();
        let config = EnsembleConfig::load(file.path()).unwrap();
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.backoff_base_ms, 10);
        assert_eq!(config.retry.backoff_max_ms, 30_000);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EnsembleConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert_eq!(err.code(), "IO_ERROR");
    }
}
