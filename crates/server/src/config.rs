//! Server configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use serving_lib::{AuditConfig, RetrainConfig, ValidatorConfig};
use std::time::Duration;

/// Environment variable naming an optional configuration file
pub const CONFIG_FILE_ENV: &str = "IRIS_CONFIG";

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Name reported in structured events
    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP port for the prediction API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Directory of persisted model artifacts
    #[serde(default = "default_model_dir")]
    pub model_dir: String,

    /// Train a model at startup when no artifact is stored
    #[serde(default = "default_true")]
    pub bootstrap_train: bool,

    #[serde(default = "default_versions_to_keep")]
    pub versions_to_keep: usize,

    /// Audit database
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Disable to skip the audit trail entirely
    #[serde(default = "default_true")]
    pub log_predictions: bool,

    #[serde(default = "default_audit_queue_capacity")]
    pub audit_queue_capacity: usize,

    #[serde(default = "default_audit_enqueue_timeout_ms")]
    pub audit_enqueue_timeout_ms: u64,

    #[serde(default = "default_audit_max_retries")]
    pub audit_max_retries: u32,

    /// Records kept in memory when the audit database is unavailable
    #[serde(default = "default_audit_memory_capacity")]
    pub audit_memory_capacity: usize,

    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Budget for one retraining job in seconds
    #[serde(default = "default_retrain_timeout_secs")]
    pub retrain_timeout_secs: u64,

    /// Minimum hold-out accuracy for a retrained model
    #[serde(default = "default_min_accuracy")]
    pub min_accuracy: f64,
}

fn default_service_name() -> String {
    "iris-classifier".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8000
}

fn default_model_dir() -> String {
    "artifacts".to_string()
}

fn default_true() -> bool {
    true
}

fn default_versions_to_keep() -> usize {
    serving_lib::artifact::DEFAULT_VERSIONS_TO_KEEP
}

fn default_database_url() -> String {
    "sqlite://logs.db".to_string()
}

fn default_audit_queue_capacity() -> usize {
    1024
}

fn default_audit_enqueue_timeout_ms() -> u64 {
    50
}

fn default_audit_max_retries() -> u32 {
    3
}

fn default_audit_memory_capacity() -> usize {
    serving_lib::audit::DEFAULT_MEMORY_CAPACITY
}

fn default_max_batch_size() -> usize {
    serving_lib::validation::DEFAULT_MAX_BATCH_SIZE
}

fn default_retrain_timeout_secs() -> u64 {
    300
}

fn default_min_accuracy() -> f64 {
    0.8
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            bind_address: default_bind_address(),
            api_port: default_api_port(),
            model_dir: default_model_dir(),
            bootstrap_train: true,
            versions_to_keep: default_versions_to_keep(),
            database_url: default_database_url(),
            log_predictions: true,
            audit_queue_capacity: default_audit_queue_capacity(),
            audit_enqueue_timeout_ms: default_audit_enqueue_timeout_ms(),
            audit_max_retries: default_audit_max_retries(),
            audit_memory_capacity: default_audit_memory_capacity(),
            max_batch_size: default_max_batch_size(),
            retrain_timeout_secs: default_retrain_timeout_secs(),
            min_accuracy: default_min_accuracy(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the optional file named by `IRIS_CONFIG`,
    /// then `IRIS_*` environment variables
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(config::File::with_name(&path).required(true));
        }
        let config = builder
            .add_source(config::Environment::with_prefix("IRIS").try_parsing(true))
            .build()
            .context("failed to read configuration")?;

        config
            .try_deserialize()
            .context("invalid configuration")
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.api_port)
    }

    pub fn audit_config(&self) -> AuditConfig {
        AuditConfig {
            enabled: self.log_predictions,
            queue_capacity: self.audit_queue_capacity,
            enqueue_timeout: Duration::from_millis(self.audit_enqueue_timeout_ms),
            max_retries: self.audit_max_retries,
            ..AuditConfig::default()
        }
    }

    pub fn retrain_config(&self) -> RetrainConfig {
        RetrainConfig {
            timeout: Duration::from_secs(self.retrain_timeout_secs),
            min_accuracy: self.min_accuracy,
        }
    }

    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            max_batch_size: self.max_batch_size,
            ..ValidatorConfig::default()
        }
    }
}
