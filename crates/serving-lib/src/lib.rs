//! Serving library for the iris species classifier
//!
//! This crate provides the core functionality for:
//! - Holding the active model artifact with atomic hot-swap
//! - Validating incoming feature vectors
//! - Single and batch prediction
//! - Best-effort audit logging of every prediction
//! - Prometheus metrics and structured event logging
//! - Single-flight live retraining

pub mod artifact;
pub mod audit;
pub mod engine;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod retrain;
pub mod service;
pub mod training;
pub mod validation;

pub use artifact::{ArtifactRepository, ArtifactStore, ModelArtifact};
pub use audit::{AuditConfig, AuditFilter, AuditLogger, AuditRecord, AuditStore};
pub use engine::PredictionEngine;
pub use error::{
    ArtifactError, AuditError, ConflictError, InferenceError, RetrainFailure, ServingError,
    ValidationError,
};
pub use health::{ComponentHealth, ComponentStatus, HealthRegistry, HealthReport};
pub use models::*;
pub use observability::{MetricsSnapshot, ServingMetrics, StructuredLogger};
pub use retrain::{RetrainConfig, RetrainStatus, RetrainingCoordinator};
pub use service::PredictionService;
pub use training::{IrisTrainer, Trainer};
pub use validation::{FeatureValidator, RawFeatures, ValidatorConfig};
