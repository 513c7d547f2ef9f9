//! Process bootstrap: wires the serving components together

use crate::api::AppState;
use crate::config::ServerConfig;
use anyhow::{Context, Result};
use serving_lib::{
    audit::{MemoryAuditStore, SqliteAuditStore},
    health::components,
    retrain::bootstrap_artifact,
    ArtifactRepository, ArtifactStore, AuditLogger, AuditStore, FeatureValidator, HealthRegistry,
    IrisTrainer, PredictionEngine, PredictionService, RetrainingCoordinator, ServingMetrics,
    StructuredLogger,
};
use std::sync::Arc;
use tracing::warn;

/// Build the shared state. Fails only when no model artifact can be obtained.
pub async fn build_state(config: &ServerConfig) -> Result<AppState> {
    let metrics = ServingMetrics::new().context("failed to register metrics")?;
    let logger = StructuredLogger::new(&config.service_name);

    let health_registry = HealthRegistry::new();
    health_registry.register(components::ARTIFACT_STORE).await;
    health_registry.register(components::AUDIT_LOG).await;
    health_registry.register(components::RETRAINER).await;

    let repository = ArtifactRepository::open(&config.model_dir, config.versions_to_keep)
        .with_context(|| format!("failed to open model directory {}", config.model_dir))?;
    let trainer = Arc::new(IrisTrainer::new());
    let artifact = bootstrap_artifact(&repository, trainer.as_ref(), config.bootstrap_train)
        .await
        .context("no model artifact available")?;
    let store = Arc::new(ArtifactStore::new(artifact).context("bootstrap artifact rejected")?);
    metrics.set_model_version(store.version());

    let (audit_store, audit_fallback): (Arc<dyn AuditStore>, bool) =
        match SqliteAuditStore::connect(&config.database_url).await {
            Ok(store) => (Arc::new(store), false),
            Err(e) => {
                warn!(
                    database_url = %config.database_url,
                    error = %e,
                    "Audit database unavailable, keeping audit records in memory"
                );
                health_registry
                    .set_degraded(
                        components::AUDIT_LOG,
                        format!("database unavailable, in-memory fallback: {}", e),
                    )
                    .await;
                (
                    Arc::new(MemoryAuditStore::with_capacity(config.audit_memory_capacity)),
                    true,
                )
            }
        };
    let audit = Arc::new(AuditLogger::spawn(
        audit_store,
        config.audit_config(),
        metrics.clone(),
        logger.clone(),
    ));

    let engine = Arc::new(PredictionEngine::new(Arc::clone(&store)));
    let service = Arc::new(PredictionService::new(
        FeatureValidator::new(config.validator_config()),
        engine,
        audit,
        metrics.clone(),
        logger.clone(),
    ));

    let coordinator = Arc::new(
        RetrainingCoordinator::new(
            Arc::clone(&store),
            trainer,
            config.retrain_config(),
            metrics.clone(),
            logger.clone(),
        )
        .with_repository(repository)
        .with_health(health_registry.clone()),
    );

    health_registry.set_ready(true).await;

    Ok(AppState {
        service,
        store,
        coordinator,
        health_registry,
        metrics,
        logger,
        service_name: config.service_name.clone(),
        audit_fallback,
    })
}
