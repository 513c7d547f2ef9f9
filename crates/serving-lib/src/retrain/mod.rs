//! Live retraining
//!
//! This module provides:
//! - A single-flight coordinator that runs the training collaborator off the
//!   request path and hands the result back over a oneshot channel
//! - Candidate validation and installation as `current + 1`
//! - A status feed (`Idle -> Running -> Succeeded|Failed -> Idle`) for polling clients

mod bootstrap;

pub use bootstrap::bootstrap_artifact;

use crate::artifact::{ArtifactRepository, ArtifactStore, ModelArtifact};
use crate::error::{ConflictError, FailureReason, RetrainFailure};
use crate::health::{components, HealthRegistry};
use crate::observability::{RetrainEvent, ServingMetrics, StructuredLogger};
use crate::training::{TrainedModel, Trainer};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

/// Configuration for retraining jobs
#[derive(Debug, Clone)]
pub struct RetrainConfig {
    /// Budget for one training run
    pub timeout: Duration,
    /// Minimum hold-out accuracy a candidate needs to be installed
    pub min_accuracy: f64,
}

impl Default for RetrainConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            min_accuracy: 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrainState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// How a finished job ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded {
        old_version: u64,
        new_version: u64,
        model_type: String,
        accuracy: Option<f64>,
        f1_score: Option<f64>,
    },
    Failed {
        reason: FailureReason,
        message: String,
    },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded { .. })
    }
}

/// Record of one completed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: JobOutcome,
}

/// Handle returned to the caller that started a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrainTicket {
    pub job_id: u64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainStatus {
    pub state: RetrainState,
    /// Installed artifact version
    pub model_version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_job: Option<RetrainTicket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_job: Option<JobReport>,
    pub jobs_completed: u64,
}

/// Single-flight retraining orchestrator
pub struct RetrainingCoordinator {
    store: Arc<ArtifactStore>,
    trainer: Arc<dyn Trainer>,
    repository: Option<ArtifactRepository>,
    health: Option<HealthRegistry>,
    config: RetrainConfig,
    metrics: ServingMetrics,
    logger: StructuredLogger,
    next_job_id: AtomicU64,
    /// Single source of truth for job state; updates are check-and-set under its lock
    status: watch::Sender<RetrainStatus>,
}

impl std::fmt::Debug for RetrainingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrainingCoordinator")
            .field("config", &self.config)
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

impl RetrainingCoordinator {
    pub fn new(
        store: Arc<ArtifactStore>,
        trainer: Arc<dyn Trainer>,
        config: RetrainConfig,
        metrics: ServingMetrics,
        logger: StructuredLogger,
    ) -> Self {
        let (status, _) = watch::channel(RetrainStatus {
            state: RetrainState::Idle,
            model_version: store.version(),
            current_job: None,
            last_job: None,
            jobs_completed: 0,
        });
        Self {
            store,
            trainer,
            repository: None,
            health: None,
            config,
            metrics,
            logger,
            next_job_id: AtomicU64::new(1),
            status,
        }
    }

    /// Persist every installed artifact to this repository
    pub fn with_repository(mut self, repository: ArtifactRepository) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Report job failures on the `retrainer` health component
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Start a job unless one is already running
    pub fn trigger(self: &Arc<Self>) -> Result<RetrainTicket, ConflictError> {
        let mut ticket = None;
        let mut running = None;
        self.status.send_if_modified(|status| {
            if let Some(job) = status.current_job {
                running = Some(job.job_id);
                return false;
            }
            let job = RetrainTicket {
                job_id: self.next_job_id.fetch_add(1, Ordering::Relaxed),
                started_at: Utc::now(),
            };
            status.state = RetrainState::Running;
            status.current_job = Some(job);
            ticket = Some(job);
            true
        });

        let ticket = match (ticket, running) {
            (Some(ticket), _) => ticket,
            (None, running_job_id) => {
                let running_job_id = running_job_id.unwrap_or_default();
                self.metrics.inc_retrain(RetrainEvent::Rejected);
                warn!(running_job_id, "Retrain rejected, a job is already running");
                return Err(ConflictError { running_job_id });
            }
        };

        self.metrics.inc_retrain(RetrainEvent::Started);
        self.logger
            .log_retrain_started(ticket.job_id, self.store.version());

        let coordinator = Arc::clone(self);
        tokio::spawn(async move { coordinator.run_job(ticket).await });
        Ok(ticket)
    }

    pub fn status(&self) -> RetrainStatus {
        let mut status = self.status.borrow().clone();
        status.model_version = self.store.version();
        status
    }

    pub fn subscribe(&self) -> watch::Receiver<RetrainStatus> {
        self.status.subscribe()
    }

    /// Wait until the given job has finished and return its report
    pub async fn wait_for_job(&self, job_id: u64) -> Option<JobReport> {
        let mut receiver = self.subscribe();
        let status = receiver
            .wait_for(|s| s.last_job.as_ref().is_some_and(|job| job.job_id >= job_id))
            .await
            .ok()?;
        status.last_job.clone()
    }

    async fn run_job(&self, ticket: RetrainTicket) {
        let outcome = match self.execute().await {
            Ok((previous, installed)) => {
                self.persist(&installed).await;
                self.metrics.inc_retrain(RetrainEvent::Succeeded);
                self.metrics.set_model_version(installed.version);
                self.logger.log_model_update(
                    ticket.job_id,
                    previous.version,
                    installed.version,
                    &installed.model_type,
                    installed.accuracy,
                );
                if let Some(health) = &self.health {
                    health.set_healthy(components::RETRAINER).await;
                }
                JobOutcome::Succeeded {
                    old_version: previous.version,
                    new_version: installed.version,
                    model_type: installed.model_type.clone(),
                    accuracy: installed.accuracy,
                    f1_score: installed.f1_score,
                }
            }
            Err(failure) => {
                self.metrics.record_retrain_failure(failure.reason);
                self.logger
                    .log_model_update_failed(ticket.job_id, self.store.version(), &failure);
                if let Some(health) = &self.health {
                    health
                        .set_degraded(
                            components::RETRAINER,
                            format!("last retraining failed: {}", failure),
                        )
                        .await;
                }
                JobOutcome::Failed {
                    reason: failure.reason,
                    message: failure.message,
                }
            }
        };

        let terminal = if outcome.is_success() {
            RetrainState::Succeeded
        } else {
            RetrainState::Failed
        };
        let report = JobReport {
            job_id: ticket.job_id,
            started_at: ticket.started_at,
            finished_at: Utc::now(),
            outcome,
        };
        let model_version = self.store.version();

        self.status.send_modify(|status| {
            status.state = terminal;
            status.model_version = model_version;
            status.current_job = None;
            status.last_job = Some(report);
            status.jobs_completed += 1;
        });
        // Back to Idle unless a new job already claimed the slot
        self.status.send_if_modified(|status| {
            if status.current_job.is_none() {
                status.state = RetrainState::Idle;
                true
            } else {
                false
            }
        });
        debug!(job_id = ticket.job_id, "Retraining job finished");
    }

    /// Train, validate and install. The previous artifact stays installed on any error.
    async fn execute(&self) -> Result<(Arc<ModelArtifact>, Arc<ModelArtifact>), RetrainFailure> {
        let (result_tx, result_rx) = oneshot::channel();
        let trainer = Arc::clone(&self.trainer);
        let task = tokio::spawn(async move {
            let _ = result_tx.send(trainer.train().await);
        });

        let candidate = match tokio::time::timeout(self.config.timeout, result_rx).await {
            Err(_) => {
                task.abort();
                return Err(RetrainFailure::new(
                    FailureReason::Timeout,
                    format!(
                        "training did not finish within {}s",
                        self.config.timeout.as_secs_f64()
                    ),
                ));
            }
            Ok(Err(_)) => {
                return Err(RetrainFailure::new(
                    FailureReason::TrainerPanicked,
                    "training task ended without producing a result",
                ))
            }
            Ok(Ok(Err(e))) => {
                return Err(RetrainFailure::new(
                    FailureReason::TrainerError,
                    format!("{:#}", e),
                ))
            }
            Ok(Ok(Ok(candidate))) => candidate,
        };

        self.check_candidate(&candidate)?;
        self.store
            .install(candidate)
            .map_err(|e| RetrainFailure::new(FailureReason::InvalidArtifact, e.to_string()))
    }

    fn check_candidate(&self, candidate: &TrainedModel) -> Result<(), RetrainFailure> {
        candidate
            .validate()
            .map_err(|e| RetrainFailure::new(FailureReason::InvalidArtifact, e))?;
        if !(candidate.accuracy >= self.config.min_accuracy) {
            return Err(RetrainFailure::new(
                FailureReason::InvalidArtifact,
                format!(
                    "hold-out accuracy {:.3} is below the {:.3} threshold",
                    candidate.accuracy, self.config.min_accuracy
                ),
            ));
        }
        Ok(())
    }

    /// Best-effort: the new artifact is already serving. The outcome is
    /// reported on the `artifact_store` health component.
    async fn persist(&self, artifact: &Arc<ModelArtifact>) {
        let Some(repository) = self.repository.clone() else {
            return;
        };
        let artifact = Arc::clone(artifact);
        let version = artifact.version;
        let failure = match tokio::task::spawn_blocking(move || repository.save(&artifact)).await {
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                warn!(version, error = %e, "Failed to persist retrained artifact");
                Some(e.to_string())
            }
            Err(e) => {
                warn!(version, error = %e, "Artifact persistence task failed");
                Some(e.to_string())
            }
        };

        if let Some(health) = &self.health {
            match failure {
                None => health.set_healthy(components::ARTIFACT_STORE).await,
                Some(message) => {
                    health
                        .set_degraded(
                            components::ARTIFACT_STORE,
                            format!("model v{} is serving but not persisted: {}", version, message),
                        )
                        .await
                }
            }
        }
    }
}
