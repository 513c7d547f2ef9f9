use crate::artifact::{ArtifactRepository, ModelArtifact};
use crate::training::Trainer;
use anyhow::{bail, Context, Result};
use tracing::{info, warn};

/// Artifact to serve at startup.
///
/// Loads the newest intact artifact from the repository. When none exists and
/// `allow_train` is set, trains one, stamps it version 1 and saves it.
pub async fn bootstrap_artifact(
    repository: &ArtifactRepository,
    trainer: &dyn Trainer,
    allow_train: bool,
) -> Result<ModelArtifact> {
    let loaded = {
        let repository = repository.clone();
        tokio::task::spawn_blocking(move || repository.load_latest())
            .await
            .context("artifact loading task failed")?
    };

    match loaded {
        Ok(Some(artifact)) => {
            info!(
                version = artifact.version,
                model_type = %artifact.model_type,
                "Loaded bootstrap artifact"
            );
            return Ok(artifact);
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Artifact directory unreadable"),
    }

    if !allow_train {
        bail!(
            "no model artifact found in {} and bootstrap training is disabled",
            repository.dir().display()
        );
    }

    info!("No stored artifact, training bootstrap model");
    let candidate = trainer.train().await.context("bootstrap training failed")?;
    let artifact = ModelArtifact::from_candidate(candidate, 1);
    artifact
        .validate()
        .map_err(anyhow::Error::msg)
        .context("bootstrap model is invalid")?;

    let saved = artifact.clone();
    let repository = repository.clone();
    match tokio::task::spawn_blocking(move || repository.save(&saved)).await {
        Ok(Ok(path)) => info!(path = %path.display(), "Bootstrap artifact saved"),
        Ok(Err(e)) => warn!(error = %e, "Failed to persist bootstrap artifact"),
        Err(e) => warn!(error = %e, "Artifact persistence task failed"),
    }
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::fixtures::{centroid_artifact, centroid_candidate};
    use crate::training::TrainedModel;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingTrainer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Trainer for CountingTrainer {
        async fn train(&self) -> Result<TrainedModel> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(centroid_candidate())
        }
    }

    #[tokio::test]
    async fn test_prefers_stored_artifact() {
        let dir = TempDir::new().unwrap();
        let repository = ArtifactRepository::open(dir.path(), 5).unwrap();
        repository.save(&centroid_artifact(4)).unwrap();
        let trainer = CountingTrainer::default();

        let artifact = bootstrap_artifact(&repository, &trainer, true).await.unwrap();
        assert_eq!(artifact.version, 4);
        assert_eq!(trainer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_trains_and_saves_version_one() {
        let dir = TempDir::new().unwrap();
        let repository = ArtifactRepository::open(dir.path(), 5).unwrap();
        let trainer = CountingTrainer::default();

        let artifact = bootstrap_artifact(&repository, &trainer, true).await.unwrap();
        assert_eq!(artifact.version, 1);
        assert_eq!(artifact.accuracy, Some(0.95));
        assert_eq!(trainer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(repository.versions().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_empty_repository_without_training_fails() {
        let dir = TempDir::new().unwrap();
        let repository = ArtifactRepository::open(dir.path(), 5).unwrap();
        let trainer = CountingTrainer::default();

        let err = bootstrap_artifact(&repository, &trainer, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bootstrap training is disabled"));
    }
}
