//! In-memory holder of the active artifact
//!
//! Readers clone an `Arc` under a read lock and score without holding it, so a
//! swap only contends with the pointer copy, never with inference itself.

use super::ModelArtifact;
use crate::error::ArtifactError;
use crate::training::TrainedModel;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

/// Owns the currently installed artifact
#[derive(Debug)]
pub struct ArtifactStore {
    current: RwLock<Arc<ModelArtifact>>,
}

impl ArtifactStore {
    /// Create a store around a bootstrap artifact
    pub fn new(bootstrap: ModelArtifact) -> Result<Self, ArtifactError> {
        bootstrap.validate().map_err(ArtifactError::Invalid)?;
        info!(
            version = bootstrap.version,
            model_type = %bootstrap.model_type,
            "Artifact store initialized"
        );
        Ok(Self {
            current: RwLock::new(Arc::new(bootstrap)),
        })
    }

    /// Latest committed artifact. Never blocks on inference.
    pub fn current(&self) -> Arc<ModelArtifact> {
        // The guarded value is a single pointer, a panicking writer cannot leave it half-written
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn version(&self) -> u64 {
        self.current().version
    }

    /// Replace the artifact, returning the previous one.
    /// The offered version must be strictly newer than the installed one.
    pub fn swap(&self, next: ModelArtifact) -> Result<Arc<ModelArtifact>, ArtifactError> {
        next.validate().map_err(ArtifactError::Invalid)?;
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if next.version <= guard.version {
            return Err(ArtifactError::StaleVersion {
                installed: guard.version,
                offered: next.version,
            });
        }
        let previous = std::mem::replace(&mut *guard, Arc::new(next));
        drop(guard);

        info!(old_version = previous.version, "Artifact swapped");
        Ok(previous)
    }

    /// Install a trained candidate as `current + 1`.
    /// Returns (previous, installed).
    pub fn install(
        &self,
        candidate: TrainedModel,
    ) -> Result<(Arc<ModelArtifact>, Arc<ModelArtifact>), ArtifactError> {
        candidate.validate().map_err(ArtifactError::Invalid)?;
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let next = Arc::new(ModelArtifact::from_candidate(candidate, guard.version + 1));
        let previous = std::mem::replace(&mut *guard, Arc::clone(&next));
        drop(guard);

        info!(
            old_version = previous.version,
            new_version = next.version,
            model_type = %next.model_type,
            "Artifact installed"
        );
        Ok((previous, next))
    }
}
