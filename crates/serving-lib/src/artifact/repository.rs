//! On-disk artifact history
//!
//! This module provides:
//! - Checksummed JSON persistence of installed artifacts
//! - Recovery of the newest intact artifact at startup
//! - Pruning of old versions

use super::ModelArtifact;
use crate::error::ArtifactError;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Number of previous versions kept on disk
pub const DEFAULT_VERSIONS_TO_KEEP: usize = 5;

const FILE_PREFIX: &str = "model_v";
const FILE_SUFFIX: &str = ".json";
const CHECKSUM_SUFFIX: &str = ".sha256";

/// Directory of `model_v{N}.json` files with `.sha256` sidecars
#[derive(Debug, Clone)]
pub struct ArtifactRepository {
    dir: PathBuf,
    versions_to_keep: usize,
}

impl ArtifactRepository {
    /// Open (and create if needed) an artifact directory
    pub fn open(dir: impl Into<PathBuf>, versions_to_keep: usize) -> Result<Self, ArtifactError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            versions_to_keep: versions_to_keep.max(1),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn artifact_path(&self, version: u64) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", FILE_PREFIX, version, FILE_SUFFIX))
    }

    /// Persist an artifact and prune old versions
    pub fn save(&self, artifact: &ModelArtifact) -> Result<PathBuf, ArtifactError> {
        let bytes = serde_json::to_vec_pretty(artifact)?;
        let checksum = compute_checksum(&bytes);
        let path = self.artifact_path(artifact.version);

        // Sidecar first: an artifact file is never visible without its checksum
        write_atomically(&checksum_path(&path), checksum.as_bytes())?;
        write_atomically(&path, &bytes)?;

        info!(
            version = artifact.version,
            path = %path.display(),
            checksum = %checksum,
            "Artifact persisted"
        );

        self.prune();
        Ok(path)
    }

    /// Versions present on disk, newest first
    pub fn versions(&self) -> Result<Vec<u64>, ArtifactError> {
        let mut versions: Vec<u64> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| parse_version(&entry.file_name().to_string_lossy()))
            .collect();
        versions.sort_unstable_by(|a, b| b.cmp(a));
        Ok(versions)
    }

    /// Load and verify one version
    pub fn load(&self, version: u64) -> Result<ModelArtifact, ArtifactError> {
        let path = self.artifact_path(version);
        let bytes = fs::read(&path)?;
        let expected = fs::read_to_string(checksum_path(&path))?;
        let actual = compute_checksum(&bytes);
        if expected.trim() != actual {
            return Err(ArtifactError::ChecksumMismatch {
                path: path.display().to_string(),
                expected: expected.trim().to_string(),
                actual,
            });
        }

        let artifact: ModelArtifact = serde_json::from_slice(&bytes)?;
        if artifact.version != version {
            return Err(ArtifactError::Invalid(format!(
                "{} contains version {}",
                path.display(),
                artifact.version
            )));
        }
        artifact.validate().map_err(ArtifactError::Invalid)?;
        Ok(artifact)
    }

    /// Newest artifact that passes checksum and structural validation.
    /// Damaged files are skipped, not deleted.
    pub fn load_latest(&self) -> Result<Option<ModelArtifact>, ArtifactError> {
        for version in self.versions()? {
            match self.load(version) {
                Ok(artifact) => {
                    info!(
                        version,
                        model_type = %artifact.model_type,
                        "Loaded persisted artifact"
                    );
                    return Ok(Some(artifact));
                }
                Err(e) => {
                    warn!(version, error = %e, "Skipping unreadable artifact");
                }
            }
        }
        Ok(None)
    }

    fn prune(&self) {
        let versions = match self.versions() {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Failed to list artifacts for pruning");
                return;
            }
        };

        for version in versions.into_iter().skip(self.versions_to_keep) {
            let path = self.artifact_path(version);
            for file in [checksum_path(&path), path] {
                if let Err(e) = fs::remove_file(&file) {
                    warn!(
                        path = %file.display(),
                        error = %e,
                        "Failed to remove old artifact file"
                    );
                }
            }
            debug!(version, "Pruned old artifact");
        }
    }
}

fn parse_version(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_SUFFIX)?
        .parse()
        .ok()
}

fn checksum_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(CHECKSUM_SUFFIX);
    PathBuf::from(name)
}

/// Write to a temp file, sync, then rename over the target
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Compute SHA256 checksum of data
fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
