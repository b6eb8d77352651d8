//! Artifact storage on the local filesystem.
//!
//! Artifacts live under `<root>/<category>/` and are named
//! `{entity_type}_{job_id}_{timestamp}.{ext}` so a directory listing alone
//! identifies what produced each file.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use quillerp_core::JobId;

use crate::types::{ArtifactRef, JobCategory};

/// Filesystem-backed artifact store.
#[derive(Debug, Clone)]
pub struct ArtifactStorage {
    root: PathBuf,
}

impl ArtifactStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a finished artifact to disk and return its reference.
    pub fn write(
        &self,
        category: JobCategory,
        entity_type: &str,
        job_id: JobId,
        now: DateTime<Utc>,
        extension: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> std::io::Result<ArtifactRef> {
        let dir = self.root.join(category.as_str());
        fs::create_dir_all(&dir)?;

        let file_name = format!(
            "{entity_type}_{job_id}_{}.{extension}",
            now.format("%Y%m%d%H%M%S")
        );
        let path = dir.join(&file_name);
        fs::write(&path, bytes)?;
        debug!(%job_id, path = %path.display(), size = bytes.len(), "artifact written");

        Ok(ArtifactRef {
            path,
            file_name,
            size_bytes: bytes.len() as u64,
            mime_type: mime_type.to_string(),
        })
    }

    /// Remove an artifact file. Missing files are not errors: a crashed sweep
    /// may have removed the file but not the record.
    pub fn remove(&self, path: &Path) -> std::io::Result<()> {
        match fs::remove_file(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
