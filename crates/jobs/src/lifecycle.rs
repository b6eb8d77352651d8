//! Result lifecycle: download gating, expiry sweeps and terminal deletion.
//!
//! The sweep removes the artifact file before the record. If the file removal
//! fails the record stays and the pair is retried on the next sweep; the
//! opposite order could leak orphaned files with no record pointing at them.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use quillerp_auth::PrincipalId;
use quillerp_core::{DomainError, DomainResult, JobId, TenantId};

use crate::artifact::ArtifactStorage;
use crate::store::JobStore;
use crate::types::{ArtifactRef, Job, JobStatus};

/// Permission to stream one artifact, handed to the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadGrant {
    pub path: PathBuf,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

impl From<&ArtifactRef> for DownloadGrant {
    fn from(a: &ArtifactRef) -> Self {
        Self {
            path: a.path.clone(),
            file_name: a.file_name.clone(),
            mime_type: a.mime_type.clone(),
            size_bytes: a.size_bytes,
        }
    }
}

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired records found.
    pub expired: usize,
    /// Records (and files) actually removed.
    pub removed: usize,
    /// Records left for the next sweep because file removal failed.
    pub skipped: usize,
}

/// Manages completed-job results from completion to removal.
pub struct ResultLifecycleManager {
    store: Arc<dyn JobStore>,
    artifacts: ArtifactStorage,
}

impl ResultLifecycleManager {
    pub fn new(store: Arc<dyn JobStore>, artifacts: ArtifactStorage) -> Self {
        Self { store, artifacts }
    }

    /// Remove every expired result: artifact file first, then the record.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let expired = match self.store.expired(now) {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "expiry scan failed");
                return SweepReport::default();
            }
        };

        let mut report = SweepReport {
            expired: expired.len(),
            ..Default::default()
        };
        for job in expired {
            let artifact = job.output.as_ref().and_then(|o| o.artifact.as_ref());
            if let Some(artifact) = artifact {
                if let Err(e) = self.artifacts.remove(&artifact.path) {
                    warn!(job_id = %job.id, error = %e, "artifact removal failed, record kept for next sweep");
                    report.skipped += 1;
                    continue;
                }
            }
            match self.store.delete(job.tenant_id, job.id) {
                Ok(_) => {
                    debug!(job_id = %job.id, "expired result removed");
                    report.removed += 1;
                }
                // Deleted concurrently; the file is already gone.
                Err(e) => {
                    debug!(job_id = %job.id, error = %e, "expired record already gone");
                    report.removed += 1;
                }
            }
        }

        if report.expired > 0 {
            info!(
                expired = report.expired,
                removed = report.removed,
                skipped = report.skipped,
                "expiry sweep finished"
            );
        }
        report
    }

    /// Gate a download request and count it.
    ///
    /// Jobs owned by another principal read as not found; any status other
    /// than completed is not ready (only completed jobs ever carry an
    /// artifact); completed jobs past their expiry are gone even if the
    /// sweep has not caught up yet.
    pub fn download(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        principal: PrincipalId,
        now: DateTime<Utc>,
    ) -> DomainResult<DownloadGrant> {
        let job = self.store.get_owned(tenant_id, job_id, principal)?;

        if job.status != JobStatus::Completed {
            return Err(DomainError::NotReady);
        }
        if job.expires_at.is_some_and(|e| e <= now) {
            return Err(DomainError::Gone);
        }

        let artifact = job
            .output
            .as_ref()
            .and_then(|o| o.artifact.as_ref())
            .ok_or(DomainError::NotFound)?;
        let grant = DownloadGrant::from(artifact);

        self.store.record_download(job.id)?;
        Ok(grant)
    }

    /// Owner-requested removal of a settled job and its artifact.
    pub fn delete(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        principal: PrincipalId,
    ) -> DomainResult<Job> {
        let job = self.store.get_owned(tenant_id, job_id, principal)?;
        if !job.status.is_terminal() {
            return Err(DomainError::conflict(
                "only finished jobs can be deleted; cancel it first",
            ));
        }

        if let Some(artifact) = job.output.as_ref().and_then(|o| o.artifact.as_ref()) {
            if let Err(e) = self.artifacts.remove(&artifact.path) {
                warn!(job_id = %job.id, error = %e, "artifact removal failed");
                return Err(DomainError::invariant(format!(
                    "artifact removal failed: {e}"
                )));
            }
        }
        Ok(self.store.delete(tenant_id, job.id)?)
    }
}
