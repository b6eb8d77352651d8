//! Job record storage.
//!
//! The store is the single source of truth for job state. Status writes are
//! conditional on the expected prior state (compare-and-set), because
//! last-writer-wins is not acceptable for status/progress under concurrent
//! workers.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use quillerp_auth::PrincipalId;
use quillerp_core::{JobId, Page, Pagination, TenantId};

use crate::transition;
use crate::types::{
    DateRange, Job, JobCategory, JobOutput, JobStatus, OutputFormat, RecordCounts,
};

/// Job store abstraction.
///
/// Tenant/owner-scoped methods serve the gateway; id-only mutators are the
/// processor's internal write path.
pub trait JobStore: Send + Sync {
    /// Persist a freshly created (pending) job.
    fn create(&self, job: Job) -> Result<Job, StoreError>;

    /// Get a job by id within a tenant.
    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, StoreError>;

    /// Get a job by id, scoped to its owner.
    ///
    /// A job owned by another principal reads as `NotFound` so existence is
    /// not leaked across ownership boundaries.
    fn get_owned(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        owner: PrincipalId,
    ) -> Result<Job, StoreError>;

    /// List jobs ordered by creation time descending.
    fn list(
        &self,
        tenant_id: TenantId,
        filter: &JobListFilter,
        pagination: Pagination,
    ) -> Result<Page<Job>, StoreError>;

    /// Conditionally transition a job's status.
    ///
    /// Fails with `Conflict` when the current status is not in `expected` or
    /// the transition is illegal per the state machine.
    fn transition(
        &self,
        job_id: JobId,
        expected: &[JobStatus],
        to: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<Job, StoreError>;

    /// Write a progress update; regressions are ignored, values clamp to 100.
    fn update_progress(
        &self,
        job_id: JobId,
        progress: u8,
        counts: RecordCounts,
    ) -> Result<Job, StoreError>;

    /// Finish a job as completed: sets progress=100, the completion timestamp
    /// and the expiry (`now + retention`).
    fn complete(
        &self,
        job_id: JobId,
        output: JobOutput,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<Job, StoreError>;

    /// Finish a bulk job as partially completed (mixed per-record outcome).
    fn complete_partial(
        &self,
        job_id: JobId,
        output: JobOutput,
        now: DateTime<Utc>,
    ) -> Result<Job, StoreError>;

    /// Finish a job as failed with an error message. Leaves no artifact.
    fn fail(&self, job_id: JobId, error: String, now: DateTime<Utc>) -> Result<Job, StoreError>;

    /// Increment the download counter (monotonic, never reset).
    fn record_download(&self, job_id: JobId) -> Result<Job, StoreError>;

    /// Remove a job record, returning it so callers can clean up artifacts.
    fn delete(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, StoreError>;

    /// Completed jobs whose expiry has passed, across all tenants (sweep).
    fn expired(&self, now: DateTime<Utc>) -> Result<Vec<Job>, StoreError>;

    /// Per-status counts for the stats endpoints, tenant-wide or scoped to
    /// one category.
    fn stats(
        &self,
        tenant_id: TenantId,
        category: Option<JobCategory>,
    ) -> Result<JobStats, StoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("rejected transition for job {job_id}: {reason}")]
    Conflict { job_id: JobId, reason: String },

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for quillerp_core::DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => Self::NotFound,
            StoreError::Conflict { reason, .. } => Self::Conflict(reason),
            StoreError::Storage(msg) => Self::InvariantViolation(msg),
        }
    }
}

/// Listing filters, all optional and AND-combined.
#[derive(Debug, Clone, Default)]
pub struct JobListFilter {
    pub owner: Option<PrincipalId>,
    pub category: Option<JobCategory>,
    pub status: Option<JobStatus>,
    pub format: Option<OutputFormat>,
    pub created: DateRange,
}

/// Aggregate usage counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub partially_completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub total_downloads: u64,
}

/// In-memory job store (the shipped backend; the trait is the seam for a
/// durable one).
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutate<F>(&self, job_id: JobId, f: F) -> Result<Job, StoreError>
    where
        F: FnOnce(&mut Job) -> Result<(), StoreError>,
    {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let job = jobs.get_mut(&job_id).ok_or(StoreError::NotFound(job_id))?;
        f(job)?;
        Ok(job.clone())
    }

    fn checked_transition(
        job: &mut Job,
        job_id: JobId,
        expected: &[JobStatus],
        to: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if !expected.contains(&job.status) {
            return Err(StoreError::Conflict {
                job_id,
                reason: format!("expected one of {expected:?}, was {}", job.status),
            });
        }
        transition::check(job.status, to).map_err(|e| StoreError::Conflict {
            job_id,
            reason: e.to_string(),
        })?;

        job.status = to;
        match to {
            JobStatus::Processing => job.started_at = Some(now),
            JobStatus::Completed
            | JobStatus::PartiallyCompleted
            | JobStatus::Failed
            | JobStatus::Cancelled => job.completed_at = Some(now),
            JobStatus::Pending => {}
        }
        Ok(())
    }
}

impl JobStore for InMemoryJobStore {
    fn create(&self, job: Job) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Storage(format!("duplicate job id {}", job.id)));
        }
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, StoreError> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        match jobs.get(&job_id) {
            Some(job) if job.tenant_id == tenant_id => Ok(job.clone()),
            _ => Err(StoreError::NotFound(job_id)),
        }
    }

    fn get_owned(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        owner: PrincipalId,
    ) -> Result<Job, StoreError> {
        let job = self.get(tenant_id, job_id)?;
        if job.owner != owner {
            return Err(StoreError::NotFound(job_id));
        }
        Ok(job)
    }

    fn list(
        &self,
        tenant_id: TenantId,
        filter: &JobListFilter,
        pagination: Pagination,
    ) -> Result<Page<Job>, StoreError> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        let mut matching: Vec<Job> = jobs
            .values()
            .filter(|j| j.tenant_id == tenant_id)
            .filter(|j| filter.owner.is_none_or(|o| j.owner == o))
            .filter(|j| filter.category.is_none_or(|c| j.category == c))
            .filter(|j| filter.status.is_none_or(|s| j.status == s))
            .filter(|j| filter.format.is_none_or(|f| j.params.format() == Some(f)))
            .filter(|j| filter.created.contains(j.created_at))
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::slice(matching, pagination))
    }

    fn transition(
        &self,
        job_id: JobId,
        expected: &[JobStatus],
        to: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<Job, StoreError> {
        self.mutate(job_id, |job| {
            Self::checked_transition(job, job_id, expected, to, now)?;
            debug!(job_id = %job_id, status = %to, "job transitioned");
            Ok(())
        })
    }

    fn update_progress(
        &self,
        job_id: JobId,
        progress: u8,
        counts: RecordCounts,
    ) -> Result<Job, StoreError> {
        self.mutate(job_id, |job| {
            // Terminal records keep their final progress.
            if job.status.is_terminal() {
                return Ok(());
            }
            job.progress = transition::merge_progress(job.progress, progress.min(99));
            job.counts = counts;
            Ok(())
        })
    }

    fn complete(
        &self,
        job_id: JobId,
        output: JobOutput,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<Job, StoreError> {
        self.mutate(job_id, |job| {
            Self::checked_transition(
                job,
                job_id,
                &[JobStatus::Processing],
                JobStatus::Completed,
                now,
            )?;
            job.progress = 100;
            job.output = Some(output);
            job.error = None;
            job.expires_at = Some(now + retention);
            Ok(())
        })
    }

    fn complete_partial(
        &self,
        job_id: JobId,
        output: JobOutput,
        now: DateTime<Utc>,
    ) -> Result<Job, StoreError> {
        self.mutate(job_id, |job| {
            Self::checked_transition(
                job,
                job_id,
                &[JobStatus::Processing],
                JobStatus::PartiallyCompleted,
                now,
            )?;
            // progress=100 is reserved for fully completed jobs.
            job.progress = transition::merge_progress(job.progress, 99);
            job.output = Some(output);
            Ok(())
        })
    }

    fn fail(&self, job_id: JobId, error: String, now: DateTime<Utc>) -> Result<Job, StoreError> {
        self.mutate(job_id, |job| {
            Self::checked_transition(
                job,
                job_id,
                &[JobStatus::Pending, JobStatus::Processing],
                JobStatus::Failed,
                now,
            )?;
            job.error = Some(error);
            job.output = None;
            Ok(())
        })
    }

    fn record_download(&self, job_id: JobId) -> Result<Job, StoreError> {
        self.mutate(job_id, |job| {
            job.download_count += 1;
            Ok(())
        })
    }

    fn delete(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        match jobs.get(&job_id) {
            Some(job) if job.tenant_id == tenant_id => {}
            _ => return Err(StoreError::NotFound(job_id)),
        }
        jobs.remove(&job_id).ok_or(StoreError::NotFound(job_id))
    }

    fn expired(&self, now: DateTime<Utc>) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        Ok(jobs
            .values()
            .filter(|j| j.status == JobStatus::Completed)
            .filter(|j| j.expires_at.is_some_and(|e| e <= now))
            .cloned()
            .collect())
    }

    fn stats(
        &self,
        tenant_id: TenantId,
        category: Option<JobCategory>,
    ) -> Result<JobStats, StoreError> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        let mut stats = JobStats::default();
        for job in jobs
            .values()
            .filter(|j| j.tenant_id == tenant_id)
            .filter(|j| category.is_none_or(|c| j.category == c))
        {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::PartiallyCompleted => stats.partially_completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
            stats.total_downloads += job.download_count as u64;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExportParams, FilterCriteria, JobParams};

    fn export_job(tenant: TenantId, owner: PrincipalId) -> Job {
        Job::new(
            tenant,
            owner,
            JobParams::Export(ExportParams {
                entity_type: "invoice".to_string(),
                format: OutputFormat::Csv,
                entity_ids: None,
                filters: FilterCriteria::default(),
                columns: vec![],
                template: None,
                options: serde_json::Value::Null,
            }),
        )
    }

    #[test]
    fn conditional_transition_rejects_unexpected_state() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();
        let job = store.create(export_job(tenant, PrincipalId::new())).unwrap();
        let now = Utc::now();

        store
            .transition(job.id, &[JobStatus::Pending], JobStatus::Processing, now)
            .unwrap();

        // Second claim attempt must conflict.
        let err = store
            .transition(job.id, &[JobStatus::Pending], JobStatus::Processing, now)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[test]
    fn complete_sets_progress_expiry_and_output() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();
        let job = store.create(export_job(tenant, PrincipalId::new())).unwrap();
        let now = Utc::now();

        store
            .transition(job.id, &[JobStatus::Pending], JobStatus::Processing, now)
            .unwrap();
        let done = store
            .complete(job.id, JobOutput::default(), now, Duration::hours(24))
            .unwrap();

        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(done.completed_at, Some(now));
        assert_eq!(done.expires_at, Some(now + Duration::hours(24)));
        assert!(done.output.is_some());
    }

    #[test]
    fn complete_from_pending_is_rejected() {
        let store = InMemoryJobStore::new();
        let job = store
            .create(export_job(TenantId::new(), PrincipalId::new()))
            .unwrap();
        let err = store
            .complete(job.id, JobOutput::default(), Utc::now(), Duration::hours(24))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[test]
    fn progress_writes_are_monotone_and_capped_below_completion() {
        let store = InMemoryJobStore::new();
        let job = store
            .create(export_job(TenantId::new(), PrincipalId::new()))
            .unwrap();
        let now = Utc::now();
        store
            .transition(job.id, &[JobStatus::Pending], JobStatus::Processing, now)
            .unwrap();

        let j = store
            .update_progress(job.id, 40, RecordCounts::default())
            .unwrap();
        assert_eq!(j.progress, 40);

        // Late lower write is ignored.
        let j = store
            .update_progress(job.id, 10, RecordCounts::default())
            .unwrap();
        assert_eq!(j.progress, 40);

        // 100 is reserved for completion.
        let j = store
            .update_progress(job.id, 100, RecordCounts::default())
            .unwrap();
        assert_eq!(j.progress, 99);
    }

    #[test]
    fn owner_scoping_reads_as_not_found() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();
        let owner = PrincipalId::new();
        let job = store.create(export_job(tenant, owner)).unwrap();

        assert!(store.get_owned(tenant, job.id, owner).is_ok());
        assert!(matches!(
            store.get_owned(tenant, job.id, PrincipalId::new()),
            Err(StoreError::NotFound(_))
        ));
        // Wrong tenant too.
        assert!(matches!(
            store.get(TenantId::new(), job.id),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn expired_returns_only_completed_past_expiry() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();
        let now = Utc::now();

        let fresh = store.create(export_job(tenant, PrincipalId::new())).unwrap();
        store
            .transition(fresh.id, &[JobStatus::Pending], JobStatus::Processing, now)
            .unwrap();
        store
            .complete(fresh.id, JobOutput::default(), now, Duration::hours(24))
            .unwrap();

        let stale = store.create(export_job(tenant, PrincipalId::new())).unwrap();
        store
            .transition(stale.id, &[JobStatus::Pending], JobStatus::Processing, now)
            .unwrap();
        store
            .complete(stale.id, JobOutput::default(), now - Duration::hours(25), Duration::hours(24))
            .unwrap();

        let pending = store.create(export_job(tenant, PrincipalId::new())).unwrap();

        let expired = store.expired(now).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, stale.id);
        assert_ne!(expired[0].id, fresh.id);
        assert_ne!(expired[0].id, pending.id);
    }

    #[test]
    fn list_filters_and_orders_descending() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();
        let owner = PrincipalId::new();
        for _ in 0..3 {
            store.create(export_job(tenant, owner)).unwrap();
        }
        store.create(export_job(tenant, PrincipalId::new())).unwrap();

        let page = store
            .list(
                tenant,
                &JobListFilter {
                    owner: Some(owner),
                    ..Default::default()
                },
                Pagination::default(),
            )
            .unwrap();
        assert_eq!(page.total, 3);
        for pair in page.items.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
        }
    }

    #[test]
    fn stats_counts_by_status_and_downloads() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();
        let now = Utc::now();

        let a = store.create(export_job(tenant, PrincipalId::new())).unwrap();
        store
            .transition(a.id, &[JobStatus::Pending], JobStatus::Processing, now)
            .unwrap();
        store
            .complete(a.id, JobOutput::default(), now, Duration::hours(24))
            .unwrap();
        store.record_download(a.id).unwrap();
        store.record_download(a.id).unwrap();

        store.create(export_job(tenant, PrincipalId::new())).unwrap();

        let stats = store.stats(tenant, None).unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.total_downloads, 2);

        let scoped = store.stats(tenant, Some(JobCategory::Export)).unwrap();
        assert_eq!(scoped.completed, 1);
        let other = store.stats(tenant, Some(JobCategory::Print)).unwrap();
        assert_eq!(other, JobStats::default());
    }
}
