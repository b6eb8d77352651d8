//! Job processor: claims queued work, runs the category worker and settles
//! the job record.
//!
//! The claim is the store transition pending -> processing. The queue decides
//! *which* job a worker sees; the store decides *whether* the worker may run
//! it, so a job cancelled between enqueue and dequeue dies at the claim.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use quillerp_core::JobId;

use crate::artifact::ArtifactStorage;
use crate::queue::{JobQueue, NackOutcome};
use crate::render::Renderer;
use crate::repository::EntityRepository;
use crate::store::{JobStore, StoreError};
use crate::template::TemplateStore;
use crate::types::{Job, JobCategory, JobOutput, JobParams, JobStatus, RecordCounts};
use crate::{bulk, export, print};

/// Worker-level failure classification. Transient errors consume a delivery
/// attempt and may retry; unrecoverable errors fail the job immediately.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("{0}")]
    Transient(String),

    #[error("{0}")]
    Unrecoverable(String),
}

/// Successful worker outcome.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(JobOutput),
    /// Bulk only: some records succeeded, some failed.
    PartiallyCompleted(JobOutput),
}

/// Everything a worker needs, passed explicitly from the composition root.
#[derive(Clone)]
pub struct ProcessorContext {
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<JobQueue>,
    pub repository: Arc<dyn EntityRepository>,
    pub renderer: Arc<dyn Renderer>,
    pub templates: Arc<TemplateStore>,
    pub artifacts: ArtifactStorage,
    /// Result retention window applied at completion.
    pub retention: Duration,
}

impl ProcessorContext {
    /// Best-effort progress write. Failures (job cancelled or deleted
    /// mid-run) only mean nobody is watching the progress anymore.
    pub(crate) fn progress(&self, job_id: JobId, progress: u8, counts: RecordCounts) {
        if let Err(e) = self.store.update_progress(job_id, progress, counts) {
            debug!(%job_id, error = %e, "progress update dropped");
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Idle poll interval of the worker loop.
    pub poll_interval: StdDuration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            poll_interval: StdDuration::from_millis(250),
        }
    }
}

/// How one delivery was settled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProcessResult {
    Completed,
    PartiallyCompleted,
    /// Transient failure, re-queued with backoff.
    Retried,
    Failed,
    /// Delivery dropped (job cancelled or already settled).
    Skipped,
}

/// Cumulative worker-loop counters.
#[derive(Debug, Default)]
pub struct ProcessorStats {
    pub completed: AtomicU64,
    pub partially_completed: AtomicU64,
    pub retried: AtomicU64,
    pub failed: AtomicU64,
    pub skipped: AtomicU64,
}

impl ProcessorStats {
    fn record(&self, result: ProcessResult) {
        let counter = match result {
            ProcessResult::Completed => &self.completed,
            ProcessResult::PartiallyCompleted => &self.partially_completed,
            ProcessResult::Retried => &self.retried,
            ProcessResult::Failed => &self.failed,
            ProcessResult::Skipped => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// The background worker driving all queue lanes.
pub struct JobProcessor {
    ctx: ProcessorContext,
    config: ProcessorConfig,
}

/// Handle to a spawned processor thread.
pub struct ProcessorHandle {
    shutdown: mpsc::Sender<()>,
    join: JoinHandle<()>,
    stats: Arc<ProcessorStats>,
}

impl ProcessorHandle {
    pub fn stats(&self) -> &ProcessorStats {
        &self.stats
    }

    /// Signal shutdown and wait for the worker thread to drain.
    pub fn shutdown(self) {
        let _ = self.shutdown.send(());
        if self.join.join().is_err() {
            warn!("processor thread panicked during shutdown");
        }
    }
}

impl JobProcessor {
    pub fn new(ctx: ProcessorContext, config: ProcessorConfig) -> Self {
        Self { ctx, config }
    }

    /// Process at most one delivery from a lane. Returns `None` when the lane
    /// has nothing due.
    pub fn process_next(&self, category: JobCategory, now: DateTime<Utc>) -> Option<ProcessResult> {
        let ctx = &self.ctx;
        let delivery = ctx.queue.dequeue(category, now)?;

        let job = match ctx.store.transition(
            delivery.job_id,
            &[JobStatus::Pending],
            JobStatus::Processing,
            now,
        ) {
            Ok(job) => job,
            Err(e) => {
                // Cancelled or otherwise settled between enqueue and claim;
                // not a delivery outcome, so it leaves no history.
                debug!(job_id = %delivery.job_id, error = %e, "claim rejected, dropping delivery");
                ctx.queue.discard(&delivery);
                return Some(ProcessResult::Skipped);
            }
        };

        let result = self.run_worker(&job, now);
        let settled = match result {
            Ok(RunOutcome::Completed(output)) => {
                match ctx.store.complete(job.id, output.clone(), now, ctx.retention) {
                    Ok(_) => {
                        ctx.queue.ack(&delivery, now);
                        info!(job_id = %job.id, category = %category, "job completed");
                        ProcessResult::Completed
                    }
                    Err(e) => self.discard(&job, output, e, &delivery),
                }
            }
            Ok(RunOutcome::PartiallyCompleted(output)) => {
                match ctx.store.complete_partial(job.id, output.clone(), now) {
                    Ok(_) => {
                        ctx.queue.ack(&delivery, now);
                        info!(job_id = %job.id, category = %category, "job partially completed");
                        ProcessResult::PartiallyCompleted
                    }
                    Err(e) => self.discard(&job, output, e, &delivery),
                }
            }
            Err(JobError::Transient(message)) => {
                match ctx.queue.nack(&delivery, &message, now) {
                    NackOutcome::Requeued { delay } => {
                        warn!(job_id = %job.id, error = %message, ?delay, "transient failure, retrying");
                        self.settle_tolerantly(ctx.store.transition(
                            job.id,
                            &[JobStatus::Processing],
                            JobStatus::Pending,
                            now,
                        ));
                        ProcessResult::Retried
                    }
                    NackOutcome::Exhausted => {
                        warn!(job_id = %job.id, error = %message, "retry budget exhausted");
                        self.settle_tolerantly(ctx.store.fail(job.id, message, now));
                        ProcessResult::Failed
                    }
                }
            }
            Err(JobError::Unrecoverable(message)) => {
                warn!(job_id = %job.id, error = %message, "unrecoverable failure");
                ctx.queue.fail(&delivery, &message, now);
                self.settle_tolerantly(ctx.store.fail(job.id, message, now));
                ProcessResult::Failed
            }
        };
        Some(settled)
    }

    fn run_worker(&self, job: &Job, now: DateTime<Utc>) -> Result<RunOutcome, JobError> {
        match &job.params {
            JobParams::Export(p) => export::run(&self.ctx, job, p, now),
            JobParams::Print(p) => print::run(&self.ctx, job, p, now),
            JobParams::BulkOperation(p) => bulk::run(&self.ctx, job, p, now),
        }
    }

    /// A finished run lost the completion race (the job was cancelled or
    /// deleted mid-run): its artifact must not outlive the record.
    fn discard(
        &self,
        job: &Job,
        output: JobOutput,
        error: StoreError,
        delivery: &crate::queue::Delivery,
    ) -> ProcessResult {
        debug!(job_id = %job.id, error = %error, "completion rejected, discarding result");
        if let Some(artifact) = &output.artifact {
            if let Err(e) = self.ctx.artifacts.remove(&artifact.path) {
                warn!(job_id = %job.id, error = %e, "failed to remove orphaned artifact");
            }
        }
        self.ctx.queue.discard(delivery);
        ProcessResult::Skipped
    }

    /// Settling writes race with cancellation; a conflict or missing record
    /// only means somebody settled the job first.
    fn settle_tolerantly(&self, result: Result<Job, StoreError>) {
        match result {
            Ok(_) | Err(StoreError::NotFound(_)) | Err(StoreError::Conflict { .. }) => {}
            Err(e) => warn!(error = %e, "settling write failed"),
        }
    }

    /// Return stalled deliveries to their lanes, failing jobs whose retry
    /// budget the stall consumed.
    pub fn reap_stalled(&self, now: DateTime<Utc>) {
        for (category, job_id, outcome) in self.ctx.queue.reap_stalled(now) {
            match outcome {
                NackOutcome::Requeued { .. } => {
                    self.settle_tolerantly(self.ctx.store.transition(
                        job_id,
                        &[JobStatus::Processing],
                        JobStatus::Pending,
                        now,
                    ));
                }
                NackOutcome::Exhausted => {
                    warn!(%job_id, %category, "stalled job exhausted its attempts");
                    self.settle_tolerantly(self.ctx.store.fail(
                        job_id,
                        "worker stalled".to_string(),
                        now,
                    ));
                }
            }
        }
    }

    /// Run the worker loop on a dedicated thread until shutdown.
    pub fn spawn(self) -> ProcessorHandle {
        let (shutdown, rx) = mpsc::channel();
        let stats = Arc::new(ProcessorStats::default());
        let loop_stats = Arc::clone(&stats);
        let poll = self.config.poll_interval;

        let join = std::thread::spawn(move || {
            info!("job processor started");
            loop {
                let now = Utc::now();
                self.reap_stalled(now);
                for category in JobCategory::ALL {
                    while let Some(result) = self.process_next(category, Utc::now()) {
                        loop_stats.record(result);
                    }
                }
                match rx.recv_timeout(poll) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
            }
            info!("job processor stopped");
        });

        ProcessorHandle {
            shutdown,
            join,
            stats,
        }
    }
}
