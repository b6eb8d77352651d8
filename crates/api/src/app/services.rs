//! Job subsystem wiring: store, queue, repository, templates, processor.
//!
//! Everything is built here once and shared through an `Extension`; handlers
//! never construct job components themselves.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::info;

use quillerp_auth::PrincipalId;
use quillerp_core::{DomainResult, JobId, TenantId};
use quillerp_jobs::render::BasicRenderer;
use quillerp_jobs::repository::InMemoryEntityRepository;
use quillerp_jobs::{
    validate, ArtifactStorage, EntityRow, InMemoryJobStore, Job, JobEstimate,
    JobParams, JobProcessor, JobQueue, JobServiceConfig, JobStatus, JobStore, ProcessorConfig,
    ProcessorContext, ProcessorHandle, ResultLifecycleManager, TemplateStore,
};

pub struct AppServices {
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<JobQueue>,
    pub repository: Arc<InMemoryEntityRepository>,
    pub templates: Arc<TemplateStore>,
    pub lifecycle: Arc<ResultLifecycleManager>,
    pub config: JobServiceConfig,
    /// Keeps the worker thread alive for the lifetime of the app.
    _processor: ProcessorHandle,
}

pub fn build_services(config: JobServiceConfig) -> AppServices {
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let queue = Arc::new(JobQueue::default());
    let repository = Arc::new(InMemoryEntityRepository::with_default_entities());
    let templates = Arc::new(TemplateStore::new());
    let artifacts = ArtifactStorage::new(config.artifact_dir.clone());
    let lifecycle = Arc::new(ResultLifecycleManager::new(store.clone(), artifacts.clone()));

    let processor = JobProcessor::new(
        ProcessorContext {
            store: store.clone(),
            queue: queue.clone(),
            repository: repository.clone(),
            renderer: Arc::new(BasicRenderer::new()),
            templates: templates.clone(),
            artifacts,
            retention: config.retention,
        },
        ProcessorConfig {
            poll_interval: config.poll_interval,
        },
    )
    .spawn();
    info!(artifact_dir = %config.artifact_dir.display(), "job services built (in-memory backend)");

    AppServices {
        store,
        queue,
        repository,
        templates,
        lifecycle,
        config,
        _processor: processor,
    }
}

impl AppServices {
    /// Validate, estimate, persist and enqueue one submission.
    pub fn submit(
        &self,
        tenant_id: TenantId,
        owner: PrincipalId,
        params: JobParams,
    ) -> DomainResult<(Job, JobEstimate)> {
        validate::validate(tenant_id, &params, self.repository.as_ref(), &self.templates)?;
        let estimate = validate::estimate(tenant_id, &params, self.repository.as_ref())?;

        let job = self.store.create(Job::new(tenant_id, owner, params))?;
        self.queue.enqueue(job.category, job.id);
        info!(job_id = %job.id, category = %job.category, records = estimate.records, "job accepted");
        Ok((job, estimate))
    }

    /// Cancel a pending or processing job owned by the caller.
    pub fn cancel(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        owner: PrincipalId,
        now: DateTime<Utc>,
    ) -> DomainResult<Job> {
        let job = self.store.get_owned(tenant_id, job_id, owner)?;

        // Drop the queue entry first so a retried delivery cannot sneak in
        // between the transition and the removal.
        self.queue.remove(job.category, job.id);
        let cancelled = self.store.transition(
            job.id,
            &[JobStatus::Pending, JobStatus::Processing],
            JobStatus::Cancelled,
            now,
        )?;
        info!(job_id = %job.id, "job cancelled");
        Ok(cancelled)
    }

    /// Seed a small demo dataset for the caller's tenant (in-memory backend
    /// only). Returns the number of rows inserted.
    pub fn seed_demo_data(&self, tenant_id: TenantId) -> usize {
        let created = Utc::now();
        let rows: Vec<(&str, EntityRow)> = vec![
            ("invoice", invoice_row("inv-1001", "open", 1250, created)),
            ("invoice", invoice_row("inv-1002", "open", 430, created)),
            ("invoice", invoice_row("inv-1003", "paid", 980, created)),
            ("invoice", invoice_row("inv-1004", "void", 75, created)),
            (
                "employee",
                EntityRow::new("emp-1")
                    .with_field("name", json!("Asha Rahim"))
                    .with_field("status", json!("active"))
                    .with_field("department", json!("finance")),
            ),
            (
                "employee",
                EntityRow::new("emp-2")
                    .with_field("name", json!("Jonas Feld"))
                    .with_field("status", json!("active"))
                    .with_field("department", json!("warehouse")),
            ),
            (
                "expense",
                EntityRow::new("exp-1")
                    .with_field("status", json!("submitted"))
                    .with_field("amount", json!(89)),
            ),
        ];

        let count = rows.len();
        for (entity_type, row) in rows {
            self.repository.insert(tenant_id, entity_type, row);
        }
        info!(%tenant_id, rows = count, "demo data seeded");
        count
    }
}

fn invoice_row(id: &str, status: &str, total: u64, created: DateTime<Utc>) -> EntityRow {
    EntityRow::new(id)
        .with_field("status", json!(status))
        .with_field("total", json!(total))
        .with_field("created_at", json!(created.to_rfc3339()))
}
