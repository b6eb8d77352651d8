//! Background job lifecycle for asynchronous export/print/bulk-operation
//! processing.
//!
//! ## Design
//!
//! - Jobs are tenant-scoped, owner-scoped plain data records
//! - All status changes flow through one auditable transition module
//! - Category-scoped FIFO queue with retry/backoff and a failure channel
//! - Worker claims are exclusive; record writes are conditional on prior state
//! - Completed artifacts expire after a fixed retention window and are swept
//!
//! ## Components
//!
//! - `store`: job record persistence (in-memory backend, trait seam)
//! - `queue`: durable-work-queue semantics with per-category policy
//! - `processor`: worker loop + the three category work functions
//! - `lifecycle`: artifact expiry sweep and download gating
//! - `template`: print template management
//! - `validate`: gateway-side request validation (all violations at once)

pub mod artifact;
pub mod bulk;
pub mod config;
pub mod export;
pub mod lifecycle;
pub mod print;
pub mod processor;
pub mod queue;
pub mod render;
pub mod repository;
pub mod store;
pub mod template;
pub mod transition;
pub mod types;
pub mod validate;

pub use artifact::ArtifactStorage;
pub use config::JobServiceConfig;
pub use lifecycle::{DownloadGrant, ResultLifecycleManager, SweepReport};
pub use processor::{
    JobError, JobProcessor, ProcessResult, ProcessorConfig, ProcessorContext, ProcessorHandle,
    ProcessorStats, RunOutcome,
};
pub use queue::{Delivery, JobQueue, NackOutcome, QueuePolicy};
pub use render::{RenderError, RenderRequest, RenderedDocument, Renderer};
pub use repository::{EntityRepository, EntityRow, InMemoryEntityRepository};
pub use store::{InMemoryJobStore, JobListFilter, JobStats, JobStore, StoreError};
pub use template::{NewTemplate, Template, TemplateLayout, TemplateStore, TemplateUpdate};
pub use types::{
    ArtifactRef, BulkMutation, Job, JobCategory, JobOutput, JobParams, JobStatus, OutputFormat,
    RecordCounts, RecordError,
};
pub use validate::JobEstimate;
