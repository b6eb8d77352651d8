//! Request validation and submission estimates.
//!
//! Validation collects every violation before reporting, so a rejected
//! request can be fixed in one round trip instead of one field at a time.

use std::time::Duration as StdDuration;

use quillerp_core::{DomainError, DomainResult, TenantId};

use crate::repository::EntityRepository;
use crate::template::TemplateStore;
use crate::types::{JobParams, OutputFormat, TemplateRef};

/// Rough up-front numbers returned at submission time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEstimate {
    pub records: u64,
    pub duration: StdDuration,
    /// Approximate artifact size; absent for bulk operations.
    pub approx_size_bytes: Option<u64>,
}

// Per-record cost assumptions used for submission estimates. These are
// deliberately coarse; the client only needs an order of magnitude.
const EXPORT_MS_PER_RECORD: u64 = 5;
const PRINT_MS_PER_RECORD: u64 = 50;
const BULK_MS_PER_RECORD: u64 = 10;
const BASE_OVERHEAD_MS: u64 = 500;
const EXPORT_BYTES_PER_RECORD: u64 = 256;
const PRINT_BYTES_PER_RECORD: u64 = 4096;

/// Validate job parameters against the repository and template store.
///
/// Returns `DomainError::Validation` carrying all violations found.
pub fn validate(
    tenant_id: TenantId,
    params: &JobParams,
    repository: &dyn EntityRepository,
    templates: &TemplateStore,
) -> DomainResult<()> {
    let mut violations = Vec::new();

    let known = repository.known_entity_types();
    if !known.iter().any(|t| t == params.entity_type()) {
        violations.push(format!(
            "unknown entity type '{}' (known: {})",
            params.entity_type(),
            known.join(", ")
        ));
    }

    // An explicitly supplied id scope must not be empty.
    if params.entity_ids().is_some_and(|ids| ids.is_empty()) {
        violations.push("entity_ids must not be empty".to_string());
    }

    match params {
        JobParams::Export(p) => {
            if !p.filters.date_range.is_ordered() {
                violations.push("filter date range is inverted (from > to)".to_string());
            }
            match (&p.format, &p.template) {
                (OutputFormat::Pdf, None) => {
                    violations.push("pdf exports require a template".to_string());
                }
                (OutputFormat::Pdf, Some(template)) => {
                    check_template(tenant_id, template, templates, &mut violations);
                }
                _ => {}
            }
        }
        JobParams::Print(p) => {
            if p.doc_type.trim().is_empty() {
                violations.push("doc_type must not be empty".to_string());
            }
            match &p.template {
                Some(template) => {
                    check_template(tenant_id, template, templates, &mut violations);
                }
                // Defaults are resolved at creation time, not dequeue time, so
                // a missing default fails fast instead of queuing a doomed job.
                None => {
                    if templates.default_for(tenant_id, &p.doc_type).is_none() {
                        violations.push(format!(
                            "no default template configured for doc_type '{}'",
                            p.doc_type
                        ));
                    }
                }
            }
        }
        JobParams::BulkOperation(p) => {
            if let crate::types::BulkMutation::SetField { field, .. } = &p.mutation {
                if field.trim().is_empty() {
                    violations.push("mutation field name must not be empty".to_string());
                }
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(DomainError::Validation(violations))
    }
}

fn check_template(
    tenant_id: TenantId,
    template: &TemplateRef,
    templates: &TemplateStore,
    violations: &mut Vec<String>,
) {
    match template {
        TemplateRef::Id(id) => {
            if templates.get(tenant_id, *id).is_err() {
                violations.push(format!("template {id} not found"));
            }
        }
        TemplateRef::Inline(inline) => {
            if inline.content.trim().is_empty() {
                violations.push("inline template content must not be empty".to_string());
            }
        }
    }
}

/// Estimate record count, runtime and artifact size for a submission.
pub fn estimate(
    tenant_id: TenantId,
    params: &JobParams,
    repository: &dyn EntityRepository,
) -> DomainResult<JobEstimate> {
    let records = match params.entity_ids() {
        Some(ids) => ids.len() as u64,
        None => match params {
            JobParams::Export(p) => {
                repository.count(tenant_id, &p.entity_type, &p.filters)?
            }
            _ => 0,
        },
    };

    let (ms_per_record, bytes_per_record) = match params {
        JobParams::Export(_) => (EXPORT_MS_PER_RECORD, Some(EXPORT_BYTES_PER_RECORD)),
        JobParams::Print(_) => (PRINT_MS_PER_RECORD, Some(PRINT_BYTES_PER_RECORD)),
        JobParams::BulkOperation(_) => (BULK_MS_PER_RECORD, None),
    };

    Ok(JobEstimate {
        records,
        duration: StdDuration::from_millis(BASE_OVERHEAD_MS + records * ms_per_record),
        approx_size_bytes: bytes_per_record.map(|b| records * b),
    })
}
