//! Entity access boundary.
//!
//! Persistent entity storage and its query machinery live outside this
//! system; jobs only need scoped reads and, for bulk operations, per-entity
//! mutation application. Both go through this trait.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use quillerp_core::{DomainError, DomainResult, TenantId};

use crate::types::{BulkMutation, FilterCriteria};

/// One entity row as the job system sees it: an id plus a flat field map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRow {
    pub id: String,
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl EntityRow {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// Read/mutate access to ERP entities, scoped by tenant and entity type.
pub trait EntityRepository: Send + Sync {
    /// Entity types this repository can serve (for request validation).
    fn known_entity_types(&self) -> Vec<String>;

    /// Count rows matching the filters (used for estimates).
    fn count(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        filters: &FilterCriteria,
    ) -> DomainResult<u64>;

    /// Query rows matching the filters, creation order.
    fn query(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        filters: &FilterCriteria,
    ) -> DomainResult<Vec<EntityRow>>;

    /// Fetch specific rows by id; unknown ids are errors per id, reported by
    /// the caller, not here.
    fn fetch(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        id: &str,
    ) -> DomainResult<EntityRow>;

    /// Apply a bulk mutation to one entity, returning the pre-mutation row
    /// (the undo snapshot source).
    fn apply(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        id: &str,
        mutation: &BulkMutation,
    ) -> DomainResult<EntityRow>;
}

type Table = HashMap<String, EntityRow>;

/// In-memory repository for dev/tests. Rows are grouped per (tenant, type).
#[derive(Debug, Default)]
pub struct InMemoryEntityRepository {
    tables: RwLock<HashMap<(TenantId, String), Table>>,
    entity_types: Vec<String>,
}

impl InMemoryEntityRepository {
    /// ERP entity kinds the dev repository accepts.
    pub fn with_default_entities() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            entity_types: ["employee", "invoice", "bill", "expense", "payslip"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    pub fn insert(&self, tenant_id: TenantId, entity_type: &str, row: EntityRow) {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        tables
            .entry((tenant_id, entity_type.to_string()))
            .or_default()
            .insert(row.id.clone(), row);
    }

    fn matches(row: &EntityRow, filters: &FilterCriteria) -> bool {
        if let Some(wanted) = &filters.status {
            let status = row.fields.get("status").and_then(|v| v.as_str());
            if status != Some(wanted.as_str()) {
                return false;
            }
        }
        for (field, value) in &filters.fields {
            if row.fields.get(field) != Some(value) {
                return false;
            }
        }
        if filters.date_range.from.is_some() || filters.date_range.to.is_some() {
            let created = row
                .fields
                .get("created_at")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<chrono::DateTime<chrono::Utc>>().ok());
            match created {
                Some(at) if filters.date_range.contains(at) => {}
                _ => return false,
            }
        }
        true
    }
}

impl EntityRepository for InMemoryEntityRepository {
    fn known_entity_types(&self) -> Vec<String> {
        self.entity_types.clone()
    }

    fn count(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        filters: &FilterCriteria,
    ) -> DomainResult<u64> {
        Ok(self.query(tenant_id, entity_type, filters)?.len() as u64)
    }

    fn query(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        filters: &FilterCriteria,
    ) -> DomainResult<Vec<EntityRow>> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        let mut rows: Vec<EntityRow> = tables
            .get(&(tenant_id, entity_type.to_string()))
            .map(|t| t.values().filter(|r| Self::matches(r, filters)).cloned().collect())
            .unwrap_or_default();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }

    fn fetch(&self, tenant_id: TenantId, entity_type: &str, id: &str) -> DomainResult<EntityRow> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables
            .get(&(tenant_id, entity_type.to_string()))
            .and_then(|t| t.get(id))
            .cloned()
            .ok_or(DomainError::NotFound)
    }

    fn apply(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        id: &str,
        mutation: &BulkMutation,
    ) -> DomainResult<EntityRow> {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        let table = tables
            .get_mut(&(tenant_id, entity_type.to_string()))
            .ok_or(DomainError::NotFound)?;
        let row = table.get_mut(id).ok_or(DomainError::NotFound)?;
        let snapshot = row.clone();

        match mutation {
            BulkMutation::SetField { field, value } => {
                row.fields.insert(field.clone(), value.clone());
            }
            BulkMutation::SetStatus { status } => {
                row.fields
                    .insert("status".to_string(), serde_json::Value::String(status.clone()));
            }
            BulkMutation::Delete => {
                table.remove(id);
            }
        }
        Ok(snapshot)
    }
}
