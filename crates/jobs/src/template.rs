//! Print template management.
//!
//! Templates are tenant-scoped, versioned content definitions. (name,
//! doc_type) is unique among active templates and at most one template per
//! doc_type is the default. Content edits always bump the version counter; a
//! template is never silently overwritten.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quillerp_core::{DomainError, DomainResult, TemplateId, TenantId};

use crate::types::{InlineTemplate, TemplateRef};

/// Supported paper sizes.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperSize {
    #[default]
    A4,
    Letter,
    Legal,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Page margins in millimetres.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Margins {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            top: 10,
            bottom: 10,
            left: 10,
            right: 10,
        }
    }
}

/// Layout parameters applied when a template is rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateLayout {
    #[serde(default)]
    pub paper_size: PaperSize,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub margins: Margins,
    pub header: Option<String>,
    pub footer: Option<String>,
}

/// A stored print template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub tenant_id: TenantId,
    pub name: String,
    /// Target document kind, e.g. "invoice" or "payslip".
    pub doc_type: String,
    pub content: String,
    pub layout: TemplateLayout,
    /// Bumped on every content edit.
    pub version: u32,
    pub is_default: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Creation payload.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTemplate {
    pub name: String,
    pub doc_type: String,
    pub content: String,
    #[serde(default)]
    pub layout: TemplateLayout,
    #[serde(default)]
    pub is_default: bool,
}

/// Partial update; only supplied fields change.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateUpdate {
    pub name: Option<String>,
    pub content: Option<String>,
    pub layout: Option<TemplateLayout>,
}

/// What the processor actually renders with, whether stored or inline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTemplate {
    pub content: String,
    pub layout: TemplateLayout,
}

impl From<&Template> for ResolvedTemplate {
    fn from(t: &Template) -> Self {
        Self {
            content: t.content.clone(),
            layout: t.layout.clone(),
        }
    }
}

impl From<&InlineTemplate> for ResolvedTemplate {
    fn from(t: &InlineTemplate) -> Self {
        Self {
            content: t.content.clone(),
            layout: t.layout.clone(),
        }
    }
}

/// In-memory template store.
#[derive(Debug, Default)]
pub struct TemplateStore {
    templates: RwLock<HashMap<TemplateId, Template>>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, tenant_id: TenantId, new: NewTemplate) -> DomainResult<Template> {
        let mut templates = self.templates.write().unwrap_or_else(|e| e.into_inner());

        let duplicate = templates.values().any(|t| {
            t.tenant_id == tenant_id
                && t.active
                && t.name == new.name
                && t.doc_type == new.doc_type
        });
        if duplicate {
            return Err(DomainError::conflict(format!(
                "active template '{}' already exists for doc_type '{}'",
                new.name, new.doc_type
            )));
        }

        if new.is_default {
            for t in templates.values_mut() {
                if t.tenant_id == tenant_id && t.doc_type == new.doc_type {
                    t.is_default = false;
                }
            }
        }

        let now = Utc::now();
        let template = Template {
            id: TemplateId::new(),
            tenant_id,
            name: new.name,
            doc_type: new.doc_type,
            content: new.content,
            layout: new.layout,
            version: 1,
            is_default: new.is_default,
            active: true,
            created_at: now,
            updated_at: now,
        };
        templates.insert(template.id, template.clone());
        Ok(template)
    }

    pub fn get(&self, tenant_id: TenantId, id: TemplateId) -> DomainResult<Template> {
        let templates = self.templates.read().unwrap_or_else(|e| e.into_inner());
        templates
            .get(&id)
            .filter(|t| t.tenant_id == tenant_id && t.active)
            .cloned()
            .ok_or(DomainError::NotFound)
    }

    pub fn list(&self, tenant_id: TenantId, doc_type: Option<&str>) -> Vec<Template> {
        let templates = self.templates.read().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<Template> = templates
            .values()
            .filter(|t| t.tenant_id == tenant_id && t.active)
            .filter(|t| doc_type.is_none_or(|d| t.doc_type == d))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Apply a partial update. A content change bumps the version.
    pub fn update(
        &self,
        tenant_id: TenantId,
        id: TemplateId,
        update: TemplateUpdate,
    ) -> DomainResult<Template> {
        let mut templates = self.templates.write().unwrap_or_else(|e| e.into_inner());

        if let Some(name) = &update.name {
            let doc_type = templates
                .get(&id)
                .filter(|t| t.tenant_id == tenant_id)
                .map(|t| t.doc_type.clone())
                .ok_or(DomainError::NotFound)?;
            let duplicate = templates.values().any(|t| {
                t.id != id
                    && t.tenant_id == tenant_id
                    && t.active
                    && t.name == *name
                    && t.doc_type == doc_type
            });
            if duplicate {
                return Err(DomainError::conflict(format!(
                    "active template '{name}' already exists for doc_type '{doc_type}'"
                )));
            }
        }

        let template = templates
            .get_mut(&id)
            .filter(|t| t.tenant_id == tenant_id && t.active)
            .ok_or(DomainError::NotFound)?;

        if let Some(name) = update.name {
            template.name = name;
        }
        if let Some(layout) = update.layout {
            template.layout = layout;
        }
        if let Some(content) = update.content {
            if content != template.content {
                template.content = content;
                template.version += 1;
            }
        }
        template.updated_at = Utc::now();
        Ok(template.clone())
    }

    /// Mark a template as the default for its doc_type, clearing any other.
    pub fn set_default(&self, tenant_id: TenantId, id: TemplateId) -> DomainResult<Template> {
        let mut templates = self.templates.write().unwrap_or_else(|e| e.into_inner());
        let doc_type = templates
            .get(&id)
            .filter(|t| t.tenant_id == tenant_id && t.active)
            .map(|t| t.doc_type.clone())
            .ok_or(DomainError::NotFound)?;

        for t in templates.values_mut() {
            if t.tenant_id == tenant_id && t.doc_type == doc_type {
                t.is_default = t.id == id;
            }
        }
        Ok(templates[&id].clone())
    }

    /// Soft-delete: the template stops resolving and loses default status,
    /// freeing its (name, doc_type) pair.
    pub fn delete(&self, tenant_id: TenantId, id: TemplateId) -> DomainResult<()> {
        let mut templates = self.templates.write().unwrap_or_else(|e| e.into_inner());
        let template = templates
            .get_mut(&id)
            .filter(|t| t.tenant_id == tenant_id && t.active)
            .ok_or(DomainError::NotFound)?;
        template.active = false;
        template.is_default = false;
        template.updated_at = Utc::now();
        Ok(())
    }

    pub fn default_for(&self, tenant_id: TenantId, doc_type: &str) -> Option<Template> {
        let templates = self.templates.read().unwrap_or_else(|e| e.into_inner());
        templates
            .values()
            .find(|t| {
                t.tenant_id == tenant_id && t.active && t.is_default && t.doc_type == doc_type
            })
            .cloned()
    }

    /// Resolve what a print job should render with: explicit id, inline
    /// custom template, or the doc_type default.
    pub fn resolve(
        &self,
        tenant_id: TenantId,
        doc_type: &str,
        reference: Option<&TemplateRef>,
    ) -> DomainResult<ResolvedTemplate> {
        match reference {
            Some(TemplateRef::Id(id)) => Ok((&self.get(tenant_id, *id)?).into()),
            Some(TemplateRef::Inline(inline)) => Ok(inline.into()),
            None => self
                .default_for(tenant_id, doc_type)
                .map(|t| (&t).into())
                .ok_or_else(|| {
                    DomainError::validation(format!(
                        "no default template configured for doc_type '{doc_type}'"
                    ))
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_template(name: &str, doc_type: &str, default: bool) -> NewTemplate {
        NewTemplate {
            name: name.to_string(),
            doc_type: doc_type.to_string(),
            content: "Invoice {{id}}".to_string(),
            layout: TemplateLayout::default(),
            is_default: default,
        }
    }

    #[test]
    fn duplicate_name_and_type_conflicts() {
        let store = TemplateStore::new();
        let tenant = TenantId::new();
        store.create(tenant, new_template("std", "invoice", false)).unwrap();

        assert!(matches!(
            store.create(tenant, new_template("std", "invoice", false)),
            Err(DomainError::Conflict(_))
        ));
        // Same name, different doc_type is fine.
        store.create(tenant, new_template("std", "payslip", false)).unwrap();
        // Same pair in another tenant is fine.
        store
            .create(TenantId::new(), new_template("std", "invoice", false))
            .unwrap();
    }

    #[test]
    fn content_edit_bumps_version_but_layout_edit_does_not() {
        let store = TemplateStore::new();
        let tenant = TenantId::new();
        let t = store.create(tenant, new_template("std", "invoice", false)).unwrap();
        assert_eq!(t.version, 1);

        let t = store
            .update(
                tenant,
                t.id,
                TemplateUpdate {
                    layout: Some(TemplateLayout::default()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(t.version, 1);

        let t = store
            .update(
                tenant,
                t.id,
                TemplateUpdate {
                    content: Some("Invoice {{id}} v2".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(t.version, 2);

        // Same content again: no silent bump.
        let t = store
            .update(
                tenant,
                t.id,
                TemplateUpdate {
                    content: Some("Invoice {{id}} v2".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(t.version, 2);
    }

    #[test]
    fn at_most_one_default_per_doc_type() {
        let store = TemplateStore::new();
        let tenant = TenantId::new();
        let a = store.create(tenant, new_template("a", "invoice", true)).unwrap();
        let b = store.create(tenant, new_template("b", "invoice", false)).unwrap();

        store.set_default(tenant, b.id).unwrap();
        assert!(!store.get(tenant, a.id).unwrap().is_default);
        assert!(store.get(tenant, b.id).unwrap().is_default);
        assert_eq!(store.default_for(tenant, "invoice").unwrap().id, b.id);
    }

    #[test]
    fn resolve_falls_back_to_default_and_fails_without_one() {
        let store = TemplateStore::new();
        let tenant = TenantId::new();

        assert!(matches!(
            store.resolve(tenant, "invoice", None),
            Err(DomainError::Validation(_))
        ));

        store.create(tenant, new_template("std", "invoice", true)).unwrap();
        let resolved = store.resolve(tenant, "invoice", None).unwrap();
        assert_eq!(resolved.content, "Invoice {{id}}");
    }

    #[test]
    fn deleted_template_stops_resolving_and_frees_its_name() {
        let store = TemplateStore::new();
        let tenant = TenantId::new();
        let t = store.create(tenant, new_template("std", "invoice", true)).unwrap();
        store.delete(tenant, t.id).unwrap();

        assert!(store.get(tenant, t.id).is_err());
        assert!(store.default_for(tenant, "invoice").is_none());
        assert!(matches!(
            store.resolve(tenant, "invoice", Some(&TemplateRef::Id(t.id))),
            Err(DomainError::NotFound)
        ));
        // The pair is reusable after deletion.
        store.create(tenant, new_template("std", "invoice", false)).unwrap();
    }
}
