//! `quillerp-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod pagination;

pub use error::{DomainError, DomainResult};
pub use id::{JobId, TemplateId, TenantId};
pub use pagination::{Page, Pagination};
