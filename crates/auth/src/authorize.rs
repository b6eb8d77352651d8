//! Pure capability check at the gateway boundary.
//!
//! The API layer resolves a [`Principal`] from claims and a role→permission
//! policy, then asks this module whether a (resource, action) pair is granted.

use std::collections::HashSet;

use thiserror::Error;

use quillerp_core::TenantId;

use crate::{Permission, PrincipalId, TenantMembership};

/// A fully resolved principal for authorization decisions.
///
/// Construction of this object is intentionally decoupled from storage and
/// transport: API/workers can derive memberships from claims and a policy source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub active_tenant_id: TenantId,
    pub membership: TenantMembership,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Authorize a principal within its active tenant context.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_tenant_id != principal.membership.tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    let perms: HashSet<&str> = principal
        .membership
        .permissions
        .iter()
        .map(|p| p.as_str())
        .collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::Role;

    fn principal(tenant: TenantId, perms: Vec<Permission>) -> Principal {
        Principal {
            principal_id: PrincipalId::new(),
            active_tenant_id: tenant,
            membership: TenantMembership {
                tenant_id: tenant,
                roles: vec![Role::new("clerk")],
                permissions: perms,
            },
        }
    }

    #[test]
    fn exact_permission_is_granted() {
        let tenant = TenantId::new();
        let p = principal(tenant, vec![Permission::new("exports.create")]);
        assert!(authorize(&p, &Permission::new("exports.create")).is_ok());
    }

    #[test]
    fn wildcard_grants_everything() {
        let tenant = TenantId::new();
        let p = principal(tenant, vec![Permission::new("*")]);
        assert!(authorize(&p, &Permission::for_action("prints", "download")).is_ok());
    }

    #[test]
    fn missing_permission_is_forbidden() {
        let tenant = TenantId::new();
        let p = principal(tenant, vec![Permission::new("exports.read")]);
        assert_eq!(
            authorize(&p, &Permission::new("exports.create")),
            Err(AuthzError::Forbidden("exports.create".to_string()))
        );
    }

    #[test]
    fn tenant_mismatch_is_rejected_before_permissions() {
        let p = Principal {
            principal_id: PrincipalId::new(),
            active_tenant_id: TenantId::new(),
            membership: TenantMembership {
                tenant_id: TenantId::new(),
                roles: vec![],
                permissions: vec![Permission::new("*")],
            },
        };
        assert_eq!(
            authorize(&p, &Permission::new("exports.create")),
            Err(AuthzError::TenantMismatch)
        );
    }
}
