//! API-side authorization guard for job routes.
//!
//! Capabilities are enforced at the gateway boundary so the job crates stay
//! auth-agnostic; they only ever see tenant and owner ids.

use quillerp_auth::{authorize, AuthzError, Permission, Principal, Role, TenantMembership};

use crate::context::{PrincipalContext, TenantContext};

/// Check one required capability in the current request context.
pub fn require(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    required: &Permission,
) -> Result<(), AuthzError> {
    let membership = TenantMembership {
        tenant_id: tenant.tenant_id(),
        roles: principal.roles().to_vec(),
        permissions: permissions_from_roles(principal.roles()),
    };

    let principal = Principal {
        principal_id: principal.principal_id(),
        active_tenant_id: tenant.tenant_id(),
        membership,
    };

    authorize(&principal, required)
}

/// Role→permission mapping.
///
/// This is intentionally simple until a real policy source exists (e.g.
/// DB-backed). "admin" grants everything; "back_office" grants the day-to-day
/// job capabilities but not demo-data seeding.
fn permissions_from_roles(roles: &[Role]) -> Vec<Permission> {
    let mut permissions = Vec::new();
    for role in roles {
        match role.as_str() {
            "admin" => return vec![Permission::new("*")],
            "back_office" => {
                for resource in ["exports", "prints", "bulk_operations"] {
                    for action in ["create", "read", "cancel", "download", "delete"] {
                        permissions.push(Permission::for_action(resource, action));
                    }
                }
                permissions.push(Permission::new("templates.read"));
                permissions.push(Permission::new("templates.manage"));
                permissions.push(Permission::new("jobs.stats"));
            }
            _ => {}
        }
    }
    permissions
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillerp_auth::PrincipalId;
    use quillerp_core::TenantId;

    fn ctx(roles: Vec<Role>) -> (TenantContext, PrincipalContext) {
        (
            TenantContext::new(TenantId::new()),
            PrincipalContext::new(PrincipalId::new(), roles),
        )
    }

    #[test]
    fn admin_can_do_everything() {
        let (tenant, principal) = ctx(vec![Role::new("admin")]);
        assert!(require(&tenant, &principal, &Permission::new("admin.seed")).is_ok());
        assert!(require(&tenant, &principal, &Permission::for_action("exports", "create")).is_ok());
    }

    #[test]
    fn back_office_has_job_capabilities_but_not_seeding() {
        let (tenant, principal) = ctx(vec![Role::new("back_office")]);
        assert!(require(&tenant, &principal, &Permission::for_action("prints", "create")).is_ok());
        assert!(require(&tenant, &principal, &Permission::new("templates.manage")).is_ok());
        assert!(require(&tenant, &principal, &Permission::new("admin.seed")).is_err());
    }

    #[test]
    fn unknown_roles_grant_nothing() {
        let (tenant, principal) = ctx(vec![Role::new("visitor")]);
        assert!(matches!(
            require(&tenant, &principal, &Permission::for_action("exports", "read")),
            Err(AuthzError::Forbidden(_))
        ));
    }
}
