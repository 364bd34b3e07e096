//! API-side authorization guard for commands.
//!
//! This enforces authorization at the command boundary (before the admission
//! controller acts), while keeping domain and store code auth-agnostic.

use syncgate_auth::{
    authorize, AuthzError, CommandAuthorization, Permission, Principal, TenantMembership,
};

use crate::context::{PrincipalContext, TenantContext};

/// Check authorization for a command in the current request context.
pub fn authorize_command<C: CommandAuthorization>(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    command: &C,
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

    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }

    Ok(())
}

/// Minimal role→permission mapping stub.
///
/// This is intentionally simple until a real policy source exists (e.g.
/// DB-backed). Convention: "admin" grants all permissions in the tenant;
/// "operator" may run syncs but not change configuration.
fn permissions_from_roles(roles: &[syncgate_auth::Role]) -> Vec<Permission> {
    if roles.iter().any(|r| r.as_str() == "admin") {
        return vec![Permission::new("*")];
    }
    if roles.iter().any(|r| r.as_str() == "operator") {
        return vec![Permission::new("integrations.sync")];
    }

    Vec::new()
}
