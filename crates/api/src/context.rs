use consignment_auth::{Principal, PrincipalId, Role, TenantMembership};
use consignment_core::TenantId;

/// The organization a request acts for. Taken from the token, never from the
/// URL or body; every engine call is scoped to it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Authenticated caller and the roles the token granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal_id: PrincipalId,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(principal_id: PrincipalId, roles: Vec<Role>) -> Self {
        Self { principal_id, roles }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Principal acting in `tenant`, with permissions expanded from roles.
    pub fn principal_in(&self, tenant: TenantContext) -> Principal {
        Principal {
            principal_id: self.principal_id,
            active_tenant_id: tenant.tenant_id(),
            membership: TenantMembership::from_roles(tenant.tenant_id(), self.roles.clone()),
        }
    }
}
