use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use consignment_core::TenantId;

use crate::{Permission, Role};

/// Identity of an authenticated caller (a person or a service account).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(Uuid);

impl PrincipalId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for PrincipalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// Roles held in one organization and the permissions they expand to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMembership {
    pub tenant_id: TenantId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl TenantMembership {
    pub fn from_roles(tenant_id: TenantId, roles: Vec<Role>) -> Self {
        let mut permissions: Vec<Permission> = roles.iter().flat_map(Role::permissions).collect();
        permissions.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        permissions.dedup();
        Self {
            tenant_id,
            roles,
            permissions,
        }
    }
}
