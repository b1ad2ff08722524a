//! Permission guard applied at the command boundary, before anything reaches
//! the engine. Reads only need a valid token.

use axum::response::Response;

use consignment_auth::{Permission, authorize};

use crate::app::errors;
use crate::context::{PrincipalContext, TenantContext};

pub fn require(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    permission: &Permission,
) -> Result<(), Response> {
    let principal = principal.principal_in(*tenant);
    authorize(&principal, permission).map_err(|e| {
        tracing::info!(
            principal_id = %principal.principal_id,
            permission = %permission,
            "command refused"
        );
        errors::authz_error_to_response(e)
    })
}
