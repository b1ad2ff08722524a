use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use consignment_auth::Permission;
use consignment_core::{DomainError, SupplierId};

use crate::app::{AppState, dto, errors};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_supplier).get(list_suppliers))
        .route("/:id", get(get_supplier))
}

pub async fn register_supplier(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateSupplierRequest>,
) -> Result<Response, Response> {
    authz::require(&tenant, &principal, &Permission::SUPPLIERS_WRITE)?;
    let tenant_id = tenant.tenant_id();
    let supplier = state
        .run(move |engine| Ok(engine.suppliers().register(tenant_id, &body.name)?))
        .await?;
    Ok((StatusCode::CREATED, Json(supplier)).into_response())
}

pub async fn list_suppliers(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Response, Response> {
    let tenant_id = tenant.tenant_id();
    let suppliers = state
        .run(move |engine| Ok(engine.suppliers().list(tenant_id)))
        .await?;
    Ok(Json(suppliers).into_response())
}

pub async fn get_supplier(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Response, Response> {
    let supplier_id: SupplierId = dto::parse_id(&id)?;
    let tenant_id = tenant.tenant_id();
    match state
        .run(move |engine| Ok(engine.suppliers().get(tenant_id, supplier_id)))
        .await?
    {
        Some(supplier) => Ok(Json(supplier).into_response()),
        None => Err(errors::domain_error_to_response(DomainError::not_found())),
    }
}
