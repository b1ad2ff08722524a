//! Agreements, their products and lifecycle, and the stock movements posted
//! against one agreement.

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};

use consignment_agreements::LifecycleEvent;
use consignment_auth::Permission;
use consignment_engine::{AgreementChanges, AgreementFilter, NewAgreement, ProductChanges};

use crate::app::errors::{self, ApiResult};
use crate::app::{AppState, dto};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_agreement).get(list_agreements))
        .route("/:id", get(get_agreement).put(update_agreement))
        .route("/:id/activate", post(activate))
        .route("/:id/pause", post(pause))
        .route("/:id/terminate", post(terminate))
        .route("/:id/products", post(add_product))
        .route("/:id/products/:product_id", put(update_product).delete(remove_product))
        .route("/:id/receive", post(receive))
        .route("/:id/return", post(return_to_supplier))
        .route("/:id/sales", post(sell))
        .route("/:id/stock", get(agreement_stock))
}

pub async fn create_agreement(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateAgreementRequest>,
) -> ApiResult<Response> {
    authz::require(&tenant, &principal, &Permission::AGREEMENTS_WRITE)?;
    let tenant_id = tenant.tenant_id();
    let input = NewAgreement {
        supplier_id: body.supplier_id,
        commission_pct: body.commission_pct,
        settlement_period_days: body.settlement_period_days,
        return_grace_days: body.return_grace_days,
        location_id: body.location_id,
        notes: body.notes,
    };
    let view = state
        .run(move |engine| engine.create_agreement(tenant_id, input))
        .await?;
    Ok((StatusCode::CREATED, Json(view)).into_response())
}

pub async fn list_agreements(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<dto::AgreementsQuery>,
) -> ApiResult<Response> {
    let filter = AgreementFilter {
        status: query.status,
        supplier_id: dto::parse_opt_id(query.supplier_id.as_deref())?,
    };
    let tenant_id = tenant.tenant_id();
    let views = state
        .run(move |engine| engine.list_agreements(tenant_id, filter))
        .await?;
    Ok(Json(views).into_response())
}

pub async fn get_agreement(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let agreement_id = dto::parse_agreement_id(&id)?;
    let tenant_id = tenant.tenant_id();
    let view = state
        .run(move |engine| engine.get_agreement(tenant_id, agreement_id))
        .await?;
    Ok(Json(view).into_response())
}

pub async fn update_agreement(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateAgreementRequest>,
) -> ApiResult<Response> {
    authz::require(&tenant, &principal, &Permission::AGREEMENTS_WRITE)?;
    let agreement_id = dto::parse_agreement_id(&id)?;
    let tenant_id = tenant.tenant_id();
    let changes = AgreementChanges {
        commission_pct: body.commission_pct,
        settlement_period_days: body.settlement_period_days,
        return_grace_days: body.return_grace_days,
        location_id: body.location_id,
        notes: body.notes,
    };
    let view = state
        .run(move |engine| engine.update_agreement(tenant_id, agreement_id, changes))
        .await?;
    Ok(Json(view).into_response())
}

pub async fn activate(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    transition(state, tenant, principal, id, LifecycleEvent::Activate, false).await
}

pub async fn pause(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    transition(state, tenant, principal, id, LifecycleEvent::Pause, false).await
}

/// `{"force": true}` terminates even with stock still consigned.
pub async fn terminate(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::TerminateRequest>>,
) -> ApiResult<Response> {
    let force = body.map(|Json(b)| b.force).unwrap_or(false);
    transition(state, tenant, principal, id, LifecycleEvent::Terminate, force).await
}

async fn transition(
    state: AppState,
    tenant: TenantContext,
    principal: PrincipalContext,
    id: String,
    event: LifecycleEvent,
    force: bool,
) -> ApiResult<Response> {
    authz::require(&tenant, &principal, &Permission::AGREEMENTS_WRITE)?;
    let agreement_id = dto::parse_agreement_id(&id)?;
    let tenant_id = tenant.tenant_id();
    let view = state
        .run(move |engine| engine.transition(tenant_id, agreement_id, event, force))
        .await?;
    Ok(Json(view).into_response())
}

pub async fn add_product(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AddProductRequest>,
) -> ApiResult<Response> {
    authz::require(&tenant, &principal, &Permission::AGREEMENTS_WRITE)?;
    let agreement_id = dto::parse_agreement_id(&id)?;
    let tenant_id = tenant.tenant_id();
    let key = consignment_core::ProductKey::new(body.product_id, body.variant_id);
    let view = state
        .run(move |engine| engine.add_product(tenant_id, agreement_id, key, body.consignment_price))
        .await?;
    Ok((StatusCode::CREATED, Json(view)).into_response())
}

pub async fn update_product(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, product_id)): Path<(String, String)>,
    Query(query): Query<dto::VariantQuery>,
    Json(body): Json<dto::UpdateProductRequest>,
) -> ApiResult<Response> {
    authz::require(&tenant, &principal, &Permission::AGREEMENTS_WRITE)?;
    let agreement_id = dto::parse_agreement_id(&id)?;
    let mut key = dto::parse_product_key(&product_id, query.variant_id.as_deref())?;
    if key.variant_id.is_none() {
        key.variant_id = body.variant_id;
    }
    let tenant_id = tenant.tenant_id();
    let changes = ProductChanges {
        consignment_price: body.consignment_price,
        active: body.active,
    };
    let view = state
        .run(move |engine| engine.update_product(tenant_id, agreement_id, key, changes))
        .await?;
    Ok(Json(view).into_response())
}

pub async fn remove_product(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, product_id)): Path<(String, String)>,
    Query(query): Query<dto::VariantQuery>,
) -> ApiResult<Response> {
    authz::require(&tenant, &principal, &Permission::AGREEMENTS_WRITE)?;
    let agreement_id = dto::parse_agreement_id(&id)?;
    let key = dto::parse_product_key(&product_id, query.variant_id.as_deref())?;
    let tenant_id = tenant.tenant_id();
    let view = state
        .run(move |engine| engine.remove_product(tenant_id, agreement_id, key))
        .await?;
    Ok(Json(view).into_response())
}

pub async fn receive(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::MovementRequest>,
) -> ApiResult<Response> {
    authz::require(&tenant, &principal, &Permission::STOCK_WRITE)?;
    let agreement_id = dto::parse_agreement_id(&id)?;
    let lines = body.into_lines().map_err(errors::domain_error_to_response)?;
    let tenant_id = tenant.tenant_id();
    let records = state
        .run(move |engine| engine.receive_items(tenant_id, agreement_id, lines))
        .await?;
    Ok((StatusCode::CREATED, Json(records)).into_response())
}

pub async fn return_to_supplier(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::MovementRequest>,
) -> ApiResult<Response> {
    authz::require(&tenant, &principal, &Permission::STOCK_WRITE)?;
    let agreement_id = dto::parse_agreement_id(&id)?;
    let lines = body.into_lines().map_err(errors::domain_error_to_response)?;
    let tenant_id = tenant.tenant_id();
    let records = state
        .run(move |engine| engine.return_items(tenant_id, agreement_id, lines))
        .await?;
    Ok(Json(records).into_response())
}

pub async fn sell(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SellRequest>,
) -> ApiResult<Response> {
    authz::require(&tenant, &principal, &Permission::STOCK_WRITE)?;
    let agreement_id = dto::parse_agreement_id(&id)?;
    let sale = body.into_sale().map_err(errors::domain_error_to_response)?;
    let tenant_id = tenant.tenant_id();
    let recorded = state
        .run(move |engine| engine.sell(tenant_id, agreement_id, sale))
        .await?;
    Ok((StatusCode::CREATED, Json(recorded)).into_response())
}

pub async fn agreement_stock(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Query(query): Query<dto::StockQuery>,
) -> ApiResult<Response> {
    let agreement_id = dto::parse_agreement_id(&id)?;
    let only_available = query.only_available.unwrap_or(false);
    let tenant_id = tenant.tenant_id();
    let records = state
        .run(move |engine| engine.balances_for_agreement(tenant_id, agreement_id, only_available))
        .await?;
    Ok(Json(records).into_response())
}
