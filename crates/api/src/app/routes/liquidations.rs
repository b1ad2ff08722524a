//! Liquidations: generation for a period, then confirm, pay or cancel.

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use consignment_auth::Permission;
use consignment_core::LiquidationId;
use consignment_engine::{GenerateRequest, LiquidationFilter, Payment};

use crate::app::errors::ApiResult;
use crate::app::{AppState, dto};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(generate).get(list_liquidations))
        .route("/:id", get(get_liquidation))
        .route("/:id/confirm", post(confirm))
        .route("/:id/pay", post(pay))
        .route("/:id/cancel", post(cancel))
}

pub async fn generate(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::GenerateLiquidationRequest>,
) -> ApiResult<Response> {
    authz::require(&tenant, &principal, &Permission::LIQUIDATIONS_WRITE)?;
    let tenant_id = tenant.tenant_id();
    let request = GenerateRequest {
        agreement_id: body.agreement_id,
        from: body.fecha_desde,
        to: body.fecha_hasta,
        idempotency_key: body.idempotency_key,
    };
    let liquidation = state
        .run(move |engine| engine.generate(tenant_id, request))
        .await?;
    Ok((StatusCode::CREATED, Json(dto::LiquidationResponse::from(liquidation))).into_response())
}

pub async fn list_liquidations(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<dto::LiquidationsQuery>,
) -> ApiResult<Response> {
    let filter = LiquidationFilter {
        agreement_id: query
            .agreement_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(dto::parse_agreement_id)
            .transpose()?,
        status: query.status,
    };
    let tenant_id = tenant.tenant_id();
    let liquidations = state
        .run(move |engine| engine.list_liquidations(tenant_id, filter))
        .await?;
    let body: Vec<dto::LiquidationResponse> = liquidations.into_iter().map(Into::into).collect();
    Ok(Json(body).into_response())
}

pub async fn get_liquidation(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let liquidation_id: LiquidationId = dto::parse_id(&id)?;
    let tenant_id = tenant.tenant_id();
    let liquidation = state
        .run(move |engine| engine.get_liquidation(tenant_id, liquidation_id))
        .await?;
    Ok(Json(dto::LiquidationResponse::from(liquidation)).into_response())
}

pub async fn confirm(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    authz::require(&tenant, &principal, &Permission::LIQUIDATIONS_WRITE)?;
    let liquidation_id: LiquidationId = dto::parse_id(&id)?;
    let tenant_id = tenant.tenant_id();
    let liquidation = state
        .run(move |engine| engine.confirm(tenant_id, liquidation_id))
        .await?;
    Ok(Json(dto::LiquidationResponse::from(liquidation)).into_response())
}

/// Body is optional; the payment date defaults to today.
pub async fn pay(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::PayLiquidationRequest>>,
) -> ApiResult<Response> {
    authz::require(&tenant, &principal, &Permission::LIQUIDATIONS_WRITE)?;
    let liquidation_id: LiquidationId = dto::parse_id(&id)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let payment = Payment {
        paid_on: body.fecha_pago,
        method: body.metodo_pago,
        reference: body.referencia_pago,
    };
    let tenant_id = tenant.tenant_id();
    let liquidation = state
        .run(move |engine| engine.pay(tenant_id, liquidation_id, payment))
        .await?;
    Ok(Json(dto::LiquidationResponse::from(liquidation)).into_response())
}

pub async fn cancel(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::CancelLiquidationRequest>>,
) -> ApiResult<Response> {
    authz::require(&tenant, &principal, &Permission::LIQUIDATIONS_WRITE)?;
    let liquidation_id: LiquidationId = dto::parse_id(&id)?;
    let reason = body.and_then(|Json(b)| b.motivo);
    let tenant_id = tenant.tenant_id();
    let liquidation = state
        .run(move |engine| engine.cancel(tenant_id, liquidation_id, reason))
        .await?;
    Ok(Json(dto::LiquidationResponse::from(liquidation)).into_response())
}
