use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    response::{IntoResponse, Response},
    routing::{get, post},
};

use consignment_auth::Permission;
use consignment_engine::StockFilter;

use crate::app::errors::ApiResult;
use crate::app::{AppState, dto};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_stock))
        .route("/:record_id", get(get_record))
        .route("/:record_id/adjust", post(adjust))
}

pub async fn list_stock(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<dto::StockQuery>,
) -> ApiResult<Response> {
    let filter = StockFilter {
        agreement_id: query
            .agreement_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(dto::parse_agreement_id)
            .transpose()?,
        product_id: dto::parse_opt_id(query.product_id.as_deref())?,
        only_available: query.only_available.unwrap_or(false),
    };
    let tenant_id = tenant.tenant_id();
    let records = state
        .run(move |engine| engine.list_stock(tenant_id, filter))
        .await?;
    Ok(Json(records).into_response())
}

pub async fn get_record(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(record_id): Path<String>,
) -> ApiResult<Response> {
    let record_id = dto::parse_record_id(&record_id)?;
    let tenant_id = tenant.tenant_id();
    let record = state
        .run(move |engine| engine.stock_record(tenant_id, record_id))
        .await?;
    Ok(Json(record).into_response())
}

/// Manual correction; `reason` is mandatory and kept on the movement.
pub async fn adjust(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(record_id): Path<String>,
    Json(body): Json<dto::AdjustRequest>,
) -> ApiResult<Response> {
    authz::require(&tenant, &principal, &Permission::STOCK_WRITE)?;
    let record_id = dto::parse_record_id(&record_id)?;
    let tenant_id = tenant.tenant_id();
    let record = state
        .run(move |engine| engine.adjust(tenant_id, record_id, body.delta, &body.reason))
        .await?;
    Ok(Json(record).into_response())
}
