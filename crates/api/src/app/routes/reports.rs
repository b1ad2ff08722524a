use axum::{
    Json, Router,
    extract::{Extension, Query},
    response::{IntoResponse, Response},
    routing::get,
};

use crate::app::errors::ApiResult;
use crate::app::{AppState, dto};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/stock", get(stock_by_supplier))
        .route("/ventas", get(sales_by_product))
        .route("/pendiente", get(pending_to_settle))
}

pub async fn stock_by_supplier(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Response> {
    let tenant_id = tenant.tenant_id();
    let rows = state
        .run(move |engine| engine.stock_by_supplier(tenant_id))
        .await?;
    Ok(Json(rows).into_response())
}

/// `?fecha_desde=YYYY-MM-DD&fecha_hasta=YYYY-MM-DD`, both inclusive.
pub async fn sales_by_product(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<dto::SalesReportQuery>,
) -> ApiResult<Response> {
    let tenant_id = tenant.tenant_id();
    let rows = state
        .run(move |engine| engine.sales_by_product(tenant_id, query.fecha_desde, query.fecha_hasta))
        .await?;
    Ok(Json(rows).into_response())
}

pub async fn pending_to_settle(
    Extension(state): Extension<AppState>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Response> {
    let tenant_id = tenant.tenant_id();
    let rows = state
        .run(move |engine| engine.pending_to_settle(tenant_id))
        .await?;
    Ok(Json(rows).into_response())
}
