use axum::{Router, routing::get};

pub mod agreements;
pub mod liquidations;
pub mod reports;
pub mod stock;
pub mod suppliers;
pub mod system;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/suppliers", suppliers::router())
        .nest("/agreements", agreements::router())
        .nest("/stock", stock::router())
        .nest("/liquidations", liquidations::router())
        .nest("/reportes", reports::router())
}
