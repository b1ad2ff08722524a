//! HTTP application wiring: the axum router around one [`ConsignmentEngine`].
//!
//! - `routes/`: handlers, one file per area
//! - `dto.rs`: request/response bodies and path parsing
//! - `errors.rs`: error to status mapping and the JSON error body

use std::sync::Arc;

use axum::{Extension, Router, response::Response, routing::get};
use tower::ServiceBuilder;

use consignment_auth::{Hs256JwtValidator, JwtValidator};
use consignment_engine::{ConsignmentEngine, EngineConfig, EngineResult};

use crate::config::ApiConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: Arc<ConsignmentEngine>,
}

impl AppState {
    pub fn new(engine: Arc<ConsignmentEngine>) -> Self {
        Self { engine }
    }

    /// Run an engine call on the blocking pool. The engine is synchronous and
    /// the Postgres store blocks on the runtime handle, so no engine call may
    /// run on an async worker thread.
    pub async fn run<T, F>(&self, f: F) -> errors::ApiResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&ConsignmentEngine) -> EngineResult<T> + Send + 'static,
    {
        let engine = self.engine.clone();
        match tokio::task::spawn_blocking(move || f(&engine)).await {
            Ok(result) => result.map_err(errors::engine_error_to_response),
            Err(join) => {
                tracing::error!(error = %join, "engine task failed");
                Err(errors::json_error(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "engine task failed",
                ))
            }
        }
    }
}

/// Build the full HTTP router from process configuration (entrypoint used by
/// `main.rs`).
pub async fn build_app(config: &ApiConfig) -> anyhow::Result<Router> {
    let engine_config = EngineConfig::default().with_max_attempts(config.retry_max_attempts);
    let engine = build_engine(config, engine_config).await?;
    let jwt = Arc::new(Hs256JwtValidator::new(config.jwt_secret.as_bytes()));
    Ok(router(Arc::new(engine), jwt))
}

/// The router around an existing engine.
pub fn router(engine: Arc<ConsignmentEngine>, jwt: Arc<dyn JwtValidator>) -> Router {
    let auth_state = middleware::AuthState { jwt };

    // Protected routes: require auth + tenant context.
    let protected = routes::router()
        .layer(Extension(AppState::new(engine)))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}

#[cfg(not(feature = "postgres"))]
async fn build_engine(config: &ApiConfig, engine_config: EngineConfig) -> anyhow::Result<ConsignmentEngine> {
    if config.database_url.is_some() {
        tracing::warn!("DATABASE_URL is set but this build has no postgres support; events stay in memory");
    }
    Ok(ConsignmentEngine::in_memory(engine_config))
}

#[cfg(feature = "postgres")]
async fn build_engine(config: &ApiConfig, engine_config: EngineConfig) -> anyhow::Result<ConsignmentEngine> {
    use anyhow::Context;
    use consignment_engine::InMemorySupplierDirectory;
    use consignment_infra::{event_store::PostgresEventStore, folio::PostgresFolioSequencer};

    let Some(url) = config.database_url.as_deref() else {
        tracing::info!("DATABASE_URL not set; events stay in memory");
        return Ok(ConsignmentEngine::in_memory(engine_config));
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("connecting to DATABASE_URL")?;

    let store = PostgresEventStore::new(pool.clone());
    store.migrate().await.context("creating the events table")?;
    let folios = PostgresFolioSequencer::new(pool);
    folios.migrate().await.context("creating the folio counters table")?;

    tracing::info!("using the postgres event store");
    Ok(ConsignmentEngine::new(
        Arc::new(store),
        Arc::new(folios),
        Arc::new(InMemorySupplierDirectory::new()),
        engine_config,
    ))
}
