use anyhow::Context;

use consignment_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    consignment_observability::init();

    let config = ApiConfig::from_env()?;
    tracing::info!(?config, "starting consignment api");

    let app = consignment_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
