use std::sync::Arc;

use anyhow::Context;

use sweeper_api::app::{self, services::AppServices};
use sweeper_infra::SweeperConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sweeper_observability::init();

    let config = SweeperConfig::from_env().context("invalid SWEEPER_* configuration")?;
    let services = AppServices::connect(&config).context("failed to set up redis clients")?;
    tracing::info!(
        namespace = %config.namespace,
        maximum = config.cleaner.maximum,
        "cleaner ready"
    );

    let app = app::build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
