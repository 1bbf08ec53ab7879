use std::sync::Arc;

use anyhow::Context;

use sampler_infra::{SamplerConfig, TokioScheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sampler_observability::init();

    let config = SamplerConfig::from_env()?;
    let scheduler = TokioScheduler::new();
    let services = sampler_api::app::services::build_services(&config, Arc::new(scheduler.clone()))
        .await
        .context("failed to start survey agent")?;

    let app = sampler_api::app::build_app(services);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        collector_url = %config.collector_url,
        "survey agent listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    scheduler.shutdown();
    tracing::info!("survey agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
