use anyhow::{Context, Result};
use axum::{routing::get, Router};
use envconfig::Envconfig;
use futures::future::ready;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use deduper::config::Config;
use deduper::metrics_server::{serve, setup_metrics_routes};
use deduper::service::DeduperService;

pub async fn index() -> &'static str {
    "deduper"
}

fn start_server(config: &Config) -> Result<JoinHandle<()>> {
    let router = Router::new()
        .route("/", get(index))
        .route("/_liveness", get(|| ready("ok")));
    let router = setup_metrics_routes(router).context("Failed to install metrics recorder")?;

    let bind = config.bind_address();

    Ok(tokio::task::spawn(async move {
        if let Err(e) = serve(router, &bind).await {
            error!("Failed to serve metrics on {bind}: {e:#}");
        }
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::init_from_env()
        .context("Failed to load configuration from environment variables")?;

    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Deduper starting");
    info!(
        nats_url = %config.nats_url,
        redis_addr = %config.redis_addr,
        cache_time = config.cache_time,
        intake_capacity = config.intake_capacity,
        price_scale = config.price_scale,
        "Configuration loaded"
    );

    let server_handle = start_server(&config)?;
    info!("Started metrics server on {}", config.bind_address());

    let service = DeduperService::connect(config).await?;
    service.run().await?;

    server_handle.abort();

    Ok(())
}
