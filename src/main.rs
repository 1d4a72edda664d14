// src/main.rs
use anyhow::Result;
use rust_healthcheck::{
    config,
    health::Registry,
    metrics::MetricsRegistry,
    server::{HealthService, ServerBuilder},
};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rust_healthcheck=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "healthcheck.yaml".to_string());

    info!("Loading configuration from: {}", config_path);
    let config = config::load_config(&config_path).await?;

    let registry = Arc::new(Registry::new());
    for check in &config.checks {
        check.register(&registry);
    }

    let mut service = HealthService::new(registry.clone(), config.endpoints.clone());
    if config.metrics.enabled {
        let metrics = Arc::new(MetricsRegistry::new()?);
        service = service.with_metrics(metrics, &config.metrics);
        info!("Serving metrics on {}", config.metrics.path);
    }

    info!(
        "Serving {} and {} on {}",
        config.endpoints.live_path, config.endpoints.ready_path, config.listen
    );

    ServerBuilder::new(config.listen)
        .with_handler(service)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    registry.shutdown();
    Ok(())
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
