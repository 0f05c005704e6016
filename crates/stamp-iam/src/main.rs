//! Stamp IAM Service Binary

use std::net::SocketAddr;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stamp_iam::{router, AppState, IamConfig, IAM_VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().json())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting Stamp IAM Service v{}", IAM_VERSION);

    // Load configuration
    let config = IamConfig::load()?;
    info!(
        host = %config.host,
        port = config.port,
        scorer = %config.scorer.endpoint,
        chains = %config.attestation.chain_config_path,
        provider_timeout_ms = config.provider_timeout_ms,
        "Loaded configuration"
    );

    let state = AppState::from_config(&config).await?;
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("IAM server listening on {}", addr);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Shutting down IAM service");
    Ok(())
}
