//! Price Oracle HTTP Server
//!
//! Serves one oracle instance over HTTP/JSON.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use price_oracle::cli::oracle_from_config;
use price_oracle::oracle::OracleConfig;
use price_oracle::rpc::router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config_path = std::env::var("ORACLE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| OracleConfig::default_path());

    let config = if config_path.exists() {
        OracleConfig::load(&config_path)
            .with_context(|| format!("failed to load {}", config_path.display()))?
            .with_env_overrides()
    } else {
        tracing::warn!(path = %config_path.display(), "config file not found, using environment");
        OracleConfig::from_env()
    };
    config.validate()?;

    let oracle = Arc::new(oracle_from_config(&config)?);
    let app = router(oracle);

    let addr: SocketAddr = std::env::var("ORACLE_BIND")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()
        .context("invalid ORACLE_BIND address")?;

    info!("Starting price oracle server on {}", addr);
    info!("  GET    /health               - Health and statistics");
    info!("  GET    /price                - Latest aggregate");
    info!("  GET    /prices               - Live source samples");
    info!("  GET    /sources              - Registered sources");
    info!("  POST   /sources              - Register a source");
    info!("  GET    /sources/:id          - One source");
    info!("  DELETE /sources/:id          - Remove a source");
    info!("  PUT    /sources/:id/weight   - Change weight");
    info!("  PUT    /sources/:id/active   - Activate or deactivate");
    info!("  POST   /recompute            - Publish a new aggregate");
    info!("  POST   /deviation/check      - Check a candidate price");
    info!("  PUT    /deviation/threshold  - Change deviation threshold");
    info!("  POST   /roles/grant          - Grant a role");
    info!("  POST   /roles/revoke         - Revoke a role");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}
