//! ServerSpy agent entry point.
//!
//! Initialises tracing, loads configuration from `SERVERSPY_*` environment
//! variables, loads the upload trust roots and serves the task endpoint
//! over HTTP or HTTPS.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use tracing_subscriber::EnvFilter;

use serverspy_agent::server;
use serverspy_agent::state::AppState;
use serverspy_agent::upload::{TlsUploadConnector, UploadConnector};
use serverspy_common::AgentConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // axum-server and the upload connector share one process-wide provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "serverspy-agent starting");

    let config: AgentConfig = envy::prefixed("SERVERSPY_")
        .from_env()
        .context("failed to load config from SERVERSPY_* env vars")?;

    let uploader = TlsUploadConnector::from_config(&config)
        .context("failed to initialise upload transport")?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        api_base = %config.api_base,
        upload = %uploader.target(),
        tls_enabled = config.tls_cert.is_some() && config.tls_key.is_some(),
        "configuration loaded",
    );

    let addr = config.listen_addr;
    let tls = config.tls_cert.clone().zip(config.tls_key.clone());
    let state = Arc::new(AppState::new(config, uploader).context("failed to build agent state")?);
    let router = server::router(state);

    if let Some((cert_path, key_path)) = tls {
        tracing::info!(cert = %cert_path, "TLS enabled");
        let tls_config = RustlsConfig::from_pem_file(&cert_path, &key_path)
            .await
            .context("failed to load TLS certificates")?;

        tracing::info!("agent ready on https://{addr}");
        axum_server::bind_rustls(addr, tls_config)
            .serve(router.into_make_service())
            .await
            .context("HTTPS server error")?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context("failed to bind TCP listener")?;

        tracing::info!("agent ready on http://{addr} (TLS disabled)");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server error")?;
    }

    tracing::info!("serverspy-agent shut down");
    Ok(())
}

/// Wait for SIGINT (Ctrl-C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}
