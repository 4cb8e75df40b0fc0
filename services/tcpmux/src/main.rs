//! tcpmux
//!
//! Single-port TCP multiplexer.
//!
//! This service:
//! - Accepts TCP connections on one bind address
//! - Classifies each connection by its leading bytes (HTTP, TLS, anything else)
//! - Forwards the raw byte stream to the backend configured for that class
//! - Optionally prefixes the forwarded stream with a PROXY protocol v2 header
//! - Drains open sessions on interrupt before exiting

use std::future::Future;
use std::io;

use anyhow::{Context, Result};
use tcpmux::{legal, Config, Mux};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_args();

    if config.legal {
        print!("{}", legal::notices());
        return Ok(());
    }

    // Initialize tracing (prefer RUST_LOG, fallback to TCPMUX_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting tcpmux");

    let target = config.target();
    info!(
        bind = %config.bind,
        http = ?target.http.backend(),
        http_proxy = target.http.proxy_protocol,
        tls = ?target.tls.backend(),
        tls_proxy = target.tls.proxy_protocol,
        rest = ?target.rest.backend(),
        rest_proxy = target.rest.proxy_protocol,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!(bind_addr = %listener.local_addr()?, "Listening");

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), cancel.clone()));

    Mux::new(config.mux_options())
        .serve(cancel, listener, &target)
        .await;

    info!("Shutdown complete");
    Ok(())
}

/// Cancel once `signal` resolves. Failing to listen for the signal cancels
/// too.
async fn cancel_on_signal<F>(signal: F, cancel: CancellationToken)
where
    F: Future<Output = io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal, shutting down"),
    }
    cancel.cancel();
}
