//! HTTP server lifecycle: bind, serve until shutdown, and the process shutdown signal.

use anyhow::{Context, Result};
use axum::Router;
use std::future::Future;
use tokio::net::TcpListener;

/// Bind `bind:port`. A port that is already taken gets its own error message.
pub async fn bind_listener(bind: &str, port: u16) -> Result<TcpListener> {
    let bind_addr = format!("{}:{}", bind.trim(), port);
    match TcpListener::bind(&bind_addr).await {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            log::error!("port {} is already in use", port);
            Err(e).with_context(|| format!("port {} is already in use", port))
        }
        Err(e) => Err(e).with_context(|| format!("binding to {}", bind_addr)),
    }
}

/// Serve `app` on `listener` until `shutdown` resolves, then drain open connections.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        log::info!("server running on {}", addr);
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server exited")?;
    log::info!("http server stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
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
    log::info!("shutdown signal received, draining connections");
}
