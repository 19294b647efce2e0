//! Server startup and lifecycle

use crate::config::API_PREFIX;
use crate::{routes, AppState, GatewayConfig};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Run the gateway server
pub async fn run_server(config: GatewayConfig) -> anyhow::Result<()> {
    run_server_with_shutdown(config, std::future::pending()).await
}

/// Run server with graceful shutdown
pub async fn run_server_with_shutdown(
    config: GatewayConfig,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(config.clone()).await?);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;

    serve(listener, state, shutdown_signal).await
}

/// Serve an assembled state on a bound listener
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let mount = state.config.normalized_mount_path();
    let provider_mount = state.config.normalized_provider_mount_path();
    let app = routes::create_router(state);

    info!(
        addr = %listener.local_addr()?,
        mount = %mount,
        provider_mount = %provider_mount,
        api = %format!("{}/v1", API_PREFIX),
        "Canopy gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Gateway shutdown complete");

    Ok(())
}
