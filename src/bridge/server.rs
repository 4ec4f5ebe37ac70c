use crate::bridge::{Bridge, BridgeRequest, BridgeResponse};
use crate::error::{Result, ShellError};
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use std::net::SocketAddr;
use tracing::{error, info, warn};

/// HTTP transport: `POST /bridge` with one request per body
pub fn router(bridge: Bridge) -> Router {
    Router::new()
        .route("/bridge", post(handle_bridge_request))
        .route("/health", get(health_check))
        .with_state(bridge)
}

/// Serve the bridge on `addr` until Ctrl-C
pub async fn serve(bridge: Bridge, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ShellError::Configuration(format!("Failed to bind {}: {}", addr, e)))?;

    info!(%addr, "Bridge listening on http://{}/bridge", addr);

    if let Err(e) = axum::serve(listener, router(bridge))
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Bridge server failed");
        return Err(ShellError::Configuration(format!("Server error: {}", e)));
    }

    info!("Bridge server stopped");
    Ok(())
}

/// Run one request on the blocking pool and wait for its response.
///
/// Disk I/O inside the bridge is synchronous, so it must not run on the
/// async worker threads.
pub async fn dispatch_blocking(bridge: &Bridge, request: BridgeRequest) -> BridgeResponse {
    let bridge = bridge.clone();
    match tokio::task::spawn_blocking(move || bridge.handle(request)).await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "Bridge task panicked");
            BridgeResponse::failure_message("internal", format!("Bridge task failed: {}", e))
        }
    }
}

// A body that does not parse still gets an envelope, same as on stdio
async fn handle_bridge_request(
    State(bridge): State<Bridge>,
    payload: std::result::Result<Json<BridgeRequest>, JsonRejection>,
) -> Json<BridgeResponse> {
    match payload {
        Ok(Json(request)) => Json(dispatch_blocking(&bridge, request).await),
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Malformed bridge request");
            Json(BridgeResponse::failure_message(
                "invalidRequest",
                format!("Malformed request: {}", rejection.body_text()),
            ))
        }
    }
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => {
            warn!(error = %e, "Could not listen for Ctrl-C; running until killed");
            std::future::pending::<()>().await;
        }
    }
}
