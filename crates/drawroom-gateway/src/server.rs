//! Axum-based WebSocket server.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{ConnectInfo, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::connection::handle_ws_connection;
use crate::state::GatewayState;

/// Build the HTTP router: `/ws`, `/health`, optional `/metrics`, and the
/// embedded client at `/` when the UI is enabled.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    let ui_enabled = state.gateway.ui;

    // /ws and /health are registered first so they take priority over the UI catch-all
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler));

    #[cfg(feature = "metrics")]
    let app = app.route("/metrics", get(metrics_handler));

    let mut app = app.with_state(state);

    if ui_enabled {
        app = app.merge(drawroom_web::ui_router());
    }

    app.layer(TraceLayer::new_for_http())
}

/// Bind the configured address and serve until Ctrl-C.
pub async fn start_gateway(state: Arc<GatewayState>) -> anyhow::Result<()> {
    let bind_addr = state
        .gateway
        .bind
        .clone()
        .unwrap_or_else(|| "0.0.0.0".to_string());
    let port = state.gateway.port;

    let addr = format!("{bind_addr}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("Gateway listening on {addr}");
    if state.gateway.ui {
        info!("Whiteboard available at http://{addr}/");
    }

    serve(state, listener, shutdown_signal()).await
}

/// Serve on an already-bound listener until `shutdown` resolves.
///
/// Open WebSocket connections are told to close when shutdown begins so each
/// one runs its room teardown.
pub async fn serve<F>(state: Arc<GatewayState>, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let token = state.shutdown.clone();
    let app = build_router(state);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown.await;
        token.cancel();
    })
    .await?;

    Ok(())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<GatewayState>>,
) -> Response {
    let permit = match &state.limiter {
        Some(limiter) => match limiter.try_acquire(addr.ip()) {
            Some(permit) => Some(permit),
            None => {
                return (StatusCode::TOO_MANY_REQUESTS, "Too many connections").into_response();
            }
        },
        None => None,
    };

    ws.max_message_size(state.gateway.max_message_bytes)
        .on_upgrade(move |socket| handle_ws_connection(state, socket, permit))
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let version = env!("CARGO_PKG_VERSION");
    let rooms = state.registry.room_count().await;

    axum::Json(json!({
        "status": "ok",
        "version": version,
        "connections": state.open_connections(),
        "rooms": rooms,
    }))
}

#[cfg(feature = "metrics")]
async fn metrics_handler(State(state): State<Arc<GatewayState>>) -> Response {
    match &state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "Metrics recorder not installed").into_response(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(%e, "Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
