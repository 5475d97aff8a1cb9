use crate::config::SignalingServerConfig;
use crate::connection::{write_outbound, ConnectionId, PeerHandle, WsInbound};
use crate::registry::PeerRegistry;
use crate::services::session::run_peer_session;
use shared::models::{HealthResponse, RegistryStatusResponse};

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::StreamExt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Clone)]
struct AppState {
    registry: Arc<PeerRegistry>,
    config: Arc<SignalingServerConfig>,
    next_connection_id: Arc<AtomicU64>,
}

impl AppState {
    fn new(config: SignalingServerConfig) -> Self {
        Self {
            registry: Arc::new(PeerRegistry::new(config.max_clients)),
            config: Arc::new(config),
            next_connection_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn connection_id(&self) -> ConnectionId {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }
}

pub async fn run_server(config: SignalingServerConfig) -> anyhow::Result<()> {
    let listen_addr = config.listen_addr;
    let listener = TcpListener::bind(listen_addr).await?;
    info!(address = %listen_addr, "Starting signaling server");
    serve(listener, config, shutdown_signal()).await
}

/// Serves on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    config: SignalingServerConfig,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = router(AppState::new(config));
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/ws", get(ws_upgrade))
        .route("/health", get(healthcheck))
        .route("/status", get(status))
        .with_state(state)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

// Root handler for "/": websocket peers and plain HTTP health checks share it.
async fn root(
    State(state): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    match ws {
        Some(ws) => upgrade(ws, state, remote_addr),
        None => (StatusCode::OK, "Server OK!").into_response(),
    }
}

async fn ws_upgrade(
    State(state): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(ws, state, remote_addr)
}

fn upgrade(ws: WebSocketUpgrade, state: AppState, remote_addr: SocketAddr) -> Response {
    ws.on_upgrade(move |socket| handle_ws(socket, state, remote_addr))
}

async fn handle_ws(socket: WebSocket, state: AppState, remote_addr: SocketAddr) {
    let (sink, stream) = socket.split();
    let (handle, frames) = PeerHandle::channel(state.connection_id(), remote_addr);
    // Ends by itself once the session and the registry drop their handles.
    tokio::spawn(write_outbound(sink, frames));

    run_peer_session(
        WsInbound::new(stream),
        handle,
        &state.registry,
        state.config.keepalive_timeout,
    )
    .await;
}

async fn healthcheck(State(state): State<AppState>) -> impl IntoResponse {
    let table = state.registry.read().await;
    let body = HealthResponse {
        media_registered: table.media_server().is_some(),
        clients: table.client_count(),
        keepalive_timeout_secs: state.config.keepalive_timeout.as_secs(),
    };
    (StatusCode::OK, Json(body))
}

async fn status(State(state): State<AppState>) -> (StatusCode, Json<RegistryStatusResponse>) {
    (StatusCode::OK, Json(state.registry.snapshot().await))
}
