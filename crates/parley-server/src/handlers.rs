//! Connection handlers for the Parley server.
//!
//! This module wires the hub to axum: it upgrades WebSocket requests, runs
//! the per-connection reader loop and spawns the writer task.

use crate::api;
use crate::catalog::Catalog;
use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard, MeteredBroker, MeteredSink};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::StreamExt;
use parley_broker::RedisStreamGateway;
use parley_core::{Broker, DisabledBroker, Hub, SessionId};
use parley_transport::run_writer;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Inbound WebSocket messages larger than this many times the configured
/// frame limit close the connection instead of getting an error reply.
const HARD_LIMIT_FACTOR: usize = 4;

/// Shared server state.
pub struct AppState {
    /// The session hub.
    pub hub: Hub,
    /// Users and message history for the REST API.
    pub catalog: Arc<Catalog>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Build the broker, hub and catalog for `config`.
    ///
    /// An unreachable broker is logged and otherwise ignored; the gateway
    /// keeps retrying in the background of later publishes.
    pub async fn initialize(config: Config) -> Arc<Self> {
        let broker = connect_broker(&config).await;
        let catalog = Arc::new(Catalog::new(config.catalog.history_limit));
        let hub = Hub::new(config.hub_config(), broker).with_presence_hook(catalog.clone());

        Arc::new(Self {
            hub,
            catalog,
            config,
        })
    }

    /// Flush the broker publisher.
    pub async fn shutdown(&self) {
        self.hub.shutdown(self.config.broker.flush_timeout()).await;
    }
}

async fn connect_broker(config: &Config) -> Arc<dyn Broker> {
    if !config.broker.enabled {
        info!("Broker disabled, chat messages will not be queued");
        return Arc::new(DisabledBroker);
    }

    let gateway: Arc<dyn Broker> = match RedisStreamGateway::new(config.broker.clone()) {
        Ok(gateway) => Arc::new(MeteredBroker::new(Arc::new(gateway))),
        Err(e) => {
            error!(error = %e, "Invalid broker configuration, chat messages will not be queued");
            return Arc::new(DisabledBroker);
        }
    };

    match gateway.connect().await {
        Ok(()) => info!(queue = %config.broker.queue, "Broker connected"),
        Err(e) => warn!(
            url = %config.broker.url,
            error = %e,
            "Broker unavailable at startup, continuing without it"
        ),
    }

    gateway
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .merge(api::routes())
        .with_state(state)
}

/// Run the HTTP/WebSocket server until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let state = AppState::initialize(config).await;
    let app = router(state.clone());

    // Bind and serve
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Parley server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, state.config.transport.websocket_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    state.shutdown().await;
    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    if state.hub.session_count() >= state.config.limits.max_connections {
        warn!(
            limit = state.config.limits.max_connections,
            "Connection limit reached"
        );
        metrics::record_rejected_connection();
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    }

    let hard_limit = state
        .config
        .limits
        .max_message_size
        .saturating_mul(HARD_LIMIT_FACTOR);

    ws.max_message_size(hard_limit)
        .on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (id, outbox) = state.hub.connect();
    let (sender, mut receiver) = socket.split();

    let writer = tokio::spawn(async move {
        if let Err(e) = run_writer(outbox, MeteredSink::new(sender)).await {
            debug!(connection = %id, error = %e, "Writer ended with error");
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => handle_data(&state, id, text.as_bytes()),
            Ok(Message::Binary(data)) => handle_data(&state, id, &data),
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                debug!(connection = %id, "Received close frame");
                break;
            }
            Err(e) => {
                warn!(connection = %id, error = %e, "WebSocket error");
                metrics::record_error("websocket");
                break;
            }
        }
    }

    state.hub.disconnect(id);

    // The registry held the last outbox sender, so the writer drains and stops.
    if let Err(e) = writer.await {
        error!(connection = %id, error = %e, "Writer task failed");
    }

    debug!(connection = %id, "WebSocket disconnected");
}

fn handle_data(state: &AppState, id: SessionId, data: &[u8]) {
    metrics::record_message(data.len(), "inbound");
    let outcome = state.hub.handle_inbound(id, data);
    metrics::record_outcome(&outcome);
}
