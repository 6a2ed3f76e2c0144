//! src/api/mod.rs
//!
//! The HTTP surface a node exposes: peer-exchange endpoints,
//! the control plane (`/start_node`, `/stop_node`, `/reset_node`), and
//! the read-only endpoints the quorum-read protocol and external
//! monitoring poll (`/metadata`, `/get_recent_data_from_node`).
//!
//! Every handler is a thin translation from the wire shapes in
//! `api::protocol` to the native types the rest of the crate uses, then a
//! call into `NodeRegistry`/`Store`. Handler-level failures surface
//! through `ApiError` (`crate::error`) rather than leaking a panic.

pub mod protocol;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::domain::Snapshot;
use crate::engine::protocol::{self, ExchangeResult};
use crate::error::ApiError;
use crate::node::NodeRegistry;

use protocol::{IncRoundQuery, ReceiveMetadataRequest, StartNodeRequest};

/// HTTP server for one node's §6 surface. Holds a shared `NodeRegistry`
/// so a `/start_node`/`/stop_node`/`/reset_node` cycle rebinds the same
/// listener to a fresh session rather than restarting the process.
pub struct ApiServer {
    bind_addr: SocketAddr,
    registry: Arc<NodeRegistry>,
}

impl ApiServer {
    pub fn new(bind_addr: SocketAddr, registry: Arc<NodeRegistry>) -> Self {
        Self { bind_addr, registry }
    }

    pub fn router(registry: Arc<NodeRegistry>) -> Router {
        Router::new()
            .route("/hello_world", get(hello_world))
            .route("/start_node", post(start_node))
            .route("/stop_node", get(stop_node))
            .route("/reset_node", get(reset_node))
            .route("/receive_metadata", post(receive_metadata))
            .route("/receive_message", get(receive_message))
            .route("/metadata", get(metadata))
            .route("/get_recent_data_from_node", get(get_recent_data_from_node))
            .layer(TraceLayer::new_for_http())
            .with_state(registry)
    }

    pub async fn run(self, shutdown_token: CancellationToken) -> crate::error::Result<()> {
        let app = Self::router(self.registry);

        tracing::info!(listen_addr = %self.bind_addr, "HTTP surface listening");
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_token.cancelled().await;
                tracing::info!("HTTP surface received shutdown signal");
            })
            .await?;

        Ok(())
    }
}

async fn hello_world() -> &'static str {
    "Hello from gossip agent!"
}

async fn start_node(
    State(registry): State<Arc<NodeRegistry>>,
    Json(request): Json<StartNodeRequest>,
) -> Result<StatusOk, ApiError> {
    registry.start(request.into_start_params()).await?;
    Ok(StatusOk)
}

async fn stop_node(State(registry): State<Arc<NodeRegistry>>) -> Result<StatusOk, ApiError> {
    registry.stop().await?;
    Ok(StatusOk)
}

async fn reset_node(State(registry): State<Arc<NodeRegistry>>) -> Result<StatusOk, ApiError> {
    registry.reset().await?;
    Ok(StatusOk)
}

/// `POST /receive_metadata`: message 1 of the peer-exchange protocol.
/// Ingests the initiator's self-record, then replies with the keys
/// this node wants plus any fresher records it holds.
async fn receive_metadata(
    State(registry): State<Arc<NodeRegistry>>,
    Json(request): Json<ReceiveMetadataRequest>,
) -> Result<Json<ExchangeResult>, ApiError> {
    let handles = registry.handles().await?;
    let cycle = handles.cycle.load(std::sync::atomic::Ordering::Acquire);
    let result = protocol::handle_receive_metadata(
        &handles.store,
        cycle,
        &request.self_key,
        &request.metadata,
        &request.record,
    )?;
    Ok(Json(result))
}

/// `GET /receive_message?inc_round=<N>`: message 3 of the peer-exchange
/// protocol — the initiator delivering the records this node requested.
async fn receive_message(
    State(registry): State<Arc<NodeRegistry>>,
    Query(params): Query<IncRoundQuery>,
    Json(updates): Json<Snapshot>,
) -> Result<StatusOk, ApiError> {
    let handles = registry.handles().await?;
    let cycle = handles.cycle.load(std::sync::atomic::Ordering::Acquire);
    protocol::handle_receive_message(&handles.store, cycle, params.inc_round, updates)?;
    Ok(StatusOk)
}

/// `GET /metadata`: snapshot metadata (counter + digest) at the current
/// `time_key`, consumed by the quorum-read protocol.
async fn metadata(
    State(registry): State<Arc<NodeRegistry>>,
) -> Result<Json<crate::quorum::MetadataResponse>, ApiError> {
    let handles = registry.handles().await?;
    let k = handles
        .store
        .latest_time_key()
        .ok_or(crate::error::Error::NodeNotRunning)?;
    Ok(Json(handles.store.metadata_with_digest(k)?))
}

/// `GET /get_recent_data_from_node`: the latest snapshot's full content,
/// fetched by the quorum-read protocol once counter+digest agreement is
/// reached.
async fn get_recent_data_from_node(
    State(registry): State<Arc<NodeRegistry>>,
) -> Result<Json<Snapshot>, ApiError> {
    let handles = registry.handles().await?;
    Ok(Json(handles.store.latest_snapshot().unwrap_or_default()))
}

/// A bare `200 OK` body, matching the original's plain-text `"OK"`
/// responses from `/stop_node` and `/reset_node`.
struct StatusOk;

impl IntoResponse for StatusOk {
    fn into_response(self) -> Response {
        "OK".into_response()
    }
}
