//! HTTP and WebSocket front end for an objdist distributor.
//!
//! The tree is read and written over a small JSON API; each channel is
//! served as a WebSocket at `/ws/<channel name without the leading
//! delimiter>`, e.g. `/ws/root/man` for the channel `/root/man`.

pub mod transport;
mod ws;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use objdist_sync::{Distributor, SyncConfig, SyncError, SyncResult};
use objdist_types::{Delimiter, Keypath};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub use transport::{WsChannel, WsSubscriber, WsTransport};
pub use ws::PROTOCOL_HEADER;

/// Shared state of the relay: one distributor behind an async lock, so
/// every mutation and its broadcasts complete as one step.
#[derive(Debug)]
pub struct RelayState {
    distributor: Mutex<Distributor<WsTransport>>,
}

impl RelayState {
    pub fn new(transport: WsTransport, config: SyncConfig) -> SyncResult<Self> {
        Ok(Self {
            distributor: Mutex::new(Distributor::new(transport, config)?),
        })
    }

    pub fn distributor(&self) -> &Mutex<Distributor<WsTransport>> {
        &self.distributor
    }

    /// Closes every channel so connected sockets receive `close`.
    pub async fn shutdown(&self) {
        self.distributor.lock().await.close_all_channels();
    }
}

/// Response body of `GET /api/v1/channels`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChannelList {
    pub channels: Vec<String>,
}

/// Build the HTTP API router with the given relay state.
pub fn build_router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/api/v1/tree", get(get_tree).put(put_tree))
        .route(
            "/api/v1/tree/{*keypath}",
            get(get_keypath).put(put_keypath).delete(delete_keypath),
        )
        .route("/api/v1/channels", get(list_channels))
        .route("/ws/{*channel}", get(ws::ws_handler))
        .with_state(state)
}

/// URL paths always use `/`, whatever delimiter the channels use.
fn url_keypath(path: &str) -> Keypath {
    Keypath::parse(path, &Delimiter::default())
}

struct ApiError(SyncError);

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            SyncError::Store(_) | SyncError::Key(_) | SyncError::Config(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.0.to_string()).into_response()
    }
}

async fn get_tree(State(state): State<Arc<RelayState>>) -> Json<Value> {
    Json(state.distributor.lock().await.get_object().clone())
}

async fn get_keypath(
    State(state): State<Arc<RelayState>>,
    Path(keypath): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let distributor = state.distributor.lock().await;
    distributor
        .get_object_at_keypath(&url_keypath(&keypath))
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn put_tree(
    State(state): State<Arc<RelayState>>,
    Json(tree): Json<Value>,
) -> Result<StatusCode, ApiError> {
    state.distributor.lock().await.set_tree(tree)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn put_keypath(
    State(state): State<Arc<RelayState>>,
    Path(keypath): Path<String>,
    Json(value): Json<Value>,
) -> Result<StatusCode, ApiError> {
    let keypath = url_keypath(&keypath);
    debug!(%keypath, "set via api");
    state
        .distributor
        .lock()
        .await
        .set_value_at_keypath(Some(value), &keypath)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_keypath(
    State(state): State<Arc<RelayState>>,
    Path(keypath): Path<String>,
) -> Result<StatusCode, ApiError> {
    let keypath = url_keypath(&keypath);
    debug!(%keypath, "delete via api");
    state
        .distributor
        .lock()
        .await
        .set_value_at_keypath(None, &keypath)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_channels(State(state): State<Arc<RelayState>>) -> Json<ChannelList> {
    let distributor = state.distributor.lock().await;
    let channels = distributor
        .channel_keypaths()
        .iter()
        .map(|keypath| distributor.channel_name(keypath))
        .collect();
    Json(ChannelList { channels })
}
