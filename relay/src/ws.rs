//! WebSocket subscriptions to distributor channels.

use crate::transport::WsSubscriber;
use crate::RelayState;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use objdist_sync::{ChannelMessage, PROTOCOL_VERSION};
use objdist_types::{Keypath, PeerId};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Response header carrying the protocol version on a WebSocket upgrade.
pub const PROTOCOL_HEADER: &str = "x-objdist-protocol";

// Channel lookup comes before the upgrade check so unknown channels are a
// plain 404.
pub(crate) async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<Arc<RelayState>>,
    Path(channel): Path<String>,
) -> Response {
    let keypath = {
        let distributor = state.distributor().lock().await;
        let name = format!("{}{}", distributor.config().delimiter, channel);
        match distributor.keypath_for_channel(&name) {
            Some(keypath) if distributor.has_channel(&keypath) => keypath,
            _ => return StatusCode::NOT_FOUND.into_response(),
        }
    };
    match ws {
        Ok(ws) => {
            let mut response = ws.on_upgrade(move |socket| handle_socket(socket, state, keypath));
            response
                .headers_mut()
                .insert(PROTOCOL_HEADER, HeaderValue::from(PROTOCOL_VERSION));
            response
        }
        Err(rejection) => rejection.into_response(),
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<RelayState>, keypath: Keypath) {
    let peer = PeerId::new();
    let (mut sender, mut receiver) = socket.split();

    // Subscribe and snapshot under one lock, so the snapshot and the first
    // update cannot interleave with another mutation.
    let (subscriber, mut direct) = WsSubscriber::new();
    let updates = {
        let distributor = state.distributor().lock().await;
        let updates = distributor.channel(&keypath).and_then(|c| c.subscribe());
        if updates.is_some() {
            distributor.on_connect(&keypath, &subscriber);
        }
        updates
    };
    let Some(mut updates) = updates else {
        debug!(%peer, %keypath, "channel vanished before upgrade");
        if let Some(frame) = encode(&ChannelMessage::Close) {
            let _ = sender.send(frame).await;
        }
        return;
    };
    info!(%peer, %keypath, "subscriber connected");

    let mut send_task = tokio::spawn(async move {
        if let Some(frame) = direct.recv().await.as_ref().and_then(encode) {
            if sender.send(frame).await.is_err() {
                return;
            }
        }
        loop {
            let message = match updates.recv().await {
                Ok(message) => message,
                Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(missed)) => {
                    warn!(%peer, missed, "subscriber lagged, disconnecting");
                    break;
                }
            };
            let is_close = message == ChannelMessage::Close;
            let Some(frame) = encode(&message) else {
                continue;
            };
            if sender.send(frame).await.is_err() || is_close {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let recv_state = state.clone();
    let recv_keypath = keypath.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(frame)) = receiver.next().await {
            let Message::Text(text) = frame else {
                continue;
            };
            match ChannelMessage::decode(text.as_str()) {
                Ok(ChannelMessage::Update(payload)) => {
                    let applied = recv_state
                        .distributor()
                        .lock()
                        .await
                        .apply_remote(&recv_keypath, &payload);
                    debug!(%peer, applied, "applied update from subscriber");
                }
                Ok(other) => debug!(%peer, event = other.event_name(), "ignoring inbound event"),
                Err(e) => warn!(%peer, error = %e, "malformed inbound frame"),
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    info!(%peer, %keypath, "subscriber disconnected");
}

// Messages that fail to encode are dropped rather than sent as empty frames.
fn encode(message: &ChannelMessage) -> Option<Message> {
    match message.encode() {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            warn!(event = message.event_name(), error = %e, "failed to encode message");
            None
        }
    }
}
