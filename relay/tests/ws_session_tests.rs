use futures::{SinkExt, StreamExt};
use objdist_relay::{PROTOCOL_HEADER, RelayState, WsTransport, build_router};
use objdist_sync::{ChannelMessage, ChannelPayload, PROTOCOL_VERSION, SyncConfig};
use objdist_types::Keypath;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

fn kp(text: &str) -> Keypath {
    Keypath::new(text.split('/').filter(|s| !s.is_empty()))
}

async fn seeded_state(tree: Value) -> Arc<RelayState> {
    let state = Arc::new(RelayState::new(WsTransport::default(), SyncConfig::default()).unwrap());
    state.distributor().lock().await.set_tree(tree).unwrap();
    state
}

/// Spin up the relay on an OS-assigned port, returning `host:port`.
async fn spawn_test_server(state: Arc<RelayState>) -> String {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr.to_string()
}

async fn connect(addr: &str, channel: &str) -> Client {
    let (client, response) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/{channel}"))
        .await
        .unwrap();
    let version = response.headers().get(PROTOCOL_HEADER).unwrap();
    assert_eq!(version.to_str().unwrap(), PROTOCOL_VERSION.to_string());
    client
}

/// Next channel message, skipping control frames.
async fn next_message(client: &mut Client) -> ChannelMessage {
    loop {
        let frame = tokio::time::timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket ended")
            .unwrap();
        if let Message::Text(_) = frame {
            return ChannelMessage::decode(frame.to_text().unwrap()).unwrap();
        }
    }
}

async fn next_update(client: &mut Client) -> ChannelPayload {
    match next_message(client).await {
        ChannelMessage::Update(payload) => payload,
        other => panic!("expected update, got {other:?}"),
    }
}

async fn send_text(client: &mut Client, text: &str) {
    client.send(Message::text(text.to_string())).await.unwrap();
}

// ── Snapshot and updates ────────────────────────────────────────

#[tokio::test]
async fn create_arrives_before_updates() {
    let state = seeded_state(json!({"foo": "bar", "man": {"name": "johnny"}})).await;
    let addr = spawn_test_server(state.clone()).await;
    let mut client = connect(&addr, "root/man").await;

    assert_eq!(
        next_message(&mut client).await,
        ChannelMessage::Create(json!({"name": "johnny"}))
    );

    state
        .distributor()
        .lock()
        .await
        .set_value_at_keypath(Some(json!("jimmy")), &kp("man/name"))
        .unwrap();
    let payload = next_update(&mut client).await;
    assert_eq!(payload.updated.get("name"), Some(&json!("jimmy")));
    assert!(payload.deleted.is_empty());
}

#[tokio::test]
async fn updates_outside_the_channel_are_not_forwarded() {
    let state = seeded_state(json!({"foo": "bar", "man": {"name": "johnny"}})).await;
    let addr = spawn_test_server(state.clone()).await;
    let mut client = connect(&addr, "root/man").await;
    next_message(&mut client).await;

    {
        let mut distributor = state.distributor().lock().await;
        distributor
            .set_value_at_keypath(Some(json!("baz")), &kp("foo"))
            .unwrap();
        distributor
            .set_value_at_keypath(Some(json!(30)), &kp("man/age"))
            .unwrap();
    }

    let payload = next_update(&mut client).await;
    assert_eq!(payload.updated.keys().collect::<Vec<_>>(), vec!["age"]);
    assert_eq!(payload.updated["age"], json!(30));
}

// ── Inbound ─────────────────────────────────────────────────────

#[tokio::test]
async fn inbound_update_frames_reach_other_channels() {
    let state = seeded_state(json!({"man": {"name": "johnny"}})).await;
    let addr = spawn_test_server(state.clone()).await;
    let mut root = connect(&addr, "root").await;
    let mut man = connect(&addr, "root/man").await;
    next_message(&mut root).await;
    next_message(&mut man).await;

    send_text(&mut man, r#"{"event":"update","data":{"updated":{"name":"jimmy"}}}"#).await;

    let payload = next_update(&mut root).await;
    assert_eq!(payload.updated.get("man/name"), Some(&json!("jimmy")));
    // The sender's channel sees the same change, scoped to it.
    let payload = next_update(&mut man).await;
    assert_eq!(payload.updated.get("name"), Some(&json!("jimmy")));

    assert_eq!(
        state.distributor().lock().await.get_object(),
        &json!({"man": {"name": "jimmy"}})
    );
}

#[tokio::test]
async fn malformed_frames_do_not_end_the_session() {
    let state = seeded_state(json!({"a": 1})).await;
    let addr = spawn_test_server(state.clone()).await;
    let mut client = connect(&addr, "root").await;
    next_message(&mut client).await;

    send_text(&mut client, "not json").await;
    send_text(&mut client, r#"{"event":"update"}"#).await;
    send_text(&mut client, r#"{"event":"update","data":{"updated":{"a":2}}}"#).await;

    let payload = next_update(&mut client).await;
    assert_eq!(payload.updated.get("a"), Some(&json!(2)));
}

// ── Teardown ────────────────────────────────────────────────────

#[tokio::test]
async fn close_ends_the_socket() {
    let state = seeded_state(json!({"man": {"name": "johnny"}})).await;
    let addr = spawn_test_server(state.clone()).await;
    let mut client = connect(&addr, "root/man").await;
    next_message(&mut client).await;

    state
        .distributor()
        .lock()
        .await
        .set_value_at_keypath(None, &kp("man"))
        .unwrap();
    assert_eq!(next_message(&mut client).await, ChannelMessage::Close);

    // Nothing but a close frame may follow, then the stream ends.
    loop {
        let frame = tokio::time::timeout(WAIT, client.next())
            .await
            .expect("socket stayed open after close");
        match frame {
            None | Some(Err(_)) => break,
            Some(Ok(Message::Text(text))) => panic!("unexpected frame after close: {}", text.as_str()),
            Some(Ok(_)) => {}
        }
    }
}

// ── Consistency under concurrent mutation ───────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn snapshot_taken_mid_mutation_is_consistent() {
    const LAST: i64 = 199;
    let state = seeded_state(json!({"counter": -1})).await;
    let addr = spawn_test_server(state.clone()).await;

    let writer = {
        let state = state.clone();
        tokio::spawn(async move {
            for n in 0..=LAST {
                state
                    .distributor()
                    .lock()
                    .await
                    .set_value_at_keypath(Some(json!(n)), &kp("counter"))
                    .unwrap();
                tokio::task::yield_now().await;
            }
        })
    };
    let mut client = connect(&addr, "root").await;

    // The snapshot holds some counter value and the updates continue from
    // exactly the next one: nothing is lost or repeated.
    let ChannelMessage::Create(snapshot) = next_message(&mut client).await else {
        panic!("expected create first");
    };
    let mut expected = snapshot["counter"].as_i64().unwrap() + 1;
    while expected <= LAST {
        let payload = next_update(&mut client).await;
        assert_eq!(payload.updated.get("counter"), Some(&json!(expected)));
        expected += 1;
    }

    writer.await.unwrap();
    assert_eq!(
        state.distributor().lock().await.get_object(),
        &json!({"counter": LAST})
    );
}
