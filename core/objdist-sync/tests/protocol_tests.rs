use objdist_sync::protocol::{ChannelMessage, ChannelPayload};
use objdist_types::{Delimiter, FlatChanges, Keypath};
use pretty_assertions::assert_eq;
use serde_json::json;

fn kp(text: &str) -> Keypath {
    Keypath::parse(text, &Delimiter::default())
}

fn changes(entries: &[(&str, Option<serde_json::Value>)]) -> FlatChanges {
    entries
        .iter()
        .map(|(k, v)| (kp(k), v.clone()))
        .collect()
}

// ── ChannelMessage wire format ──────────────────────────────────

#[test]
fn create_message_wire_format() {
    let msg = ChannelMessage::Create(json!({"name": "johnny"}));
    let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
    assert_eq!(value, json!({"event": "create", "data": {"name": "johnny"}}));
}

#[test]
fn update_message_omits_empty_fields() {
    let mut payload = ChannelPayload::default();
    payload.updated.insert("man/name".into(), json!("jimmy"));
    let msg = ChannelMessage::Update(payload);

    let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
    assert_eq!(
        value,
        json!({"event": "update", "data": {"updated": {"man/name": "jimmy"}}})
    );
}

#[test]
fn close_message_has_no_data() {
    let encoded = ChannelMessage::Close.encode().unwrap();
    let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
    assert_eq!(value, json!({"event": "close"}));
    assert_eq!(ChannelMessage::decode(&encoded).unwrap(), ChannelMessage::Close);
}

#[test]
fn decode_update_from_text() {
    let msg = ChannelMessage::decode(
        r#"{"event":"update","data":{"updated":{"a":1},"deleted":["b/c"]}}"#,
    )
    .unwrap();
    let ChannelMessage::Update(payload) = msg else {
        panic!("expected update");
    };
    assert_eq!(payload.updated.get("a"), Some(&json!(1)));
    assert_eq!(payload.deleted, vec!["b/c".to_string()]);
}

#[test]
fn decode_unknown_event_fails() {
    assert!(ChannelMessage::decode(r#"{"event":"explode"}"#).is_err());
    assert!(ChannelMessage::decode("not json").is_err());
}

#[test]
fn event_names() {
    assert_eq!(ChannelMessage::Create(json!({})).event_name(), "create");
    assert_eq!(ChannelMessage::Update(ChannelPayload::default()).event_name(), "update");
    assert_eq!(ChannelMessage::Close.event_name(), "close");
}

// ── Lenient payload decoding ────────────────────────────────────

#[test]
fn malformed_payload_reads_as_empty() {
    for raw in [
        json!(null),
        json!(42),
        json!("text"),
        json!({}),
        json!({"updated": [1, 2], "deleted": "man"}),
    ] {
        let payload: ChannelPayload = serde_json::from_value(raw.clone()).unwrap();
        assert!(payload.is_empty(), "{raw} should read as empty");
    }
}

#[test]
fn non_string_deleted_entries_are_dropped() {
    let payload: ChannelPayload =
        serde_json::from_value(json!({"deleted": ["a", 1, null, "b"]})).unwrap();
    assert_eq!(payload.deleted, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn update_with_malformed_data_decodes() {
    let msg = ChannelMessage::decode(r#"{"event":"update","data":7}"#).unwrap();
    assert_eq!(msg, ChannelMessage::Update(ChannelPayload::default()));
}

#[test]
fn update_without_data_decodes_as_empty() {
    for text in [r#"{"event":"update"}"#, r#"{"event":"update","data":null}"#] {
        assert_eq!(
            ChannelMessage::decode(text).unwrap(),
            ChannelMessage::Update(ChannelPayload::default())
        );
    }
}

#[test]
fn create_without_data_fails() {
    assert!(ChannelMessage::decode(r#"{"event":"create"}"#).is_err());
}

// ── Assembly and scoping ────────────────────────────────────────

#[test]
fn assemble_splits_updates_and_deletions() {
    let delimiter = Delimiter::default();
    let payload = ChannelPayload::assemble(
        &changes(&[("foo", Some(json!("bar"))), ("man/name", None)]),
        &delimiter,
    );
    assert_eq!(payload.updated.get("foo"), Some(&json!("bar")));
    assert_eq!(payload.deleted, vec!["man/name".to_string()]);
}

#[test]
fn scoped_strips_channel_keypath() {
    let delimiter = Delimiter::default();
    let payload = ChannelPayload::scoped(
        &changes(&[("man/name", Some(json!("jimmy"))), ("foo", Some(json!(1)))]),
        &kp("man"),
        &delimiter,
    );
    assert_eq!(payload.updated.len(), 1);
    assert_eq!(payload.updated.get("name"), Some(&json!("jimmy")));
    assert!(payload.deleted.is_empty());
}

#[test]
fn scoping_is_segment_wise() {
    let delimiter = Delimiter::default();
    let payload = ChannelPayload::scoped(
        &changes(&[("manx", Some(json!(1))), ("manx/y", Some(json!(2)))]),
        &kp("man"),
        &delimiter,
    );
    assert!(payload.is_empty());
}

#[test]
fn scoping_at_the_node_itself_yields_empty_key() {
    let delimiter = Delimiter::default();
    let payload = ChannelPayload::scoped(
        &changes(&[("man/name", Some(json!("jimmy")))]),
        &kp("man/name"),
        &delimiter,
    );
    assert_eq!(payload.updated.get(""), Some(&json!("jimmy")));
}

#[test]
fn custom_delimiter_is_used_on_the_wire() {
    let delimiter = Delimiter::new(".").unwrap();
    let payload = ChannelPayload::assemble(&changes(&[("a/b/c", Some(json!(true)))]), &delimiter);
    assert_eq!(payload.updated.get("a.b.c"), Some(&json!(true)));

    let back = payload.dismantle(&delimiter);
    assert_eq!(back, changes(&[("a/b/c", Some(json!(true)))]));
}

// ── Dismantling ─────────────────────────────────────────────────

#[test]
fn dismantle_reverses_assemble() {
    let delimiter = Delimiter::default();
    let original = changes(&[
        ("foo", Some(json!("bar"))),
        ("man/name", None),
        ("list", Some(json!([1, 2, 3]))),
        ("nothing", Some(json!(null))),
    ]);
    let payload = ChannelPayload::assemble(&original, &delimiter);
    assert_eq!(payload.dismantle(&delimiter), original);
}

#[test]
fn deleted_wins_over_updated() {
    let mut payload = ChannelPayload::default();
    payload.updated.insert("a".into(), json!(1));
    payload.deleted.push("a".into());

    let flat = payload.dismantle(&Delimiter::default());
    assert_eq!(flat.get(&kp("a")), Some(&None));
}
