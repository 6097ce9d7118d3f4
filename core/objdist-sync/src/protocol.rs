//! Wire messages and payload (dis)assembly.
//!
//! Three events travel on a channel:
//! 1. `create` — the full subtree, sent once to each new subscriber
//! 2. `update` — a [`ChannelPayload`] of changes relative to the channel
//! 3. `close` — the channel is being torn down
//!
//! The same `update` payload is used in both directions between sync peers.

use crate::error::SyncResult;
use objdist_types::{Delimiter, FlatChanges, Keypath};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Protocol version, advertised by hosts when a subscriber connects.
pub const PROTOCOL_VERSION: u32 = 1;

/// Root channel name used when none is configured.
pub const DEFAULT_PREFIX: &str = "root";

/// A message delivered on a channel or connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ChannelMessage {
    /// Snapshot of the subtree at the channel's keypath.
    Create(Value),
    /// Changes under the channel's keypath.
    Update(ChannelPayload),
    /// The channel is going away; no further messages follow.
    Close,
}

impl ChannelMessage {
    /// The event name as it appears on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Update(_) => "update",
            Self::Close => "close",
        }
    }

    /// Encodes the message as JSON text.
    pub fn encode(&self) -> SyncResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a message from JSON text.
    ///
    /// An `update` always decodes: missing or malformed `data` reads as an
    /// empty payload. Other events must match the wire format exactly.
    pub fn decode(text: &str) -> SyncResult<Self> {
        let mut message: Value = serde_json::from_str(text)?;
        if message.get("event").and_then(Value::as_str) == Some("update") {
            let data = message
                .get_mut("data")
                .map(Value::take)
                .unwrap_or_default();
            return Ok(Self::Update(ChannelPayload::from(data)));
        }
        Ok(serde_json::from_value(message)?)
    }
}

/// Changes scoped to one channel: `{updated?, deleted?}` with keypaths
/// relative to the channel. Empty fields are left out when serialized.
///
/// Deserialization never fails on shape: a non-object `updated`, a
/// non-array `deleted`, or non-string entries in `deleted` are dropped, so a
/// malformed payload reads as an empty change-set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct ChannelPayload {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub updated: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deleted: Vec<String>,
}

impl ChannelPayload {
    /// Builds a payload carrying every change in `changes`.
    pub fn assemble(changes: &FlatChanges, delimiter: &Delimiter) -> Self {
        Self::scoped(changes, &Keypath::root(), delimiter)
    }

    /// Builds the payload for the channel at `scope`: only keypaths under
    /// `scope` (segment-wise) are kept, rewritten relative to it.
    pub fn scoped(changes: &FlatChanges, scope: &Keypath, delimiter: &Delimiter) -> Self {
        let mut payload = Self::default();
        for (keypath, value) in changes {
            let Some(relative) = keypath.strip_prefix(scope) else {
                continue;
            };
            let relative = relative.render(delimiter);
            match value {
                Some(value) => {
                    payload.updated.insert(relative, value.clone());
                }
                None => payload.deleted.push(relative),
            }
        }
        payload
    }

    /// Turns the payload back into a flat change-set. A keypath listed in
    /// both fields is treated as deleted.
    pub fn dismantle(&self, delimiter: &Delimiter) -> FlatChanges {
        let mut changes = FlatChanges::new();
        for (keypath, value) in &self.updated {
            changes.insert(Keypath::parse(keypath, delimiter), Some(value.clone()));
        }
        for keypath in &self.deleted {
            changes.insert(Keypath::parse(keypath, delimiter), None);
        }
        changes
    }

    /// Whether neither field carries anything. Empty payloads are never sent.
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.deleted.is_empty()
    }
}

impl From<Value> for ChannelPayload {
    fn from(value: Value) -> Self {
        let Value::Object(mut fields) = value else {
            return Self::default();
        };

        let updated = match fields.remove("updated") {
            Some(Value::Object(map)) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        };
        let deleted = match fields.remove("deleted") {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(keypath) => Some(keypath),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        Self { updated, deleted }
    }
}
