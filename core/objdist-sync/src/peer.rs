//! The client side: a local mirror kept in step over one connection.

use crate::apply::apply_silently;
use crate::error::SyncResult;
use crate::protocol::{ChannelMessage, ChannelPayload};
use crate::transport::Connection;
use objdist_store::{KvcObject, SetMode, StoreObserver, SubscriptionId};
use objdist_types::{Delimiter, FlatChanges, Keypath, PeerId};
use serde_json::Value;
use tracing::{debug, trace, warn};

/// Mirrors a subtree bidirectionally over a single [`Connection`].
///
/// Inbound payloads are applied silently. Local edits are sent out as
/// payloads, except for the one outbound round that immediately follows an
/// inbound apply: that round would only repeat what the remote side just
/// sent, so it is skipped and the suppression flag is cleared.
#[derive(Debug)]
pub struct SyncPeer<C: Connection> {
    peer_id: PeerId,
    connection: C,
    store: KvcObject,
    delimiter: Delimiter,
    just_received_update: bool,
    closed: bool,
}

impl<C: Connection> SyncPeer<C> {
    /// Creates a peer with an empty mirror.
    pub fn new(connection: C, delimiter: Delimiter) -> Self {
        Self {
            peer_id: PeerId::new(),
            connection,
            store: KvcObject::new(),
            delimiter,
            just_received_update: false,
            closed: false,
        }
    }

    /// Creates a peer whose mirror starts as `tree`. Nothing is sent.
    pub fn with_object(connection: C, delimiter: Delimiter, tree: Value) -> SyncResult<Self> {
        Ok(Self {
            store: KvcObject::with_object(tree)?,
            ..Self::new(connection, delimiter)
        })
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn get_object(&self) -> &Value {
        self.store.get_object()
    }

    pub fn get_value_at_keypath(&self, keypath: &Keypath) -> Option<&Value> {
        self.store.get_object_at_keypath(keypath)
    }

    /// Replaces the local mirror and sends the difference. Keys the
    /// delimiter cannot represent are rejected before anything changes.
    pub fn set_object(&mut self, tree: Value) -> SyncResult<()> {
        self.delimiter.check_keys(&tree)?;
        let batch = self.store.set_object(tree)?;
        self.send_update(&batch.changes);
        Ok(())
    }

    /// Sets or deletes one keypath locally and sends the difference.
    pub fn set_value_at_keypath(&mut self, value: Option<Value>, keypath: &Keypath) -> SyncResult<()> {
        keypath.check(&self.delimiter)?;
        if let Some(value) = &value {
            self.delimiter.check_keys(value)?;
        }
        let batch = self.store.set_value_at_keypath(value, keypath, SetMode::Local)?;
        self.send_update(&batch.changes);
        Ok(())
    }

    /// Dispatches one inbound message. Messages after `close` are ignored.
    pub fn handle_message(&mut self, message: ChannelMessage) {
        if self.closed {
            trace!(peer = %self.peer_id, event = message.event_name(), "peer closed, dropping message");
            return;
        }
        match message {
            ChannelMessage::Create(tree) => self.receive_snapshot(tree),
            ChannelMessage::Update(payload) => {
                self.receive_update(&payload);
            }
            ChannelMessage::Close => {
                debug!(peer = %self.peer_id, "channel closed");
                self.closed = true;
            }
        }
    }

    /// Applies an inbound payload to the mirror. Returns the number of
    /// entries applied; a malformed or empty payload applies nothing.
    pub fn receive_update(&mut self, payload: &ChannelPayload) -> usize {
        let changes = payload.dismantle(&self.delimiter);
        let applied = apply_silently(&mut self.store, &Keypath::root(), changes, &self.delimiter);
        self.emit_received();
        applied
    }

    /// Whether a `close` has been received.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Registers an observer on the mirror.
    pub fn subscribe<O>(&mut self, observer: O) -> SubscriptionId
    where
        O: StoreObserver + Send + 'static,
    {
        self.store.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    fn receive_snapshot(&mut self, tree: Value) {
        if !tree.is_object() {
            warn!(peer = %self.peer_id, "ignoring non-object snapshot");
            return;
        }
        if let Err(e) = self.delimiter.check_keys(&tree) {
            warn!(peer = %self.peer_id, error = %e, "ignoring snapshot");
            return;
        }
        if let Err(e) = self
            .store
            .set_value_at_keypath(Some(tree), &Keypath::root(), SetMode::Silent)
        {
            warn!(peer = %self.peer_id, error = %e, "failed to apply snapshot");
            return;
        }
        self.emit_received();
    }

    // Flushes silently applied changes. Only a non-empty flush arms the
    // suppression flag, since only then does an outbound round follow.
    fn emit_received(&mut self) {
        if !self.store.has_changes() {
            return;
        }
        self.just_received_update = true;
        let batch = self.store.emit_changes();
        self.send_update(&batch.changes);
    }

    fn send_update(&mut self, changes: &FlatChanges) {
        if std::mem::take(&mut self.just_received_update) {
            trace!(peer = %self.peer_id, "suppressing echo of received update");
            return;
        }
        if self.closed {
            return;
        }

        let payload = ChannelPayload::assemble(changes, &self.delimiter);
        if payload.is_empty() {
            return;
        }
        debug!(
            peer = %self.peer_id,
            updated = payload.updated.len(),
            deleted = payload.deleted.len(),
            "sending update"
        );
        if let Err(e) = self.connection.send(ChannelMessage::Update(payload)) {
            warn!(peer = %self.peer_id, error = %e, "failed to send update");
        }
    }
}
