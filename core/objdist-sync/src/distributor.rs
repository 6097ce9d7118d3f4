//! The server side: an authoritative tree fanned out over per-node channels.

use crate::apply::apply_silently;
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::protocol::{ChannelMessage, ChannelPayload};
use crate::registry::ChannelRegistry;
use crate::transport::{ChannelTransport, Subscriber};
use objdist_store::{ChangeBatch, KvcObject, SetMode, StoreObserver, SubscriptionId};
use objdist_types::Keypath;
use serde_json::Value;
use tracing::{debug, warn};

/// Owns the state tree and one channel per node of it, root included.
///
/// Every mutation runs to completion before returning: the store is
/// updated, channels are opened and closed to match the new shape, and each
/// remaining channel is sent the changes under its keypath. Mutating methods
/// take `&mut self`; hosts that share a distributor across threads wrap it in
/// a lock.
///
/// ```
/// use objdist_sync::{Distributor, SyncConfig};
/// use objdist_sync::transport::mock::MockTransport;
/// use serde_json::json;
///
/// let transport = MockTransport::new();
/// let mut distributor = Distributor::new(transport.clone(), SyncConfig::default()).unwrap();
/// distributor.set_tree(json!({"man": {"name": "johnny"}})).unwrap();
///
/// assert!(transport.is_open("/root/man/name"));
/// ```
#[derive(Debug)]
pub struct Distributor<T: ChannelTransport> {
    store: KvcObject,
    registry: ChannelRegistry<T>,
}

impl<T: ChannelTransport> Distributor<T> {
    /// Validates `config` and opens the root channel over `transport`.
    pub fn new(transport: T, config: SyncConfig) -> SyncResult<Self> {
        config.validate()?;
        let mut registry = ChannelRegistry::new(transport, config);
        registry.create_channel(&Keypath::root())?;
        Ok(Self {
            store: KvcObject::new(),
            registry,
        })
    }

    /// Same as [`new`](Self::new) with prefix `root` and delimiter `/`.
    pub fn with_default_config(transport: T) -> SyncResult<Self> {
        Self::new(transport, SyncConfig::default())
    }

    pub fn config(&self) -> &SyncConfig {
        self.registry.config()
    }

    pub fn get_object(&self) -> &Value {
        self.store.get_object()
    }

    pub fn get_object_at_keypath(&self, keypath: &Keypath) -> Option<&Value> {
        self.store.get_object_at_keypath(keypath)
    }

    /// Replaces the whole tree.
    ///
    /// Keys that are empty or contain the delimiter would collide with other
    /// keypaths once rendered, so they are rejected with
    /// [`SyncError::Key`](crate::SyncError::Key) and nothing changes.
    pub fn set_tree(&mut self, tree: Value) -> SyncResult<()> {
        self.config().delimiter.check_keys(&tree)?;
        let batch = self.store.set_object(tree)?;
        self.distribute(&batch);
        Ok(())
    }

    /// Sets the value at `keypath`, or deletes it when `value` is `None`.
    /// Unrepresentable keys are rejected as in [`set_tree`](Self::set_tree).
    pub fn set_value_at_keypath(&mut self, value: Option<Value>, keypath: &Keypath) -> SyncResult<()> {
        let delimiter = &self.config().delimiter;
        keypath.check(delimiter)?;
        if let Some(value) = &value {
            delimiter.check_keys(value)?;
        }
        let batch = self
            .store
            .set_value_at_keypath(value, keypath, SetMode::Local)?;
        self.distribute(&batch);
        Ok(())
    }

    /// Applies a payload received from a subscriber of the channel at
    /// `scope` and redistributes the result to every channel, the sender's
    /// included. Returns the number of entries applied.
    ///
    /// The sender's channel receives the resulting update too. A sync peer
    /// that already holds those values applies it without change and so
    /// sends nothing back.
    pub fn apply_remote(&mut self, scope: &Keypath, payload: &ChannelPayload) -> usize {
        if !self.registry.contains(scope) {
            warn!(%scope, "update for unknown channel");
            return 0;
        }
        let delimiter = self.config().delimiter.clone();
        let changes = payload.dismantle(&delimiter);
        let applied = apply_silently(&mut self.store, scope, changes, &delimiter);
        let batch = self.store.emit_changes();
        self.distribute(&batch);
        applied
    }

    /// Sends a new subscriber of the channel at `keypath` the current
    /// subtree. Returns false if no channel exists there.
    pub fn on_connect<S: Subscriber + ?Sized>(&self, keypath: &Keypath, subscriber: &S) -> bool {
        if !self.registry.contains(keypath) {
            debug!(%keypath, "subscriber for unknown channel");
            return false;
        }
        let snapshot = self
            .store
            .get_object_at_keypath(keypath)
            .cloned()
            .unwrap_or(Value::Null);
        if let Err(e) = subscriber.send(&ChannelMessage::Create(snapshot)) {
            warn!(%keypath, error = %e, "failed to send snapshot");
        }
        true
    }

    /// [`on_connect`](Self::on_connect) addressed by channel name. Returns the
    /// channel's keypath if it exists.
    pub fn connect<S: Subscriber + ?Sized>(&self, channel: &str, subscriber: &S) -> Option<Keypath> {
        let keypath = self.keypath_for_channel(channel)?;
        self.on_connect(&keypath, subscriber).then_some(keypath)
    }

    /// Sends `subscriber` the whole tree, regardless of which channel it is
    /// on.
    pub fn publish_base<S: Subscriber + ?Sized>(&self, subscriber: &S) -> SyncResult<()> {
        subscriber.send(&ChannelMessage::Create(self.store.get_object().clone()))
    }

    /// Registers an observer on the underlying store.
    pub fn subscribe<O>(&mut self, observer: O) -> SubscriptionId
    where
        O: StoreObserver + Send + 'static,
    {
        self.store.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }

    pub fn has_channel(&self, keypath: &Keypath) -> bool {
        self.registry.contains(keypath)
    }

    /// Keypaths with an open channel, ascending.
    pub fn channel_keypaths(&self) -> Vec<Keypath> {
        self.registry.keypaths().cloned().collect()
    }

    pub fn channel(&self, keypath: &Keypath) -> Option<&T::Channel> {
        self.registry.get(keypath)
    }

    pub fn channel_name(&self, keypath: &Keypath) -> String {
        self.config().channel_name(keypath)
    }

    pub fn keypath_for_channel(&self, name: &str) -> Option<Keypath> {
        self.config().keypath_for_channel(name)
    }

    pub fn transport(&self) -> &T {
        self.registry.transport()
    }

    /// Closes every channel, root included. Used on shutdown.
    pub fn close_all_channels(&mut self) {
        self.registry.close_all();
    }

    fn distribute(&mut self, batch: &ChangeBatch) {
        batch.dispatch(&mut self.registry);
    }
}
