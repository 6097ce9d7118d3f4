//! One transport channel per tree node.

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::protocol::{ChannelMessage, ChannelPayload};
use crate::transport::{Channel, ChannelTransport};
use objdist_store::{StoreEvent, StoreObserver};
use objdist_types::{FlatChanges, Keypath};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// Maps keypaths to open channels and keeps that mapping in step with the
/// store's structural events.
///
/// Feeding a [`ChangeBatch`](objdist_store::ChangeBatch) through
/// [`StoreObserver::on_event`] reconciles channels first (creates, then
/// deletes) and scopes the update last, so a deleted channel never sees a
/// delta and a new one sees its own.
pub struct ChannelRegistry<T: ChannelTransport> {
    transport: T,
    config: SyncConfig,
    channels: BTreeMap<Keypath, T::Channel>,
}

impl<T: ChannelTransport> ChannelRegistry<T> {
    /// Creates an empty registry. No channel is opened yet.
    pub fn new(transport: T, config: SyncConfig) -> Self {
        Self {
            transport,
            config,
            channels: BTreeMap::new(),
        }
    }

    /// Opens the channel for `keypath` unless one is already registered.
    pub fn create_channel(&mut self, keypath: &Keypath) -> SyncResult<()> {
        if self.channels.contains_key(keypath) {
            return Ok(());
        }
        self.open(keypath)
    }

    /// Tears down any channel registered for `keypath` and opens a fresh one.
    pub fn replace_channel(&mut self, keypath: &Keypath) -> SyncResult<()> {
        self.delete_channel(keypath);
        self.open(keypath)
    }

    /// Closes and forgets the channel for `keypath`. Returns false if there
    /// was none.
    pub fn delete_channel(&mut self, keypath: &Keypath) -> bool {
        let Some(mut channel) = self.channels.remove(keypath) else {
            return false;
        };
        if let Err(e) = channel.close() {
            warn!(channel = channel.name(), error = %e, "failed to close channel");
        } else {
            debug!(channel = channel.name(), "closed channel");
        }
        true
    }

    /// Closes every channel, deepest first.
    pub fn close_all(&mut self) {
        let keypaths: Vec<Keypath> = self.channels.keys().rev().cloned().collect();
        for keypath in &keypaths {
            self.delete_channel(keypath);
        }
    }

    /// Broadcasts the part of `changes` under each channel's keypath,
    /// relative to that keypath. Channels with nothing in scope are skipped.
    pub fn publish_update(&self, changes: &FlatChanges) {
        for (keypath, channel) in &self.channels {
            let payload = ChannelPayload::scoped(changes, keypath, &self.config.delimiter);
            if payload.is_empty() {
                continue;
            }
            debug!(
                channel = channel.name(),
                updated = payload.updated.len(),
                deleted = payload.deleted.len(),
                "publishing update"
            );
            if let Err(e) = channel.broadcast(&ChannelMessage::Update(payload)) {
                warn!(channel = channel.name(), error = %e, "failed to broadcast update");
            }
        }
    }

    /// The channel registered for `keypath`.
    pub fn get(&self, keypath: &Keypath) -> Option<&T::Channel> {
        self.channels.get(keypath)
    }

    pub fn contains(&self, keypath: &Keypath) -> bool {
        self.channels.contains_key(keypath)
    }

    /// Registered keypaths in ascending order.
    pub fn keypaths(&self) -> impl Iterator<Item = &Keypath> {
        self.channels.keys()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn open(&mut self, keypath: &Keypath) -> SyncResult<()> {
        let name = self.config.channel_name(keypath);
        let channel = self.transport.open_channel(&name)?;
        debug!(channel = %name, "opened channel");
        self.channels.insert(keypath.clone(), channel);
        Ok(())
    }
}

impl<T: ChannelTransport> StoreObserver for ChannelRegistry<T> {
    fn on_event(&mut self, event: &StoreEvent) {
        match event {
            StoreEvent::StructureCreated(keypath) => {
                if let Err(e) = self.create_channel(keypath) {
                    warn!(%keypath, error = %e, "failed to open channel");
                }
            }
            StoreEvent::StructureDeleted(keypath) => {
                self.delete_channel(keypath);
            }
            StoreEvent::Update(changes) => self.publish_update(changes),
        }
    }
}

impl<T: ChannelTransport> fmt::Debug for ChannelRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("config", &self.config)
            .field("channels", &self.channels.keys().collect::<Vec<_>>())
            .finish()
    }
}
