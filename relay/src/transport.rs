//! Channels backed by tokio broadcast queues, fanned out to WebSockets.

use objdist_sync::{Channel, ChannelMessage, ChannelTransport, Subscriber, SyncError, SyncResult};
use tokio::sync::{broadcast, mpsc};
use tracing::info;

/// Per-channel queue depth used when none is given.
pub const DEFAULT_CAPACITY: usize = 256;

/// Opens one broadcast queue per channel.
#[derive(Debug, Clone)]
pub struct WsTransport {
    capacity: usize,
}

impl WsTransport {
    /// Creates a transport whose channels buffer up to `capacity` messages
    /// per slow subscriber.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
        }
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ChannelTransport for WsTransport {
    type Channel = WsChannel;

    fn open_channel(&mut self, name: &str) -> SyncResult<WsChannel> {
        let (sender, _) = broadcast::channel(self.capacity);
        info!(channel = name, "channel opened");
        Ok(WsChannel {
            name: name.to_string(),
            sender: Some(sender),
        })
    }
}

/// A channel handle. Dropping the sender on close ends every receiver's
/// stream right after the final `close` message.
#[derive(Debug)]
pub struct WsChannel {
    name: String,
    sender: Option<broadcast::Sender<ChannelMessage>>,
}

impl WsChannel {
    /// A receiver for everything broadcast from now on. `None` once closed.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<ChannelMessage>> {
        self.sender.as_ref().map(broadcast::Sender::subscribe)
    }

    pub fn receiver_count(&self) -> usize {
        self.sender
            .as_ref()
            .map_or(0, broadcast::Sender::receiver_count)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_none()
    }
}

impl Channel for WsChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn broadcast(&self, message: &ChannelMessage) -> SyncResult<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| SyncError::ChannelClosed(self.name.clone()))?;
        // No receivers is not an error: nobody is listening yet.
        let _ = sender.send(message.clone());
        Ok(())
    }

    fn close(&mut self) -> SyncResult<()> {
        let sender = self
            .sender
            .take()
            .ok_or_else(|| SyncError::ChannelClosed(self.name.clone()))?;
        let _ = sender.send(ChannelMessage::Close);
        info!(channel = %self.name, "channel closed");
        Ok(())
    }
}

/// Direct line to one WebSocket connection, used for its `create` snapshot.
#[derive(Debug, Clone)]
pub struct WsSubscriber(mpsc::UnboundedSender<ChannelMessage>);

impl WsSubscriber {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChannelMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }
}

impl Subscriber for WsSubscriber {
    fn send(&self, message: &ChannelMessage) -> SyncResult<()> {
        self.0
            .send(message.clone())
            .map_err(|_| SyncError::ConnectionClosed)
    }
}
