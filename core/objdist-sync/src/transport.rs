//! Transport layer abstraction.
//!
//! The distributor and peers never touch sockets. They talk to a transport
//! that can open named broadcast channels and deliver messages to individual
//! subscribers or connections. All sends are fire-and-forget: delivery and
//! connection liveness are the transport's concern.

use crate::error::SyncResult;
use crate::protocol::ChannelMessage;

/// One connected receiver of a channel.
pub trait Subscriber {
    /// Sends a message to this subscriber only.
    fn send(&self, message: &ChannelMessage) -> SyncResult<()>;
}

/// An addressable broadcast group.
pub trait Channel {
    /// The transport-level name, e.g. `/root/man`.
    fn name(&self) -> &str;

    /// Delivers a message to every current subscriber.
    fn broadcast(&self, message: &ChannelMessage) -> SyncResult<()>;

    /// Tears the channel down: remaining subscribers receive
    /// [`ChannelMessage::Close`] and are dropped. Closing is terminal; later
    /// broadcasts must fail with [`SyncError::ChannelClosed`].
    ///
    /// [`SyncError::ChannelClosed`]: crate::SyncError::ChannelClosed
    fn close(&mut self) -> SyncResult<()>;
}

/// Opens channels by name.
///
/// Implementations must not deliver subscriber connections synchronously
/// from inside [`open_channel`](Self::open_channel); hosts route new
/// subscribers to [`Distributor::on_connect`](crate::Distributor::on_connect).
pub trait ChannelTransport {
    type Channel: Channel;

    fn open_channel(&mut self, name: &str) -> SyncResult<Self::Channel>;
}

/// A single bidirectional link used by a [`SyncPeer`](crate::SyncPeer).
pub trait Connection {
    fn send(&mut self, message: ChannelMessage) -> SyncResult<()>;
}

/// In-memory transport for testing.
pub mod mock {
    use super::*;
    use crate::error::SyncError;
    use objdist_types::PeerId;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[derive(Debug, Default)]
    struct ChannelState {
        generation: u64,
        open: bool,
        history: Vec<ChannelMessage>,
        subscribers: Vec<MockSubscriber>,
    }

    #[derive(Debug, Default)]
    struct TransportState {
        channels: BTreeMap<String, ChannelState>,
        opened: u64,
    }

    /// A transport whose channels live in shared memory. Clones share state,
    /// so a test can keep one handle while the distributor owns another.
    #[derive(Debug, Clone, Default)]
    pub struct MockTransport {
        state: Arc<Mutex<TransportState>>,
    }

    impl MockTransport {
        /// Creates a new mock transport.
        pub fn new() -> Self {
            Self::default()
        }

        /// Joins an open channel. Returns `None` if no such channel is open.
        pub fn subscribe(&self, name: &str) -> Option<MockSubscriber> {
            let mut state = lock(&self.state);
            let channel = state.channels.get_mut(name).filter(|c| c.open)?;
            let subscriber = MockSubscriber::new();
            channel.subscribers.push(subscriber.clone());
            Some(subscriber)
        }

        /// Whether a channel with this name is currently open.
        pub fn is_open(&self, name: &str) -> bool {
            lock(&self.state)
                .channels
                .get(name)
                .is_some_and(|c| c.open)
        }

        /// Names of all open channels, sorted.
        pub fn open_channels(&self) -> Vec<String> {
            lock(&self.state)
                .channels
                .iter()
                .filter(|(_, c)| c.open)
                .map(|(name, _)| name.clone())
                .collect()
        }

        /// Every message broadcast on the current incarnation of a channel,
        /// including the final `close`.
        pub fn broadcasts(&self, name: &str) -> Vec<ChannelMessage> {
            lock(&self.state)
                .channels
                .get(name)
                .map(|c| c.history.clone())
                .unwrap_or_default()
        }

        /// Total number of `open_channel` calls.
        pub fn opened_count(&self) -> u64 {
            lock(&self.state).opened
        }
    }

    impl ChannelTransport for MockTransport {
        type Channel = MockChannel;

        fn open_channel(&mut self, name: &str) -> SyncResult<MockChannel> {
            let mut state = lock(&self.state);
            state.opened += 1;
            let generation = state.opened;
            state.channels.insert(
                name.to_string(),
                ChannelState {
                    generation,
                    open: true,
                    ..Default::default()
                },
            );
            Ok(MockChannel {
                name: name.to_string(),
                generation,
                state: self.state.clone(),
            })
        }
    }

    /// A channel handle from [`MockTransport`].
    #[derive(Debug)]
    pub struct MockChannel {
        name: String,
        generation: u64,
        state: Arc<Mutex<TransportState>>,
    }

    impl MockChannel {
        fn with_open_state<R>(
            &self,
            f: impl FnOnce(&mut ChannelState) -> R,
        ) -> SyncResult<R> {
            let mut state = lock(&self.state);
            match state.channels.get_mut(&self.name) {
                Some(channel) if channel.open && channel.generation == self.generation => {
                    Ok(f(channel))
                }
                _ => Err(SyncError::ChannelClosed(self.name.clone())),
            }
        }
    }

    impl Channel for MockChannel {
        fn name(&self) -> &str {
            &self.name
        }

        fn broadcast(&self, message: &ChannelMessage) -> SyncResult<()> {
            self.with_open_state(|channel| {
                channel.history.push(message.clone());
                for subscriber in &channel.subscribers {
                    // Disconnected subscribers just miss the message.
                    let _ = subscriber.send(message);
                }
            })
        }

        fn close(&mut self) -> SyncResult<()> {
            self.with_open_state(|channel| {
                channel.history.push(ChannelMessage::Close);
                for subscriber in channel.subscribers.drain(..) {
                    let _ = subscriber.send(&ChannelMessage::Close);
                }
                channel.open = false;
            })
        }
    }

    /// A subscriber that queues what it receives.
    #[derive(Debug, Clone)]
    pub struct MockSubscriber {
        inbox: Arc<Mutex<VecDeque<ChannelMessage>>>,
        connected: Arc<AtomicBool>,
    }

    impl MockSubscriber {
        /// Creates a connected subscriber that is not attached to any channel.
        pub fn new() -> Self {
            Self {
                inbox: Arc::new(Mutex::new(VecDeque::new())),
                connected: Arc::new(AtomicBool::new(true)),
            }
        }

        /// Pops the oldest received message.
        pub fn take(&self) -> Option<ChannelMessage> {
            lock(&self.inbox).pop_front()
        }

        /// Pops every received message.
        pub fn drain(&self) -> Vec<ChannelMessage> {
            lock(&self.inbox).drain(..).collect()
        }

        /// Makes further sends fail, as if the remote end went away.
        pub fn disconnect(&self) {
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    impl Default for MockSubscriber {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Subscriber for MockSubscriber {
        fn send(&self, message: &ChannelMessage) -> SyncResult<()> {
            if !self.connected.load(Ordering::SeqCst) {
                return Err(SyncError::Transport("subscriber disconnected".into()));
            }
            lock(&self.inbox).push_back(message.clone());
            Ok(())
        }
    }

    /// A mock peer connection for testing message exchange.
    #[derive(Debug)]
    pub struct MockConnection {
        peer_id: PeerId,
        incoming: Arc<Mutex<VecDeque<ChannelMessage>>>,
        outgoing: Arc<Mutex<VecDeque<ChannelMessage>>>,
        connected: bool,
    }

    impl MockConnection {
        /// Creates an unpaired connection; sent messages are only visible
        /// through [`take_outgoing`](Self::take_outgoing).
        pub fn new(peer_id: PeerId) -> Self {
            Self {
                peer_id,
                incoming: Arc::new(Mutex::new(VecDeque::new())),
                outgoing: Arc::new(Mutex::new(VecDeque::new())),
                connected: true,
            }
        }

        /// Creates a pair of connected mock connections.
        pub fn pair(peer1: PeerId, peer2: PeerId) -> (Self, Self) {
            let queue1 = Arc::new(Mutex::new(VecDeque::new()));
            let queue2 = Arc::new(Mutex::new(VecDeque::new()));

            let conn1 = Self {
                peer_id: peer2,
                incoming: queue1.clone(),
                outgoing: queue2.clone(),
                connected: true,
            };

            let conn2 = Self {
                peer_id: peer1,
                incoming: queue2,
                outgoing: queue1,
                connected: true,
            };

            (conn1, conn2)
        }

        /// The remote peer's ID.
        pub fn peer_id(&self) -> PeerId {
            self.peer_id
        }

        /// Queues a message to be received.
        pub fn queue_incoming(&self, message: ChannelMessage) {
            lock(&self.incoming).push_back(message);
        }

        /// Gets the next outgoing message.
        pub fn take_outgoing(&self) -> Option<ChannelMessage> {
            lock(&self.outgoing).pop_front()
        }

        /// Receives the next message (from incoming queue).
        pub fn receive(&mut self) -> Option<ChannelMessage> {
            if !self.connected {
                return None;
            }
            lock(&self.incoming).pop_front()
        }

        /// Closes the connection.
        pub fn close(&mut self) {
            self.connected = false;
        }

        /// Whether the connection is still alive.
        pub fn is_connected(&self) -> bool {
            self.connected
        }
    }

    impl Connection for MockConnection {
        fn send(&mut self, message: ChannelMessage) -> SyncResult<()> {
            if !self.connected {
                return Err(SyncError::ConnectionClosed);
            }
            lock(&self.outgoing).push_back(message);
            Ok(())
        }
    }
}
