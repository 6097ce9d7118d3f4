//! Hierarchical state distribution for objdist.
//!
//! A [`Distributor`] owns a JSON state tree and exposes every node of it as
//! its own broadcast channel. Subscribers of a channel receive a snapshot of
//! that node's subtree on connect and afterwards only the changes beneath
//! it, with keypaths rewritten relative to the channel.
//!
//! A [`SyncPeer`] mirrors one such subtree locally and sends its own edits
//! back, without echoing the updates it has just received.
//!
//! # Components
//!
//! - **Protocol**: the `create` / `update` / `close` messages and the
//!   `{updated, deleted}` payload
//! - **Transport**: traits for channels, subscribers and connections, plus
//!   an in-memory mock
//! - **Registry**: keeps one channel per tree node
//! - **Distributor** and **Peer**: the two ends
//!
//! # Example
//!
//! ```
//! use objdist_sync::transport::mock::MockTransport;
//! use objdist_sync::{ChannelMessage, Distributor};
//! use objdist_types::Keypath;
//! use serde_json::json;
//!
//! let transport = MockTransport::new();
//! let mut distributor = Distributor::with_default_config(transport.clone()).unwrap();
//! distributor.set_tree(json!({"man": {"name": "johnny"}})).unwrap();
//!
//! let subscriber = transport.subscribe("/root/man").unwrap();
//! distributor.on_connect(&Keypath::new(["man"]), &subscriber);
//! assert_eq!(subscriber.take(), Some(ChannelMessage::Create(json!({"name": "johnny"}))));
//!
//! distributor
//!     .set_value_at_keypath(Some(json!("jimmy")), &Keypath::new(["man", "name"]))
//!     .unwrap();
//! let ChannelMessage::Update(payload) = subscriber.take().unwrap() else {
//!     panic!("expected an update");
//! };
//! assert_eq!(payload.updated.get("name"), Some(&json!("jimmy")));
//! ```

mod apply;
mod config;
mod distributor;
mod error;
mod peer;
pub mod protocol;
mod registry;
pub mod transport;

pub use config::SyncConfig;
pub use distributor::Distributor;
pub use error::{SyncError, SyncResult};
pub use peer::SyncPeer;
pub use protocol::{ChannelMessage, ChannelPayload, DEFAULT_PREFIX, PROTOCOL_VERSION};
pub use registry::ChannelRegistry;
pub use transport::{Channel, ChannelTransport, Connection, Subscriber};
