//! Key-value-coded state store for objdist.
//!
//! [`KvcObject`] holds a JSON tree and reports every mutation three ways:
//!
//! - `StructureCreated(keypath)` when a node appears
//! - `StructureDeleted(keypath)` when a node disappears
//! - `Update(flat_changes)` with the changed leaf values (`None` = deleted)
//!
//! Observers are plain values implementing [`StoreObserver`] (closures work),
//! registered with [`KvcObject::subscribe`] and called synchronously inside
//! the mutating call. Mutations made with [`SetMode::Silent`] are recorded but
//! not emitted until [`KvcObject::emit_changes`], which is how remote-origin
//! updates are applied without being mistaken for local edits.

mod error;
mod event;
mod kvc;

pub use error::{StoreError, StoreResult};
pub use event::{ChangeBatch, StoreEvent, StoreObserver, SubscriptionId};
pub use kvc::{KvcObject, SetMode};
