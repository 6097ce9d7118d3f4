//! Core type definitions for objdist.
//!
//! This crate defines the addressing types shared by the state store, the
//! distributor and sync peers:
//! - [`Keypath`] and [`Delimiter`] with segment-wise prefix utilities
//! - [`FlatChanges`], the unit of change propagated through the system
//! - [`PeerId`] identifiers (UUID v7)

mod ids;
mod keypath;

use std::collections::BTreeMap;

pub use ids::PeerId;
pub use keypath::{DEFAULT_DELIMITER, Delimiter, Keypath};

/// A flat change-set: absolute keypath to new leaf value, `None` meaning the
/// keypath was deleted.
pub type FlatChanges = BTreeMap<Keypath, Option<serde_json::Value>>;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("keypath delimiter must not be empty")]
    EmptyDelimiter,

    #[error("key {segment:?} is empty or contains the delimiter {delimiter:?}")]
    UnrepresentableKey { segment: String, delimiter: String },

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),
}
