//! Channel naming configuration.

use crate::error::{SyncError, SyncResult};
use crate::protocol::DEFAULT_PREFIX;
use objdist_types::{Delimiter, Keypath};
use serde::{Deserialize, Serialize};

/// Configuration shared by distributors and peers.
///
/// Channels are addressed as `delimiter + prefix (+ delimiter + keypath)`,
/// so with the defaults the root channel is `/root` and the channel for
/// `man/name` is `/root/man/name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Name of the root channel, without the leading delimiter.
    pub prefix: String,
    /// Keypath delimiter used in channel names and on the wire.
    pub delimiter: Delimiter,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            delimiter: Delimiter::default(),
        }
    }
}

impl SyncConfig {
    /// Creates a config with the given prefix and delimiter.
    pub fn new(prefix: impl Into<String>, delimiter: Delimiter) -> Self {
        Self {
            prefix: prefix.into(),
            delimiter,
        }
    }

    /// Checks that the prefix is usable as a single channel segment.
    pub fn validate(&self) -> SyncResult<()> {
        let bare = self.bare_prefix();
        if bare.is_empty() {
            return Err(SyncError::Config("prefix must not be empty".into()));
        }
        if bare.contains(self.delimiter.as_str()) {
            return Err(SyncError::Config(format!(
                "prefix {:?} must not contain the delimiter {:?}",
                self.prefix,
                self.delimiter.as_str()
            )));
        }
        Ok(())
    }

    /// Name of the root channel. A prefix that already starts with the
    /// delimiter is used as is.
    pub fn root_channel(&self) -> String {
        format!("{}{}", self.delimiter, self.bare_prefix())
    }

    /// Name of the channel that carries the subtree at `keypath`.
    pub fn channel_name(&self, keypath: &Keypath) -> String {
        let root = self.root_channel();
        if keypath.is_root() {
            return root;
        }
        format!("{root}{}{}", self.delimiter, keypath.render(&self.delimiter))
    }

    /// Inverse of [`channel_name`](Self::channel_name). Returns `None` for
    /// names outside this prefix.
    pub fn keypath_for_channel(&self, name: &str) -> Option<Keypath> {
        let rest = name.strip_prefix(self.root_channel().as_str())?;
        if rest.is_empty() {
            return Some(Keypath::root());
        }
        let rest = rest.strip_prefix(self.delimiter.as_str())?;
        Some(Keypath::parse(rest, &self.delimiter))
    }

    fn bare_prefix(&self) -> &str {
        self.prefix
            .strip_prefix(self.delimiter.as_str())
            .unwrap_or(&self.prefix)
    }
}
