//! Applying remote-origin changes to a store without re-emitting them.

use objdist_store::{KvcObject, SetMode};
use objdist_types::{Delimiter, FlatChanges, Keypath};
use serde_json::Value;
use tracing::warn;

/// Silently applies `changes`, whose keypaths are relative to `scope`.
/// Returns how many entries were applied.
///
/// The root can only be replaced by an object. Anything else addressed at
/// the root (a scalar, or a deletion) is skipped with a warning, as is an
/// object value with a key that `delimiter` cannot represent and any entry
/// the store rejects.
pub(crate) fn apply_silently(
    store: &mut KvcObject,
    scope: &Keypath,
    changes: FlatChanges,
    delimiter: &Delimiter,
) -> usize {
    let mut applied = 0;
    for (relative, value) in changes {
        let keypath = scope.join(&relative);
        if keypath.is_root() && !matches!(value, Some(Value::Object(_))) {
            warn!("ignoring non-object change addressed at the root");
            continue;
        }
        let checked = keypath
            .check(delimiter)
            .and_then(|()| value.as_ref().map_or(Ok(()), |v| delimiter.check_keys(v)));
        if let Err(e) = checked {
            warn!(%keypath, error = %e, "ignoring remote change");
            continue;
        }
        match store.set_value_at_keypath(value, &keypath, SetMode::Silent) {
            Ok(_) => applied += 1,
            Err(e) => warn!(%keypath, error = %e, "ignoring remote change"),
        }
    }
    applied
}
