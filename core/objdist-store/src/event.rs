//! Change notifications emitted by the store.

use objdist_types::{FlatChanges, Keypath};
use serde_json::Value;
use std::collections::BTreeSet;

/// A notification emitted by [`KvcObject`](crate::KvcObject) when a batch of
/// changes is emitted.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// A node appeared at this keypath.
    StructureCreated(Keypath),
    /// The node at this keypath was removed.
    StructureDeleted(Keypath),
    /// Leaf values changed. `None` marks a deleted leaf.
    Update(FlatChanges),
}

/// Receives store events synchronously, inside the mutating call.
pub trait StoreObserver {
    fn on_event(&mut self, event: &StoreEvent);
}

impl<F> StoreObserver for F
where
    F: FnMut(&StoreEvent),
{
    fn on_event(&mut self, event: &StoreEvent) {
        self(event)
    }
}

/// Handle returned by [`KvcObject::subscribe`](crate::KvcObject::subscribe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Everything one mutation (or one batch of silent mutations) changed.
///
/// `created` is ordered ancestors first, `deleted` descendants first, so
/// observers can open and tear down per-node resources in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeBatch {
    pub created: Vec<Keypath>,
    pub deleted: Vec<Keypath>,
    pub changes: FlatChanges,
}

impl ChangeBatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.deleted.is_empty() && self.changes.is_empty()
    }

    /// The events of this batch in emission order: structure created,
    /// structure deleted, then a single update if any leaf changed.
    #[must_use]
    pub fn events(&self) -> Vec<StoreEvent> {
        let mut events = Vec::with_capacity(self.created.len() + self.deleted.len() + 1);
        events.extend(self.created.iter().cloned().map(StoreEvent::StructureCreated));
        events.extend(self.deleted.iter().cloned().map(StoreEvent::StructureDeleted));
        if !self.changes.is_empty() {
            events.push(StoreEvent::Update(self.changes.clone()));
        }
        events
    }

    /// Feeds the events of this batch to `observer`.
    pub fn dispatch<O: StoreObserver + ?Sized>(&self, observer: &mut O) {
        for event in self.events() {
            observer.on_event(&event);
        }
    }

    /// Folds a later batch into this one. A node created in one batch and
    /// deleted in the other cancels out; later leaf values win.
    pub(crate) fn merge(&mut self, later: ChangeBatch) {
        for keypath in later.created {
            if let Some(pos) = self.deleted.iter().position(|k| *k == keypath) {
                self.deleted.remove(pos);
            } else if !self.created.contains(&keypath) {
                self.created.push(keypath);
            }
        }
        for keypath in later.deleted {
            if let Some(pos) = self.created.iter().position(|k| *k == keypath) {
                self.created.remove(pos);
            } else if !self.deleted.contains(&keypath) {
                self.deleted.push(keypath);
            }
        }
        self.changes.extend(later.changes);

        self.created.sort();
        self.deleted.sort_by(|a, b| b.cmp(a));
    }
}

/// Diffs two versions of the node at `at`, recording created and deleted
/// nodes plus changed leaves into `batch`.
///
/// Objects never carry a leaf value of their own; any other JSON value is a
/// leaf. The root is never reported as created or deleted.
pub(crate) fn diff_node(
    old: Option<&Value>,
    new: Option<&Value>,
    at: &Keypath,
    batch: &mut ChangeBatch,
) {
    if old == new {
        return;
    }
    if !at.is_root() && old.is_none() && new.is_some() {
        batch.created.push(at.clone());
    }

    let old_leaf = old.filter(|v| !v.is_object());
    let new_leaf = new.filter(|v| !v.is_object());
    if old_leaf != new_leaf {
        batch.changes.insert(at.clone(), new_leaf.cloned());
    }

    let old_children = old.and_then(Value::as_object);
    let new_children = new.and_then(Value::as_object);
    let keys: BTreeSet<&String> = old_children
        .into_iter()
        .flat_map(|map| map.keys())
        .chain(new_children.into_iter().flat_map(|map| map.keys()))
        .collect();

    for key in keys {
        diff_node(
            old_children.and_then(|map| map.get(key)),
            new_children.and_then(|map| map.get(key)),
            &at.child(key.as_str()),
            batch,
        );
    }

    if !at.is_root() && old.is_some() && new.is_none() {
        batch.deleted.push(at.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kp(text: &str) -> Keypath {
        Keypath::new(text.split('/').filter(|s| !s.is_empty()))
    }

    #[test]
    fn leaf_replaced_by_object() {
        let mut batch = ChangeBatch::default();
        diff_node(
            Some(&json!({"foo": "bar"})),
            Some(&json!({"foo": {"x": 1}})),
            &Keypath::root(),
            &mut batch,
        );
        assert_eq!(batch.created, vec![kp("foo/x")]);
        assert!(batch.deleted.is_empty());
        assert_eq!(batch.changes.get(&kp("foo")), Some(&None));
        assert_eq!(batch.changes.get(&kp("foo/x")), Some(&Some(json!(1))));
    }

    #[test]
    fn merge_cancels_create_then_delete() {
        let mut first = ChangeBatch::default();
        first.created.push(kp("a"));
        let mut second = ChangeBatch::default();
        second.deleted.push(kp("a"));
        first.merge(second);
        assert!(first.created.is_empty());
        assert!(first.deleted.is_empty());
    }
}
