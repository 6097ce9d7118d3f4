//! The key-value-coded object: a JSON tree addressed by keypaths.

use crate::error::{StoreError, StoreResult, kind_of};
use crate::event::{ChangeBatch, StoreObserver, SubscriptionId, diff_node};
use objdist_types::{FlatChanges, Keypath};
use serde_json::{Map, Value};
use std::fmt;
use tracing::trace;

/// How a mutation is announced to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetMode {
    /// Emit the change (and anything pending) immediately.
    #[default]
    Local,
    /// Record the change without emitting. Used to apply remote-origin
    /// updates; call [`KvcObject::emit_changes`] to flush.
    Silent,
}

/// A JSON tree whose root is always an object.
///
/// Every mutation is diffed against the previous tree and reported as a
/// [`ChangeBatch`]: nodes created, nodes deleted, and the flat set of leaf
/// changes. Subscribed observers receive the batch as [`StoreEvent`]s
/// synchronously before the mutating call returns.
///
/// [`StoreEvent`]: crate::StoreEvent
pub struct KvcObject {
    tree: Value,
    pending: ChangeBatch,
    listeners: Vec<(SubscriptionId, Box<dyn StoreObserver + Send>)>,
    next_subscription: u64,
}

impl KvcObject {
    /// Creates an empty store (`{}`).
    pub fn new() -> Self {
        Self {
            tree: Value::Object(Map::new()),
            pending: ChangeBatch::default(),
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Creates a store pre-seeded with `tree`. Nothing is emitted.
    pub fn with_object(tree: Value) -> StoreResult<Self> {
        if !tree.is_object() {
            return Err(StoreError::NotAnObject(kind_of(&tree)));
        }
        Ok(Self {
            tree,
            ..Self::new()
        })
    }

    /// Returns the whole tree.
    pub fn get_object(&self) -> &Value {
        &self.tree
    }

    /// Returns the value at `keypath`, or `None` if nothing lives there.
    pub fn get_object_at_keypath(&self, keypath: &Keypath) -> Option<&Value> {
        keypath
            .segments()
            .iter()
            .try_fold(&self.tree, |node, segment| node.as_object()?.get(segment))
    }

    /// Replaces the whole tree and emits the resulting changes.
    pub fn set_object(&mut self, tree: Value) -> StoreResult<ChangeBatch> {
        self.set_value_at_keypath(Some(tree), &Keypath::root(), SetMode::Local)
    }

    /// Sets the value at `keypath`, or deletes it when `value` is `None`.
    ///
    /// Missing intermediate objects are created, replacing any scalar in the
    /// way. Deleting a keypath that does not exist changes nothing. At the
    /// root, `None` clears the tree and anything but an object is rejected.
    ///
    /// Returns the emitted batch, which is always empty in
    /// [`SetMode::Silent`].
    pub fn set_value_at_keypath(
        &mut self,
        value: Option<Value>,
        keypath: &Keypath,
        mode: SetMode,
    ) -> StoreResult<ChangeBatch> {
        let batch = if keypath.is_root() {
            self.replace_root(value)?
        } else {
            self.replace_node(value, keypath)
        };
        trace!(%keypath, ?mode, changes = batch.changes.len(), "store mutation");
        self.pending.merge(batch);

        match mode {
            SetMode::Local => Ok(self.emit_changes()),
            SetMode::Silent => Ok(ChangeBatch::default()),
        }
    }

    /// Whether silent mutations are waiting to be emitted.
    pub fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Emits everything recorded since the last emission to the subscribed
    /// observers and returns it.
    pub fn emit_changes(&mut self) -> ChangeBatch {
        let batch = std::mem::take(&mut self.pending);
        if batch.is_empty() {
            return batch;
        }

        let events = batch.events();
        for (_, listener) in &mut self.listeners {
            for event in &events {
                listener.on_event(event);
            }
        }
        batch
    }

    /// Registers an observer for every emitted batch.
    pub fn subscribe<O>(&mut self, observer: O) -> SubscriptionId
    where
        O: StoreObserver + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(observer)));
        id
    }

    /// Removes an observer. Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener, _)| *listener != id);
        self.listeners.len() != before
    }

    /// Every keypath that addresses a node of the tree, root included,
    /// in ascending order.
    pub fn node_keypaths(&self) -> Vec<Keypath> {
        let mut batch = ChangeBatch::default();
        diff_node(None, Some(&self.tree), &Keypath::root(), &mut batch);
        let mut keypaths = Vec::with_capacity(batch.created.len() + 1);
        keypaths.push(Keypath::root());
        keypaths.extend(batch.created);
        keypaths
    }

    /// All leaf values of the tree as a flat change-set.
    pub fn flat_values(&self) -> FlatChanges {
        let mut batch = ChangeBatch::default();
        diff_node(None, Some(&self.tree), &Keypath::root(), &mut batch);
        batch.changes
    }

    fn replace_root(&mut self, value: Option<Value>) -> StoreResult<ChangeBatch> {
        let tree = match value {
            None => Value::Object(Map::new()),
            Some(tree @ Value::Object(_)) => tree,
            Some(other) => return Err(StoreError::NotAnObject(kind_of(&other))),
        };

        let mut batch = ChangeBatch::default();
        diff_node(Some(&self.tree), Some(&tree), &Keypath::root(), &mut batch);
        self.tree = tree;
        Ok(batch)
    }

    fn replace_node(&mut self, value: Option<Value>, keypath: &Keypath) -> ChangeBatch {
        let segments = keypath.segments();
        let parent_len = segments.len() - 1;

        // Deepest existing object on the way to the parent.
        let mut anchor_len = 0;
        let mut node = &self.tree;
        while anchor_len < parent_len {
            match node.get(&segments[anchor_len]) {
                Some(child) if child.is_object() => {
                    node = child;
                    anchor_len += 1;
                }
                _ => break,
            }
        }

        if value.is_none() && anchor_len < parent_len {
            return ChangeBatch::default();
        }

        // Only the anchor's child on the way to `keypath` can change. With an
        // existing parent that child is the target itself; otherwise it is
        // missing or a scalar about to become an object.
        let changed_at = Keypath::new(segments[..=anchor_len].iter().cloned());
        let before = node.get(&segments[anchor_len]).cloned();

        let anchor = Keypath::new(segments[..anchor_len].iter().cloned());
        let Some(anchor_node) = self.node_mut(&anchor) else {
            return ChangeBatch::default();
        };
        let mut cursor = anchor_node;
        for segment in &segments[anchor_len..parent_len] {
            cursor = ensure_object(cursor)
                .entry(segment.clone())
                .or_insert(Value::Null);
        }
        let parent = ensure_object(cursor);
        let last = &segments[parent_len];
        match value {
            Some(value) => {
                parent.insert(last.clone(), value);
            }
            None => {
                parent.remove(last);
            }
        }

        let mut batch = ChangeBatch::default();
        diff_node(
            before.as_ref(),
            self.get_object_at_keypath(&changed_at),
            &changed_at,
            &mut batch,
        );
        batch
    }

    fn node_mut(&mut self, keypath: &Keypath) -> Option<&mut Value> {
        keypath
            .segments()
            .iter()
            .try_fold(&mut self.tree, |node, segment| {
                node.as_object_mut()?.get_mut(segment)
            })
    }
}

impl Default for KvcObject {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KvcObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvcObject")
            .field("tree", &self.tree)
            .field("pending", &self.pending)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced by an object"),
    }
}
