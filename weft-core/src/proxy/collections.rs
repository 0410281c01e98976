//! Collection Handlers
//!
//! Accessor methods for maps, sets, and their weak variants. Each operation
//! is instrumented at its single chokepoint; the method set per kind is
//! closed, so there is no generic dispatch for unrelated same-named
//! properties to collide with.
//!
//! Entry deps are keyed by value for scalars and by raw-target identity for
//! containers, so a proxy key and its raw target address the same entry.
//! Membership reads (`len`, iteration) depend on the synthetic iterate key.
//!
//! Weak variants hold container keys by weak reference: an entry whose key
//! node has been dropped is pruned opportunistically and is never
//! observable. They expose no size and no iteration; membership can only
//! be asked about, never enumerated.

use std::sync::{Arc, Weak};

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::reactive::{DepKey, TrackOp, TriggerOp};

use super::value::{
    access, entry_key, Access, MapRef, MapSlot, Node, SetRef, Storage, Value, WeakMapRef,
    WeakSetRef,
};

impl MapRef {
    /// New empty raw map.
    pub fn new() -> Self {
        Self::from_node(Node::raw(false, Storage::Map(IndexMap::new())))
    }

    /// New raw map flagged as host-internal.
    pub fn internal() -> Self {
        Self::from_node(Node::raw(true, Storage::Map(IndexMap::new())))
    }

    /// Read the value stored under `key`. Missing entries read as `Null`.
    pub fn get(&self, key: &Value) -> Value {
        let entry = entry_key(key);
        match access(&self.node) {
            Access::Plain { target, .. } => {
                let mut storage = target.storage();
                storage
                    .as_map()
                    .get(&entry)
                    .map(|slot| slot.value.clone())
                    .unwrap_or(Value::Null)
            }
            Access::Tracked {
                runtime,
                target,
                readonly,
            } => {
                runtime.track(&target, TrackOp::Get, DepKey::Entry(entry.clone()));
                let raw = {
                    let mut storage = target.storage();
                    storage
                        .as_map()
                        .get(&entry)
                        .map(|slot| slot.value.clone())
                        .unwrap_or(Value::Null)
                };
                runtime.observe(raw, readonly)
            }
        }
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        let entry = entry_key(key);
        match access(&self.node) {
            Access::Plain { target, .. } => {
                let mut storage = target.storage();
                storage.as_map().contains_key(&entry)
            }
            Access::Tracked {
                runtime, target, ..
            } => {
                runtime.track(&target, TrackOp::Has, DepKey::Entry(entry.clone()));
                let mut storage = target.storage();
                storage.as_map().contains_key(&entry)
            }
        }
    }

    /// Store `value` under `key`; both are normalized to raw first.
    pub fn insert(&self, key: Value, value: Value) {
        let key_raw = key.to_raw();
        let entry = entry_key(&key_raw);
        match access(&self.node) {
            Access::Plain { target, readonly } => {
                if readonly {
                    return;
                }
                target.storage().as_map().insert(
                    entry,
                    MapSlot {
                        key: key_raw,
                        value: value.to_raw(),
                    },
                );
            }
            Access::Tracked {
                runtime,
                target,
                readonly,
            } => {
                if readonly {
                    runtime.warn("insert() blocked on a readonly map");
                    return;
                }
                let raw = value.to_raw();
                let (had, changed) = {
                    let mut storage = target.storage();
                    let old = storage.as_map().insert(
                        entry.clone(),
                        MapSlot {
                            key: key_raw,
                            value: raw.clone(),
                        },
                    );
                    match old {
                        Some(old) => (true, old.value != raw),
                        None => (false, true),
                    }
                };
                if !had {
                    runtime.trigger(target.id, TriggerOp::Add, Some(DepKey::Entry(entry)));
                } else if changed {
                    runtime.trigger(target.id, TriggerOp::Set, Some(DepKey::Entry(entry)));
                }
            }
        }
    }

    /// Delete the entry under `key`. Returns whether it existed.
    pub fn remove(&self, key: &Value) -> bool {
        let entry = entry_key(key);
        match access(&self.node) {
            Access::Plain { target, readonly } => {
                if readonly {
                    return false;
                }
                target.storage().as_map().shift_remove(&entry).is_some()
            }
            Access::Tracked {
                runtime,
                target,
                readonly,
            } => {
                if readonly {
                    runtime.warn("remove() blocked on a readonly map");
                    return false;
                }
                let had = {
                    let mut storage = target.storage();
                    storage.as_map().shift_remove(&entry).is_some()
                };
                if had {
                    runtime.trigger(target.id, TriggerOp::Delete, Some(DepKey::Entry(entry)));
                }
                had
            }
        }
    }

    /// Remove every entry. One `Clear` trigger when the map was non-empty.
    pub fn clear(&self) {
        match access(&self.node) {
            Access::Plain { target, readonly } => {
                if readonly {
                    return;
                }
                target.storage().as_map().clear();
            }
            Access::Tracked {
                runtime,
                target,
                readonly,
            } => {
                if readonly {
                    runtime.warn("clear() blocked on a readonly map");
                    return;
                }
                let had_items = {
                    let mut storage = target.storage();
                    let map = storage.as_map();
                    let had = !map.is_empty();
                    map.clear();
                    had
                };
                if had_items {
                    runtime.trigger(target.id, TriggerOp::Clear, None);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        match access(&self.node) {
            Access::Plain { target, .. } => {
                let mut storage = target.storage();
                storage.as_map().len()
            }
            Access::Tracked {
                runtime, target, ..
            } => {
                runtime.track(&target, TrackOp::Iterate, DepKey::Iterate);
                let mut storage = target.storage();
                storage.as_map().len()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit every entry as `(key, value)`, in insertion order. Iterates a
    /// snapshot, so the callback may mutate the map.
    pub fn for_each(&self, mut f: impl FnMut(&Value, &Value)) {
        for (key, value) in self.entries() {
            f(&key, &value);
        }
    }

    /// Snapshot of the keys, wrapped like any other read.
    pub fn keys(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(key, _)| key).collect()
    }

    /// Snapshot of the values, wrapped like any other read.
    pub fn values(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(_, value)| value).collect()
    }

    /// Snapshot of the entries, wrapped like any other read.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        match access(&self.node) {
            Access::Plain { target, .. } => {
                let mut storage = target.storage();
                storage
                    .as_map()
                    .values()
                    .map(|slot| (slot.key.clone(), slot.value.clone()))
                    .collect()
            }
            Access::Tracked {
                runtime,
                target,
                readonly,
            } => {
                runtime.track(&target, TrackOp::Iterate, DepKey::Iterate);
                let snapshot: Vec<(Value, Value)> = {
                    let mut storage = target.storage();
                    storage
                        .as_map()
                        .values()
                        .map(|slot| (slot.key.clone(), slot.value.clone()))
                        .collect()
                };
                snapshot
                    .into_iter()
                    .map(|(key, value)| {
                        (
                            runtime.observe(key, readonly),
                            runtime.observe(value, readonly),
                        )
                    })
                    .collect()
            }
        }
    }
}

impl SetRef {
    /// New empty raw set.
    pub fn new() -> Self {
        Self::from_node(Node::raw(false, Storage::Set(IndexMap::new())))
    }

    /// New raw set flagged as host-internal.
    pub fn internal() -> Self {
        Self::from_node(Node::raw(true, Storage::Set(IndexMap::new())))
    }

    /// Add a member (normalized to raw). Triggers only when it was new.
    pub fn add(&self, value: Value) {
        let raw = value.to_raw();
        let entry = entry_key(&raw);
        match access(&self.node) {
            Access::Plain { target, readonly } => {
                if readonly {
                    return;
                }
                target.storage().as_set().insert(entry, raw);
            }
            Access::Tracked {
                runtime,
                target,
                readonly,
            } => {
                if readonly {
                    runtime.warn("add() blocked on a readonly set");
                    return;
                }
                let was_new = {
                    let mut storage = target.storage();
                    storage.as_set().insert(entry.clone(), raw).is_none()
                };
                if was_new {
                    runtime.trigger(target.id, TriggerOp::Add, Some(DepKey::Entry(entry)));
                }
            }
        }
    }

    pub fn contains(&self, value: &Value) -> bool {
        let entry = entry_key(value);
        match access(&self.node) {
            Access::Plain { target, .. } => {
                let mut storage = target.storage();
                storage.as_set().contains_key(&entry)
            }
            Access::Tracked {
                runtime, target, ..
            } => {
                runtime.track(&target, TrackOp::Has, DepKey::Entry(entry.clone()));
                let mut storage = target.storage();
                storage.as_set().contains_key(&entry)
            }
        }
    }

    /// Remove a member. Returns whether it was present.
    pub fn remove(&self, value: &Value) -> bool {
        let entry = entry_key(value);
        match access(&self.node) {
            Access::Plain { target, readonly } => {
                if readonly {
                    return false;
                }
                target.storage().as_set().shift_remove(&entry).is_some()
            }
            Access::Tracked {
                runtime,
                target,
                readonly,
            } => {
                if readonly {
                    runtime.warn("remove() blocked on a readonly set");
                    return false;
                }
                let had = {
                    let mut storage = target.storage();
                    storage.as_set().shift_remove(&entry).is_some()
                };
                if had {
                    runtime.trigger(target.id, TriggerOp::Delete, Some(DepKey::Entry(entry)));
                }
                had
            }
        }
    }

    /// Remove every member. One `Clear` trigger when the set was non-empty.
    pub fn clear(&self) {
        match access(&self.node) {
            Access::Plain { target, readonly } => {
                if readonly {
                    return;
                }
                target.storage().as_set().clear();
            }
            Access::Tracked {
                runtime,
                target,
                readonly,
            } => {
                if readonly {
                    runtime.warn("clear() blocked on a readonly set");
                    return;
                }
                let had_items = {
                    let mut storage = target.storage();
                    let set = storage.as_set();
                    let had = !set.is_empty();
                    set.clear();
                    had
                };
                if had_items {
                    runtime.trigger(target.id, TriggerOp::Clear, None);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        match access(&self.node) {
            Access::Plain { target, .. } => {
                let mut storage = target.storage();
                storage.as_set().len()
            }
            Access::Tracked {
                runtime, target, ..
            } => {
                runtime.track(&target, TrackOp::Iterate, DepKey::Iterate);
                let mut storage = target.storage();
                storage.as_set().len()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit every member, in insertion order, over a snapshot.
    pub fn for_each(&self, mut f: impl FnMut(&Value)) {
        for value in self.to_vec() {
            f(&value);
        }
    }

    /// Snapshot of the members, wrapped like any other read.
    pub fn to_vec(&self) -> Vec<Value> {
        match access(&self.node) {
            Access::Plain { target, .. } => {
                let mut storage = target.storage();
                storage.as_set().values().cloned().collect()
            }
            Access::Tracked {
                runtime,
                target,
                readonly,
            } => {
                runtime.track(&target, TrackOp::Iterate, DepKey::Iterate);
                let snapshot: Vec<Value> = {
                    let mut storage = target.storage();
                    storage.as_set().values().cloned().collect()
                };
                snapshot
                    .into_iter()
                    .map(|value| runtime.observe(value, readonly))
                    .collect()
            }
        }
    }
}

/// The raw key node of a weak-collection operand, or the kind name for the
/// error path.
fn weak_key_node(key: &Value) -> std::result::Result<Arc<Node>, &'static str> {
    match key.to_raw().node() {
        Some(node) => Ok(Arc::clone(node)),
        None => Err(key.kind_name()),
    }
}

fn prune_weak_map(entries: &mut Vec<(Weak<Node>, Value)>) {
    entries.retain(|(weak, _)| weak.strong_count() > 0);
}

fn prune_weak_set(entries: &mut Vec<Weak<Node>>) {
    entries.retain(|weak| weak.strong_count() > 0);
}

impl WeakMapRef {
    /// New empty raw weak map.
    pub fn new() -> Self {
        Self::from_node(Node::raw(false, Storage::WeakMap(Vec::new())))
    }

    /// Read the value stored under a container key. Scalar keys and dead
    /// keys read as `Null`.
    pub fn get(&self, key: &Value) -> Value {
        let Ok(key_node) = weak_key_node(key) else {
            return Value::Null;
        };
        match access(&self.node) {
            Access::Plain { target, .. } => {
                let mut storage = target.storage();
                let entries = storage.as_weak_map();
                prune_weak_map(entries);
                lookup_weak_map(entries, &key_node)
            }
            Access::Tracked {
                runtime,
                target,
                readonly,
            } => {
                runtime.track(
                    &target,
                    TrackOp::Get,
                    DepKey::Entry(entry_key(&key.to_raw())),
                );
                let raw = {
                    let mut storage = target.storage();
                    let entries = storage.as_weak_map();
                    prune_weak_map(entries);
                    lookup_weak_map(entries, &key_node)
                };
                runtime.observe(raw, readonly)
            }
        }
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        let Ok(key_node) = weak_key_node(key) else {
            return false;
        };
        match access(&self.node) {
            Access::Plain { target, .. } => {
                let mut storage = target.storage();
                let entries = storage.as_weak_map();
                prune_weak_map(entries);
                entries
                    .iter()
                    .any(|(weak, _)| weak.as_ptr() == Arc::as_ptr(&key_node))
            }
            Access::Tracked {
                runtime, target, ..
            } => {
                runtime.track(
                    &target,
                    TrackOp::Has,
                    DepKey::Entry(entry_key(&key.to_raw())),
                );
                let mut storage = target.storage();
                let entries = storage.as_weak_map();
                prune_weak_map(entries);
                entries
                    .iter()
                    .any(|(weak, _)| weak.as_ptr() == Arc::as_ptr(&key_node))
            }
        }
    }

    /// Store `value` under a container key, held weakly. A scalar key is
    /// the one genuinely rejected input in the engine.
    pub fn insert(&self, key: &Value, value: Value) -> Result<()> {
        let key_node = weak_key_node(key).map_err(Error::InvalidWeakKey)?;
        match access(&self.node) {
            Access::Plain { target, readonly } => {
                if readonly {
                    return Ok(());
                }
                let mut storage = target.storage();
                let entries = storage.as_weak_map();
                prune_weak_map(entries);
                store_weak_map(entries, &key_node, value.to_raw());
                Ok(())
            }
            Access::Tracked {
                runtime,
                target,
                readonly,
            } => {
                if readonly {
                    runtime.warn("insert() blocked on a readonly weak map");
                    return Ok(());
                }
                let raw = value.to_raw();
                let (had, changed) = {
                    let mut storage = target.storage();
                    let entries = storage.as_weak_map();
                    prune_weak_map(entries);
                    let old = store_weak_map(entries, &key_node, raw.clone());
                    match old {
                        Some(old) => (true, old != raw),
                        None => (false, true),
                    }
                };
                let entry = DepKey::Entry(entry_key(&key.to_raw()));
                if !had {
                    runtime.trigger(target.id, TriggerOp::Add, Some(entry));
                } else if changed {
                    runtime.trigger(target.id, TriggerOp::Set, Some(entry));
                }
                Ok(())
            }
        }
    }

    /// Delete the entry under `key`. Scalar keys report `false`.
    pub fn remove(&self, key: &Value) -> bool {
        let Ok(key_node) = weak_key_node(key) else {
            return false;
        };
        match access(&self.node) {
            Access::Plain { target, readonly } => {
                if readonly {
                    return false;
                }
                let mut storage = target.storage();
                let entries = storage.as_weak_map();
                prune_weak_map(entries);
                remove_weak_map(entries, &key_node)
            }
            Access::Tracked {
                runtime,
                target,
                readonly,
            } => {
                if readonly {
                    runtime.warn("remove() blocked on a readonly weak map");
                    return false;
                }
                let had = {
                    let mut storage = target.storage();
                    let entries = storage.as_weak_map();
                    prune_weak_map(entries);
                    remove_weak_map(entries, &key_node)
                };
                if had {
                    runtime.trigger(
                        target.id,
                        TriggerOp::Delete,
                        Some(DepKey::Entry(entry_key(&key.to_raw()))),
                    );
                }
                had
            }
        }
    }
}

fn lookup_weak_map(entries: &[(Weak<Node>, Value)], key: &Arc<Node>) -> Value {
    entries
        .iter()
        .find(|(weak, _)| weak.as_ptr() == Arc::as_ptr(key))
        .map(|(_, value)| value.clone())
        .unwrap_or(Value::Null)
}

fn store_weak_map(
    entries: &mut Vec<(Weak<Node>, Value)>,
    key: &Arc<Node>,
    value: Value,
) -> Option<Value> {
    for (weak, stored) in entries.iter_mut() {
        if weak.as_ptr() == Arc::as_ptr(key) {
            return Some(std::mem::replace(stored, value));
        }
    }
    entries.push((Arc::downgrade(key), value));
    None
}

fn remove_weak_map(entries: &mut Vec<(Weak<Node>, Value)>, key: &Arc<Node>) -> bool {
    let before = entries.len();
    entries.retain(|(weak, _)| weak.as_ptr() != Arc::as_ptr(key));
    entries.len() != before
}

impl WeakSetRef {
    /// New empty raw weak set.
    pub fn new() -> Self {
        Self::from_node(Node::raw(false, Storage::WeakSet(Vec::new())))
    }

    /// Add a container member, held weakly. Scalar members are rejected.
    pub fn add(&self, value: &Value) -> Result<()> {
        let member = weak_key_node(value).map_err(Error::InvalidWeakKey)?;
        match access(&self.node) {
            Access::Plain { target, readonly } => {
                if readonly {
                    return Ok(());
                }
                let mut storage = target.storage();
                let entries = storage.as_weak_set();
                prune_weak_set(entries);
                if !entries.iter().any(|w| w.as_ptr() == Arc::as_ptr(&member)) {
                    entries.push(Arc::downgrade(&member));
                }
                Ok(())
            }
            Access::Tracked {
                runtime,
                target,
                readonly,
            } => {
                if readonly {
                    runtime.warn("add() blocked on a readonly weak set");
                    return Ok(());
                }
                let was_new = {
                    let mut storage = target.storage();
                    let entries = storage.as_weak_set();
                    prune_weak_set(entries);
                    if entries.iter().any(|w| w.as_ptr() == Arc::as_ptr(&member)) {
                        false
                    } else {
                        entries.push(Arc::downgrade(&member));
                        true
                    }
                };
                if was_new {
                    runtime.trigger(
                        target.id,
                        TriggerOp::Add,
                        Some(DepKey::Entry(entry_key(&value.to_raw()))),
                    );
                }
                Ok(())
            }
        }
    }

    pub fn contains(&self, value: &Value) -> bool {
        let Ok(member) = weak_key_node(value) else {
            return false;
        };
        match access(&self.node) {
            Access::Plain { target, .. } => {
                let mut storage = target.storage();
                let entries = storage.as_weak_set();
                prune_weak_set(entries);
                entries.iter().any(|w| w.as_ptr() == Arc::as_ptr(&member))
            }
            Access::Tracked {
                runtime, target, ..
            } => {
                runtime.track(
                    &target,
                    TrackOp::Has,
                    DepKey::Entry(entry_key(&value.to_raw())),
                );
                let mut storage = target.storage();
                let entries = storage.as_weak_set();
                prune_weak_set(entries);
                entries.iter().any(|w| w.as_ptr() == Arc::as_ptr(&member))
            }
        }
    }

    /// Remove a member. Scalar members report `false`.
    pub fn remove(&self, value: &Value) -> bool {
        let Ok(member) = weak_key_node(value) else {
            return false;
        };
        match access(&self.node) {
            Access::Plain { target, readonly } => {
                if readonly {
                    return false;
                }
                let mut storage = target.storage();
                let entries = storage.as_weak_set();
                prune_weak_set(entries);
                let before = entries.len();
                entries.retain(|w| w.as_ptr() != Arc::as_ptr(&member));
                entries.len() != before
            }
            Access::Tracked {
                runtime,
                target,
                readonly,
            } => {
                if readonly {
                    runtime.warn("remove() blocked on a readonly weak set");
                    return false;
                }
                let had = {
                    let mut storage = target.storage();
                    let entries = storage.as_weak_set();
                    prune_weak_set(entries);
                    let before = entries.len();
                    entries.retain(|w| w.as_ptr() != Arc::as_ptr(&member));
                    entries.len() != before
                };
                if had {
                    runtime.trigger(
                        target.id,
                        TriggerOp::Delete,
                        Some(DepKey::Entry(entry_key(&value.to_raw()))),
                    );
                }
                had
            }
        }
    }
}

impl Default for MapRef {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for SetRef {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for WeakMapRef {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for WeakSetRef {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
