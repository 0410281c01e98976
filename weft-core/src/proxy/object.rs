//! Object Handlers
//!
//! Accessor methods for keyed records. On a raw handle these are plain
//! storage operations; on a proxy they are instrumented: reads `track`,
//! writes `trigger`, and container results are lazily wrapped in the same
//! variant as the outer proxy. Wrapping happens only on access, so cost is
//! bounded to the paths actually used.
//!
//! Key-set reads (`keys`, `entries`, `len`, `is_empty`) depend on the
//! synthetic iterate key, which `Add`/`Delete` writes invalidate.
//! Overwriting an existing property with an equal value triggers nothing.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::reactive::{DepKey, TrackOp, TriggerOp};

use super::value::{access, Access, Node, ObjectRef, Storage, Value};

impl ObjectRef {
    /// New empty raw object.
    pub fn new() -> Self {
        Self::from_node(Node::raw(false, Storage::Object(IndexMap::new())))
    }

    /// New raw object flagged as host-internal: the factory will never
    /// wrap it.
    pub fn internal() -> Self {
        Self::from_node(Node::raw(true, Storage::Object(IndexMap::new())))
    }

    /// Read a property. Missing keys read as `Null`.
    pub fn get(&self, key: &str) -> Value {
        match access(&self.node) {
            Access::Plain { target, .. } => {
                let mut storage = target.storage();
                storage.as_object().get(key).cloned().unwrap_or(Value::Null)
            }
            Access::Tracked {
                runtime,
                target,
                readonly,
            } => {
                runtime.track(&target, TrackOp::Get, DepKey::Prop(Arc::from(key)));
                let raw = {
                    let mut storage = target.storage();
                    storage.as_object().get(key).cloned().unwrap_or(Value::Null)
                };
                runtime.observe(raw, readonly)
            }
        }
    }

    /// Write a property. Values are stored raw (proxies are unwrapped).
    /// On a readonly handle this is a warn-only no-op.
    pub fn insert(&self, key: &str, value: Value) {
        match access(&self.node) {
            Access::Plain { target, readonly } => {
                if readonly {
                    return;
                }
                target
                    .storage()
                    .as_object()
                    .insert(Arc::from(key), value.to_raw());
            }
            Access::Tracked {
                runtime,
                target,
                readonly,
            } => {
                if readonly {
                    runtime.warn(&format!("insert({key:?}) blocked on a readonly object"));
                    return;
                }
                let raw = value.to_raw();
                let (had, changed) = {
                    let mut storage = target.storage();
                    let map = storage.as_object();
                    let old = map.insert(Arc::from(key), raw.clone());
                    match old {
                        Some(old) => (true, old != raw),
                        None => (false, true),
                    }
                };
                if !had {
                    runtime.trigger(target.id, TriggerOp::Add, Some(DepKey::Prop(Arc::from(key))));
                } else if changed {
                    runtime.trigger(target.id, TriggerOp::Set, Some(DepKey::Prop(Arc::from(key))));
                }
            }
        }
    }

    /// Delete a property. Returns whether it existed.
    pub fn remove(&self, key: &str) -> bool {
        match access(&self.node) {
            Access::Plain { target, readonly } => {
                if readonly {
                    return false;
                }
                target.storage().as_object().shift_remove(key).is_some()
            }
            Access::Tracked {
                runtime,
                target,
                readonly,
            } => {
                if readonly {
                    runtime.warn(&format!("remove({key:?}) blocked on a readonly object"));
                    return false;
                }
                let had = {
                    let mut storage = target.storage();
                    storage.as_object().shift_remove(key).is_some()
                };
                if had {
                    runtime.trigger(
                        target.id,
                        TriggerOp::Delete,
                        Some(DepKey::Prop(Arc::from(key))),
                    );
                }
                had
            }
        }
    }

    /// Test for a property without reading its value.
    pub fn contains_key(&self, key: &str) -> bool {
        match access(&self.node) {
            Access::Plain { target, .. } => {
                let mut storage = target.storage();
                storage.as_object().contains_key(key)
            }
            Access::Tracked {
                runtime, target, ..
            } => {
                runtime.track(&target, TrackOp::Has, DepKey::Prop(Arc::from(key)));
                let mut storage = target.storage();
                storage.as_object().contains_key(key)
            }
        }
    }

    /// Snapshot of the property names, in insertion order.
    pub fn keys(&self) -> Vec<Arc<str>> {
        match access(&self.node) {
            Access::Plain { target, .. } => {
                let mut storage = target.storage();
                storage.as_object().keys().cloned().collect()
            }
            Access::Tracked {
                runtime, target, ..
            } => {
                runtime.track(&target, TrackOp::Iterate, DepKey::Iterate);
                let mut storage = target.storage();
                storage.as_object().keys().cloned().collect()
            }
        }
    }

    /// Snapshot of the entries, values read through the instrumented
    /// per-key path so they come back wrapped.
    pub fn entries(&self) -> Vec<(Arc<str>, Value)> {
        let keys = self.keys();
        keys.into_iter()
            .map(|key| {
                let value = self.get(&key);
                (key, value)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        match access(&self.node) {
            Access::Plain { target, .. } => {
                let mut storage = target.storage();
                storage.as_object().len()
            }
            Access::Tracked {
                runtime, target, ..
            } => {
                runtime.track(&target, TrackOp::Iterate, DepKey::Iterate);
                let mut storage = target.storage();
                storage.as_object().len()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
