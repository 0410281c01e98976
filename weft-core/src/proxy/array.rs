//! Array Handlers
//!
//! Accessor methods for index-addressed sequences. Arrays use the `Length`
//! dep where objects use the synthetic iterate key: `len`, `is_empty`,
//! `to_vec`, and `slice` depend on it, and every membership change (push,
//! pop, insert, remove, out-of-bounds set) invalidates it.
//!
//! Splice-style mutations re-index the shifted suffix and fire a per-index
//! `Set` for every moved slot, plus `Add`/`Delete` at the boundary. Writing
//! past the end pads the gap with `Null`; the holes materialize silently
//! because a tracked read of a missing index already observed `Null`.

use crate::reactive::{DepKey, TrackOp, TriggerOp};

use super::value::{access, Access, ArrayRef, Node, Storage, Value};

impl ArrayRef {
    /// New empty raw array.
    pub fn new() -> Self {
        Self::from_node(Node::raw(false, Storage::Array(Vec::new())))
    }

    /// New raw array flagged as host-internal.
    pub fn internal() -> Self {
        Self::from_node(Node::raw(true, Storage::Array(Vec::new())))
    }

    /// Build a raw array from values, each stored raw.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let arr = Self::new();
        {
            let mut storage = arr.node.storage();
            let vec = storage.as_array();
            for value in values {
                vec.push(value.to_raw());
            }
        }
        arr
    }

    /// Read one slot. Out-of-bounds reads as `Null`.
    pub fn get(&self, index: usize) -> Value {
        match access(&self.node) {
            Access::Plain { target, .. } => {
                let mut storage = target.storage();
                storage.as_array().get(index).cloned().unwrap_or(Value::Null)
            }
            Access::Tracked {
                runtime,
                target,
                readonly,
            } => {
                runtime.track(&target, TrackOp::Get, DepKey::Index(index));
                let raw = {
                    let mut storage = target.storage();
                    storage.as_array().get(index).cloned().unwrap_or(Value::Null)
                };
                runtime.observe(raw, readonly)
            }
        }
    }

    /// Write one slot. In-bounds replacement triggers `Set` when the value
    /// changed; writing at or past the end appends (padding any gap with
    /// `Null`) and triggers `Add`.
    pub fn set(&self, index: usize, value: Value) {
        match access(&self.node) {
            Access::Plain { target, readonly } => {
                if readonly {
                    return;
                }
                let mut storage = target.storage();
                let vec = storage.as_array();
                if index < vec.len() {
                    vec[index] = value.to_raw();
                } else {
                    vec.resize(index, Value::Null);
                    vec.push(value.to_raw());
                }
            }
            Access::Tracked {
                runtime,
                target,
                readonly,
            } => {
                if readonly {
                    runtime.warn(&format!("set({index}) blocked on a readonly array"));
                    return;
                }
                let raw = value.to_raw();
                let inserted = {
                    let mut storage = target.storage();
                    let vec = storage.as_array();
                    if index < vec.len() {
                        let old = std::mem::replace(&mut vec[index], raw.clone());
                        if old == raw {
                            return;
                        }
                        false
                    } else {
                        vec.resize(index, Value::Null);
                        vec.push(raw);
                        true
                    }
                };
                let op = if inserted { TriggerOp::Add } else { TriggerOp::Set };
                runtime.trigger(target.id, op, Some(DepKey::Index(index)));
            }
        }
    }

    /// Append a value.
    pub fn push(&self, value: Value) {
        match access(&self.node) {
            Access::Plain { target, readonly } => {
                if readonly {
                    return;
                }
                target.storage().as_array().push(value.to_raw());
            }
            Access::Tracked {
                runtime,
                target,
                readonly,
            } => {
                if readonly {
                    runtime.warn("push() blocked on a readonly array");
                    return;
                }
                let index = {
                    let mut storage = target.storage();
                    let vec = storage.as_array();
                    vec.push(value.to_raw());
                    vec.len() - 1
                };
                runtime.trigger(target.id, TriggerOp::Add, Some(DepKey::Index(index)));
            }
        }
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<Value> {
        match access(&self.node) {
            Access::Plain { target, readonly } => {
                if readonly {
                    return None;
                }
                target.storage().as_array().pop()
            }
            Access::Tracked {
                runtime,
                target,
                readonly,
            } => {
                if readonly {
                    runtime.warn("pop() blocked on a readonly array");
                    return None;
                }
                let popped = {
                    let mut storage = target.storage();
                    let vec = storage.as_array();
                    let value = vec.pop();
                    let len = vec.len();
                    value.map(|value| (value, len))
                };
                popped.map(|(value, index)| {
                    runtime.trigger(target.id, TriggerOp::Delete, Some(DepKey::Index(index)));
                    runtime.observe(value, false)
                })
            }
        }
    }

    /// Insert at `index`, shifting the suffix right. Indices at or past the
    /// end delegate to [`set`].
    ///
    /// [`set`]: ArrayRef::set
    pub fn insert(&self, index: usize, value: Value) {
        match access(&self.node) {
            Access::Plain { target, readonly } => {
                if readonly {
                    return;
                }
                let mut storage = target.storage();
                let len = storage.as_array().len();
                if index >= len {
                    drop(storage);
                    self.set(index, value);
                } else {
                    storage.as_array().insert(index, value.to_raw());
                }
            }
            Access::Tracked {
                runtime,
                target,
                readonly,
            } => {
                if readonly {
                    runtime.warn(&format!("insert({index}) blocked on a readonly array"));
                    return;
                }
                let old_len = {
                    let mut storage = target.storage();
                    storage.as_array().len()
                };
                if index >= old_len {
                    self.set(index, value);
                    return;
                }
                {
                    let mut storage = target.storage();
                    storage.as_array().insert(index, value.to_raw());
                }
                // Every shifted slot changed; the new last slot is an add.
                for moved in index..old_len {
                    runtime.trigger(target.id, TriggerOp::Set, Some(DepKey::Index(moved)));
                }
                runtime.trigger(target.id, TriggerOp::Add, Some(DepKey::Index(old_len)));
            }
        }
    }

    /// Remove at `index`, shifting the suffix left. Out-of-bounds is `None`.
    pub fn remove(&self, index: usize) -> Option<Value> {
        match access(&self.node) {
            Access::Plain { target, readonly } => {
                if readonly {
                    return None;
                }
                let mut storage = target.storage();
                let vec = storage.as_array();
                if index < vec.len() {
                    Some(vec.remove(index))
                } else {
                    None
                }
            }
            Access::Tracked {
                runtime,
                target,
                readonly,
            } => {
                if readonly {
                    runtime.warn(&format!("remove({index}) blocked on a readonly array"));
                    return None;
                }
                let removed = {
                    let mut storage = target.storage();
                    let vec = storage.as_array();
                    if index < vec.len() {
                        Some((vec.remove(index), vec.len()))
                    } else {
                        None
                    }
                };
                removed.map(|(value, new_len)| {
                    for moved in index..new_len {
                        runtime.trigger(target.id, TriggerOp::Set, Some(DepKey::Index(moved)));
                    }
                    runtime.trigger(target.id, TriggerOp::Delete, Some(DepKey::Index(new_len)));
                    runtime.observe(value, false)
                })
            }
        }
    }

    /// Element count; depends on `Length` when tracked.
    pub fn len(&self) -> usize {
        match access(&self.node) {
            Access::Plain { target, .. } => {
                let mut storage = target.storage();
                storage.as_array().len()
            }
            Access::Tracked {
                runtime, target, ..
            } => {
                runtime.track(&target, TrackOp::Iterate, DepKey::Length);
                let mut storage = target.storage();
                storage.as_array().len()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot as a plain `Vec`. Elements are read through the
    /// instrumented per-index path, so they come back wrapped and
    /// reference-stable, not freshly re-wrapped copies.
    pub fn to_vec(&self) -> Vec<Value> {
        let len = self.len();
        (0..len).map(|i| self.get(i)).collect()
    }

    /// Snapshot of `[start, end)`, clamped to the array bounds. Same
    /// wrapping rules as [`to_vec`].
    ///
    /// [`to_vec`]: ArrayRef::to_vec
    pub fn slice(&self, start: usize, end: usize) -> Vec<Value> {
        let len = self.len();
        let end = end.min(len);
        let start = start.min(end);
        (start..end).map(|i| self.get(i)).collect()
    }

    /// Remove every element. Triggers every dep of the array at once.
    pub fn clear(&self) {
        match access(&self.node) {
            Access::Plain { target, readonly } => {
                if readonly {
                    return;
                }
                target.storage().as_array().clear();
            }
            Access::Tracked {
                runtime,
                target,
                readonly,
            } => {
                if readonly {
                    runtime.warn("clear() blocked on a readonly array");
                    return;
                }
                let had_items = {
                    let mut storage = target.storage();
                    let vec = storage.as_array();
                    let had = !vec.is_empty();
                    vec.clear();
                    had
                };
                if had_items {
                    runtime.trigger(target.id, TriggerOp::Clear, None);
                }
            }
        }
    }
}

impl Default for ArrayRef {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
