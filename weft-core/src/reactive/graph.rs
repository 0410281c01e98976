//! Dependency Graph
//!
//! The graph is a per-runtime index from (target, key) to the set of effects
//! that depend on it. It is populated by `track` calls made from proxy reads
//! and consumed by `trigger` calls made from proxy writes.
//!
//! # How It Works
//!
//! 1. While an effect runs, every instrumented read calls `track`, which
//!    files the effect under the (target, key) pair it just read.
//!
//! 2. An instrumented write calls `trigger`, which collects every effect
//!    filed under the written key (plus the membership deps when the key set
//!    changed) and re-runs or schedules each one.
//!
//! 3. Subscriptions are recorded in both directions: the dep holds the
//!    effect strongly, the effect remembers the (target, key) pairs it
//!    belongs to so it can unsubscribe before its next run and on `stop()`.
//!
//! # Locking
//!
//! The graph lock is only ever held for map bookkeeping. Effects, hooks,
//! and schedulers always run after the lock is released, so user code can
//! freely re-enter the engine.

use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;

use super::effect::{Effect, EffectInner, TrackEvent, TriggerEvent};
use super::runtime::RuntimeInner;
use crate::proxy::value::{EntryKey, Node, NodeId};

/// A dependency key: one observable facet of a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// A named object property.
    Prop(Arc<str>),
    /// An array slot.
    Index(usize),
    /// The element count of an array. Arrays route membership changes here.
    Length,
    /// A map key or set member.
    Entry(EntryKey),
    /// The synthetic "key set or membership changed" dependency used by
    /// keyed containers.
    Iterate,
    /// The output slot of a computed value.
    Value,
}

/// The kind of read that established a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOp {
    Get,
    Has,
    Iterate,
}

/// The kind of write that invalidated a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    /// An existing entry changed value.
    Set,
    /// A new entry appeared (membership changed).
    Add,
    /// An entry disappeared (membership changed).
    Delete,
    /// Everything went away at once.
    Clear,
}

/// The set of effects subscribed to one (target, key) pair.
///
/// Effects are held strongly here; the reverse edge (effect to dep) is just
/// the key pair, so dropping every handle to a target reclaims its deps
/// without reference cycles.
#[derive(Default)]
pub(crate) struct Dep {
    pub(crate) subscribers: IndexMap<u64, Arc<EffectInner>>,
}

/// All deps of one target, created lazily on first tracked read.
pub(crate) struct TargetDeps {
    /// Liveness handle: once the target is unreachable the whole entry is
    /// swept by `compact()`.
    pub(crate) target: Weak<Node>,
    pub(crate) deps: IndexMap<DepKey, Dep>,
}

impl RuntimeInner {
    /// Record that the currently running effect depends on `key` of
    /// `target`. No-op outside an effect or while tracking is paused.
    pub(crate) fn track(&self, target: &Arc<Node>, op: TrackOp, key: DepKey) {
        if self.tracking_paused() {
            return;
        }
        let Some(effect) = self.current_observer() else {
            return;
        };
        if !effect.is_active() {
            return;
        }

        let newly_subscribed = {
            let mut graph = self.graph.lock();
            let entry = graph.entry(target.id).or_insert_with(|| TargetDeps {
                target: Arc::downgrade(target),
                deps: IndexMap::new(),
            });
            let dep = entry.deps.entry(key.clone()).or_default();
            dep.subscribers
                .insert(effect.id(), Arc::clone(&effect))
                .is_none()
        };

        if newly_subscribed {
            effect.record_subscription(target.id, key.clone());
            // Hook runs with no engine locks held.
            if let Some(hook) = effect.on_track() {
                hook(&TrackEvent {
                    effect: effect.id(),
                    target: target.id,
                    op,
                    key,
                });
            }
        }
    }

    /// Notify every effect depending on `key` of the target that it changed.
    ///
    /// `Add` and `Delete` additionally take the membership deps (`Iterate`
    /// for keyed containers, `Length` for arrays; exactly one of the two is
    /// populated per target kind). `Clear` takes every dep of the target.
    /// `key` is `None` only for `Clear`.
    pub(crate) fn trigger(&self, target: NodeId, op: TriggerOp, key: Option<DepKey>) {
        let to_run: Vec<Arc<EffectInner>> = {
            let mut graph = self.graph.lock();
            let Some(entry) = graph.get_mut(&target) else {
                return;
            };

            let mut collected: IndexMap<u64, Arc<EffectInner>> = IndexMap::new();
            let mut take = |dep: &mut Dep| {
                // A dep never retains a stopped effect across a trigger.
                dep.subscribers.retain(|_, e| e.is_active());
                for (id, e) in dep.subscribers.iter() {
                    collected.entry(*id).or_insert_with(|| Arc::clone(e));
                }
            };

            match op {
                TriggerOp::Clear => {
                    for dep in entry.deps.values_mut() {
                        take(dep);
                    }
                }
                _ => {
                    if let Some(key) = &key {
                        if let Some(dep) = entry.deps.get_mut(key) {
                            take(dep);
                        }
                    }
                    if matches!(op, TriggerOp::Add | TriggerOp::Delete) {
                        if let Some(dep) = entry.deps.get_mut(&DepKey::Iterate) {
                            take(dep);
                        }
                        if let Some(dep) = entry.deps.get_mut(&DepKey::Length) {
                            take(dep);
                        }
                    }
                }
            }

            if collected.is_empty() {
                return;
            }

            // Computed runners go first so their dirty flags are set before
            // plain effects re-read them.
            let (computed, plain): (Vec<_>, Vec<_>) = collected
                .into_values()
                .partition(|e| e.is_computed());
            computed.into_iter().chain(plain).collect()
        };

        let current = self.current_observer().map(|e| e.id());
        let mut panic: Option<Box<dyn std::any::Any + Send>> = None;

        for effect in to_run {
            // Skip the effect that is performing this very write.
            if Some(effect.id()) == current {
                continue;
            }
            if !effect.is_active() {
                continue;
            }
            if let Some(hook) = effect.on_trigger() {
                hook(&TriggerEvent {
                    effect: effect.id(),
                    target,
                    op,
                    key: key.clone(),
                });
            }
            if let Some(scheduler) = effect.scheduler() {
                scheduler(&Effect::from_inner(Arc::clone(&effect)));
            } else {
                // Isolate each invocation: one panicking effect must not
                // starve the others in the same dep.
                let run = AssertUnwindSafe(|| effect.run());
                if let Err(payload) = catch_unwind(run) {
                    panic.get_or_insert(payload);
                }
            }
        }

        if let Some(payload) = panic {
            resume_unwind(payload);
        }
    }

    /// Remove `effect` from the dep for `key` of `target`, dropping empty
    /// deps and empty target entries behind it.
    pub(crate) fn unsubscribe(&self, target: NodeId, key: &DepKey, effect_id: u64) {
        let mut graph = self.graph.lock();
        let Some(entry) = graph.get_mut(&target) else {
            return;
        };
        if let Some(dep) = entry.deps.get_mut(key) {
            dep.subscribers.shift_remove(&effect_id);
            if dep.subscribers.is_empty() {
                entry.deps.shift_remove(key);
            }
        }
        if entry.deps.is_empty() {
            graph.shift_remove(&target);
        }
    }

    /// Drop graph entries whose target is gone.
    pub(crate) fn sweep_graph(&self) {
        self.graph
            .lock()
            .retain(|_, entry| entry.target.strong_count() > 0);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    use crate::reactive::runtime::Runtime;
    use crate::proxy::value::Value;

    #[test]
    fn reads_outside_effects_create_no_subscriptions() {
        let rt = Runtime::new();
        let state = rt.reactive(Value::object()).as_object().unwrap();

        state.insert("a", 1.into());
        let _ = state.get("a");

        assert_eq!(rt.dep_count(), 0);
    }

    #[test]
    fn trigger_on_untracked_target_is_a_no_op() {
        let rt = Runtime::new();
        let state = rt.reactive(Value::object()).as_object().unwrap();

        // Nothing depends on this target; the write must simply land.
        state.insert("a", 1.into());
        assert_eq!(state.get("a"), Value::from(1));
    }

    #[test]
    fn effect_does_not_retrigger_itself() {
        let rt = Runtime::new();
        let state = rt.reactive(Value::object()).as_object().unwrap();
        state.insert("n", 0.into());

        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let inner = state.clone();
        let _effect = rt.create_effect(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            let n = inner.get("n").as_int().unwrap_or(0);
            // Writing a key the effect itself reads must not recurse.
            inner.insert("n", (n + 1).into());
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_effect_does_not_starve_siblings() {
        let rt = Runtime::new();
        let state = rt.reactive(Value::object()).as_object().unwrap();
        state.insert("a", 0.into());

        let seen = Arc::new(AtomicI32::new(-1));
        let state_a = state.clone();
        let _bomb = rt.create_effect(move || {
            let v = state_a.get("a").as_int().unwrap_or(0);
            if v > 0 {
                panic!("boom");
            }
        });
        let seen_clone = seen.clone();
        let state_b = state.clone();
        let _witness = rt.create_effect(move || {
            seen_clone.store(state_b.get("a").as_int().unwrap_or(0) as i32, Ordering::SeqCst);
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            state.insert("a", 5.into());
        }));

        // The panic propagates to the writer, but the sibling still ran.
        assert!(result.is_err());
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }
}
