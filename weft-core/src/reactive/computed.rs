//! Computed Values
//!
//! A Computed is a lazy, cached, dependency-tracked derived value.
//!
//! # How Computeds Work
//!
//! 1. Creation does nothing: the getter runs on first `get()`.
//!
//! 2. The getter runs inside an internal effect (the *runner*), so every
//!    property it reads becomes a dependency of the runner.
//!
//! 3. When one of those dependencies triggers, the runner's scheduler marks
//!    the computed dirty instead of recomputing and, on the clean-to-dirty
//!    transition only, triggers the computed's own value dep so dependents
//!    find out. The next `get()` recomputes.
//!
//! 4. Reading a computed inside another effect subscribes that effect to
//!    the computed's value dep, exactly like a plain property read.
//!
//! The runner is flagged as a computed effect; triggers run computed
//! runners before plain effects so dirty flags are set by the time a plain
//! effect re-reads the chain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::effect::{Effect, EffectOptions};
use super::graph::{DepKey, TrackOp, TriggerOp};
use super::runtime::{Runtime, RuntimeInner};
use crate::proxy::value::Node;

/// A cached derived value. Clones share state.
pub struct Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Storage-free dependency target standing for "the computed's value".
    anchor: Arc<Node>,
    runtime: Weak<RuntimeInner>,
    getter: Arc<dyn Fn() -> T + Send + Sync>,
    setter: Option<Arc<dyn Fn(T) + Send + Sync>>,
    value: Arc<Mutex<Option<T>>>,
    dirty: Arc<AtomicBool>,
    runner: Effect,
}

impl Runtime {
    /// Create a computed value. The getter does not run until first read.
    pub fn create_computed<T, F>(&self, getter: F) -> Computed<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.build_computed(Arc::new(getter), None)
    }

    /// Create a writable computed: `set(v)` forwards to `setter`.
    pub fn create_computed_with<T, F, S>(&self, getter: F, setter: S) -> Computed<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        self.build_computed(Arc::new(getter), Some(Arc::new(setter)))
    }

    fn build_computed<T>(
        &self,
        getter: Arc<dyn Fn() -> T + Send + Sync>,
        setter: Option<Arc<dyn Fn(T) + Send + Sync>>,
    ) -> Computed<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let anchor = Node::anchor();
        let value: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
        let dirty = Arc::new(AtomicBool::new(true));

        // The runner recomputes and caches; it is lazy, so nothing happens
        // until the first read pulls it.
        let runner_getter = Arc::clone(&getter);
        let runner_value = Arc::clone(&value);
        let runner_dirty = Arc::clone(&dirty);
        let body = move || {
            let fresh = (runner_getter)();
            *runner_value.lock() = Some(fresh);
            runner_dirty.store(false, Ordering::SeqCst);
        };

        // Invalidation path: mark dirty, and only on the clean-to-dirty edge
        // propagate to whoever reads this computed.
        let sched_dirty = Arc::clone(&dirty);
        let sched_anchor = Arc::clone(&anchor);
        let sched_runtime = Arc::downgrade(&self.inner);
        let scheduler = move |_: &Effect| {
            if !sched_dirty.swap(true, Ordering::SeqCst) {
                if let Some(rt) = sched_runtime.upgrade() {
                    rt.trigger(sched_anchor.id, TriggerOp::Set, Some(DepKey::Value));
                }
            }
        };

        let runner = self.inner.spawn_effect(
            Box::new(body),
            EffectOptions::new().lazy(true).scheduler(scheduler),
            true,
        );

        Computed {
            anchor,
            runtime: Arc::downgrade(&self.inner),
            getter,
            setter,
            value,
            dirty,
            runner,
        }
    }
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Current value, recomputing if dirty.
    ///
    /// Inside an effect this also subscribes the effect to the computed.
    /// After `stop()`, or once the runtime is gone, the getter is evaluated
    /// untracked on demand.
    pub fn get(&self) -> T {
        let Some(runtime) = self.runtime.upgrade() else {
            return (self.getter)();
        };
        if !self.runner.is_active() {
            let getter = &self.getter;
            let _guard = super::context::PauseGuard::enter(Arc::clone(&runtime));
            return getter();
        }

        runtime.track(&self.anchor, TrackOp::Get, DepKey::Value);

        if self.dirty.load(Ordering::SeqCst) {
            self.runner.run();
        }

        match self.value.lock().clone() {
            Some(value) => value,
            // The runner was skipped (a computed reading itself); fall back
            // to an untracked evaluation rather than looping.
            None => {
                let _guard = super::context::PauseGuard::enter(Arc::clone(&runtime));
                (self.getter)()
            }
        }
    }

    /// Forward to the setter; warn-only no-op without one.
    pub fn set(&self, value: T) {
        match &self.setter {
            Some(setter) => setter(value),
            None => {
                if let Some(rt) = self.runtime.upgrade() {
                    rt.warn("set() called on a computed without a setter");
                }
            }
        }
    }

    /// True if the cache will be refreshed on next read.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Stop tracking. Subsequent reads evaluate the getter untracked.
    pub fn stop(&self) {
        self.runner.stop();
    }

    pub fn is_active(&self) -> bool {
        self.runner.is_active()
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            anchor: Arc::clone(&self.anchor),
            runtime: Weak::clone(&self.runtime),
            getter: Arc::clone(&self.getter),
            setter: self.setter.as_ref().map(Arc::clone),
            value: Arc::clone(&self.value),
            dirty: Arc::clone(&self.dirty),
            runner: self.runner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Computed<T>
where
    T: Clone + Send + Sync + std::fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("value", &*self.value.lock())
            .field("dirty", &self.is_dirty())
            .field("active", &self.is_active())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    use crate::proxy::value::Value;
    use crate::reactive::runtime::Runtime;

    #[test]
    fn computed_is_lazy_and_cached() {
        let rt = Runtime::new();
        let state = rt.reactive(Value::object()).as_object().unwrap();
        state.insert("n", 2.into());

        let evals = Arc::new(AtomicI32::new(0));
        let evals_clone = evals.clone();
        let inner = state.clone();
        let doubled = rt.create_computed(move || {
            evals_clone.fetch_add(1, Ordering::SeqCst);
            inner.get("n").as_int().unwrap_or(0) * 2
        });

        // Not evaluated until first read.
        assert_eq!(evals.load(Ordering::SeqCst), 0);
        assert!(doubled.is_dirty());

        assert_eq!(doubled.get(), 4);
        assert_eq!(evals.load(Ordering::SeqCst), 1);

        // Repeated reads hit the cache.
        assert_eq!(doubled.get(), 4);
        assert_eq!(doubled.get(), 4);
        assert_eq!(evals.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn computed_goes_dirty_when_its_dependency_changes() {
        let rt = Runtime::new();
        let state = rt.reactive(Value::object()).as_object().unwrap();
        state.insert("n", 2.into());

        let inner = state.clone();
        let doubled = rt.create_computed(move || inner.get("n").as_int().unwrap_or(0) * 2);
        assert_eq!(doubled.get(), 4);
        assert!(!doubled.is_dirty());

        // The write marks dirty without recomputing.
        state.insert("n", 5.into());
        assert!(doubled.is_dirty());
        assert_eq!(doubled.get(), 10);
        assert!(!doubled.is_dirty());

        // An unrelated key leaves the computed clean.
        state.insert("other", 1.into());
        assert!(!doubled.is_dirty());
    }

    #[test]
    fn effect_reading_a_computed_reruns_through_it() {
        let rt = Runtime::new();
        let state = rt.reactive(Value::object()).as_object().unwrap();
        state.insert("n", 1.into());

        let inner = state.clone();
        let doubled = rt.create_computed(move || inner.get("n").as_int().unwrap_or(0) * 2);

        let seen = Arc::new(AtomicI32::new(0));
        let seen_clone = seen.clone();
        let doubled_clone = doubled.clone();
        let effect = rt.create_effect(move || {
            seen_clone.store(doubled_clone.get() as i32, Ordering::SeqCst);
        });

        assert_eq!(seen.load(Ordering::SeqCst), 2);

        state.insert("n", 3.into());
        assert_eq!(seen.load(Ordering::SeqCst), 6);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn computed_chains_propagate_dirtiness() {
        let rt = Runtime::new();
        let state = rt.reactive(Value::object()).as_object().unwrap();
        state.insert("n", 1.into());

        let inner = state.clone();
        let doubled = rt.create_computed(move || inner.get("n").as_int().unwrap_or(0) * 2);
        let doubled_clone = doubled.clone();
        let plus_ten = rt.create_computed(move || doubled_clone.get() + 10);

        assert_eq!(plus_ten.get(), 12);

        state.insert("n", 5.into());
        assert!(doubled.is_dirty());
        assert!(plus_ten.is_dirty());
        assert_eq!(plus_ten.get(), 20);
    }

    #[test]
    fn writable_computed_forwards_to_setter() {
        let rt = Runtime::new();
        let state = rt.reactive(Value::object()).as_object().unwrap();
        state.insert("n", 1.into());

        let get_state = state.clone();
        let set_state = state.clone();
        let n = rt.create_computed_with(
            move || get_state.get("n").as_int().unwrap_or(0),
            move |v: i64| set_state.insert("n", v.into()),
        );

        assert_eq!(n.get(), 1);
        n.set(7);
        assert_eq!(n.get(), 7);
        assert_eq!(state.get("n"), Value::from(7));
    }

    #[test]
    fn setterless_computed_ignores_writes() {
        let rt = Runtime::builder().warnings(false).build();
        let n = rt.create_computed(|| 3i64);
        n.set(9);
        assert_eq!(n.get(), 3);
    }

    #[test]
    fn stopped_computed_evaluates_untracked() {
        let rt = Runtime::new();
        let state = rt.reactive(Value::object()).as_object().unwrap();
        state.insert("n", 1.into());

        let inner = state.clone();
        let doubled = rt.create_computed(move || inner.get("n").as_int().unwrap_or(0) * 2);
        assert_eq!(doubled.get(), 2);

        doubled.stop();
        assert!(!doubled.is_active());

        // Still readable, always fresh, never subscribing anything.
        state.insert("n", 4.into());
        assert_eq!(doubled.get(), 8);

        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let doubled_clone = doubled.clone();
        let _effect = rt.create_effect(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            let _ = doubled_clone.get();
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Reads through a stopped computed created no subscriptions.
        state.insert("n", 6.into());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
