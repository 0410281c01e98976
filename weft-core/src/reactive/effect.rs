//! Effect Implementation
//!
//! An Effect is a re-runnable computation that auto-subscribes to every
//! property it reads during its last execution.
//!
//! # How Effects Work
//!
//! 1. When created (unless lazy), the effect runs its function immediately
//!    to establish initial dependencies.
//!
//! 2. When any dependency changes, the effect re-runs, or, if it carries a
//!    scheduler, the scheduler is invoked with the effect handle instead, so
//!    an external renderer can defer or batch re-execution.
//!
//! 3. Before re-running, the effect unsubscribes from every dep it joined
//!    in its previous run. A branch that is no longer read therefore stops
//!    being a dependency.
//!
//! # Lifecycle
//!
//! `Created(active) → Stopped(terminal)`. `stop()` removes the effect from
//! every dep it belongs to, is idempotent, and fires the `on_stop` hook
//! once. A stopped effect is never re-subscribed and is skipped by
//! triggers, which makes a pending scheduled run a no-op.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::context::ObserverFrame;
use super::graph::{DepKey, TrackOp, TriggerOp};
use super::runtime::RuntimeInner;
use crate::proxy::value::NodeId;

/// Counter for generating unique effect IDs.
static EFFECT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_effect_id() -> u64 {
    EFFECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Re-execution hook: called with the effect handle instead of running it.
pub type Scheduler = Arc<dyn Fn(&Effect) + Send + Sync>;

/// Devtool hook fired when an effect gains a new subscription.
pub type TrackHook = Arc<dyn Fn(&TrackEvent) + Send + Sync>;

/// Devtool hook fired when a dependency of the effect triggers.
pub type TriggerHook = Arc<dyn Fn(&TriggerEvent) + Send + Sync>;

/// Devtool hook fired once when the effect is stopped.
pub type StopHook = Arc<dyn Fn() + Send + Sync>;

/// Payload for [`TrackHook`].
#[derive(Debug, Clone)]
pub struct TrackEvent {
    pub effect: u64,
    pub target: NodeId,
    pub op: TrackOp,
    pub key: DepKey,
}

/// Payload for [`TriggerHook`].
#[derive(Debug, Clone)]
pub struct TriggerEvent {
    pub effect: u64,
    pub target: NodeId,
    pub op: TriggerOp,
    pub key: Option<DepKey>,
}

/// Options for [`crate::Runtime::create_effect_with`].
#[derive(Default, Clone)]
pub struct EffectOptions {
    pub(crate) lazy: bool,
    pub(crate) scheduler: Option<Scheduler>,
    pub(crate) on_track: Option<TrackHook>,
    pub(crate) on_trigger: Option<TriggerHook>,
    pub(crate) on_stop: Option<StopHook>,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Do not run the effect on creation.
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Defer re-execution to `scheduler` instead of running inline.
    pub fn scheduler<F>(mut self, scheduler: F) -> Self
    where
        F: Fn(&Effect) + Send + Sync + 'static,
    {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    pub fn on_track<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TrackEvent) + Send + Sync + 'static,
    {
        self.on_track = Some(Arc::new(hook));
        self
    }

    pub fn on_trigger<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TriggerEvent) + Send + Sync + 'static,
    {
        self.on_trigger = Some(Arc::new(hook));
        self
    }

    pub fn on_stop<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_stop = Some(Arc::new(hook));
        self
    }
}

/// Shared state of one effect. Deps hold this strongly; the effect itself
/// remembers only (target, key) pairs, never dep references, so there are
/// no cycles to break.
pub(crate) struct EffectInner {
    id: u64,
    func: Box<dyn Fn() + Send + Sync>,
    active: AtomicBool,
    computed: bool,
    runtime: Weak<RuntimeInner>,
    /// The (target, key) pairs this effect currently belongs to. Cleared
    /// and rebuilt on every run.
    subscriptions: Mutex<SmallVec<[(NodeId, DepKey); 4]>>,
    scheduler: Option<Scheduler>,
    on_track: Option<TrackHook>,
    on_trigger: Option<TriggerHook>,
    on_stop: Option<StopHook>,
    run_count: AtomicUsize,
}

impl EffectInner {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn is_computed(&self) -> bool {
        self.computed
    }

    pub(crate) fn scheduler(&self) -> Option<&Scheduler> {
        self.scheduler.as_ref()
    }

    pub(crate) fn on_track(&self) -> Option<&TrackHook> {
        self.on_track.as_ref()
    }

    pub(crate) fn on_trigger(&self) -> Option<&TriggerHook> {
        self.on_trigger.as_ref()
    }

    pub(crate) fn record_subscription(&self, target: NodeId, key: DepKey) {
        self.subscriptions.lock().push((target, key));
    }

    /// Leave every dep joined during the previous run.
    fn clear_subscriptions(&self, runtime: &RuntimeInner) {
        let taken = std::mem::take(&mut *self.subscriptions.lock());
        for (target, key) in taken {
            runtime.unsubscribe(target, &key, self.id);
        }
    }

    /// Execute the effect function inside an observer frame.
    pub(crate) fn run(self: &Arc<Self>) {
        if !self.is_active() {
            return;
        }
        let Some(runtime) = self.runtime.upgrade() else {
            // The universe is gone; run plain, nothing tracks anymore.
            (self.func)();
            self.run_count.fetch_add(1, Ordering::SeqCst);
            return;
        };
        // Structural recursion guard: an effect already on the stack is
        // mid-run, re-entering it would loop.
        if runtime.observer_contains(self.id) {
            return;
        }

        self.clear_subscriptions(&runtime);

        let frame = ObserverFrame::enter(runtime, Arc::clone(self));
        (self.func)();
        drop(frame);

        self.run_count.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            if let Some(runtime) = self.runtime.upgrade() {
                self.clear_subscriptions(&runtime);
            }
            if let Some(hook) = &self.on_stop {
                hook();
            }
        }
    }

    pub(crate) fn run_count(&self) -> usize {
        self.run_count.load(Ordering::SeqCst)
    }
}

/// Handle to a running effect.
///
/// Clones share state. Dropping every handle does not stop the effect:
/// deps keep it alive so it behaves like a subscription; call [`stop`] to
/// end it.
///
/// [`stop`]: Effect::stop
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    pub(crate) fn from_inner(inner: Arc<EffectInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<EffectInner> {
        &self.inner
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Re-run the effect now. No-op if stopped or already running.
    pub fn run(&self) {
        self.inner.run();
    }

    /// Stop the effect, unsubscribing it from every dep. Idempotent.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    /// Number of completed runs.
    pub fn run_count(&self) -> usize {
        self.inner.run_count()
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("active", &self.is_active())
            .field("computed", &self.inner.computed)
            .field("run_count", &self.run_count())
            .finish()
    }
}

impl RuntimeInner {
    pub(crate) fn spawn_effect(
        self: &Arc<Self>,
        func: Box<dyn Fn() + Send + Sync>,
        options: EffectOptions,
        computed: bool,
    ) -> Effect {
        let inner = Arc::new(EffectInner {
            id: next_effect_id(),
            func,
            active: AtomicBool::new(true),
            computed,
            runtime: Arc::downgrade(self),
            subscriptions: Mutex::new(SmallVec::new()),
            scheduler: options.scheduler,
            on_track: options.on_track,
            on_trigger: options.on_trigger,
            on_stop: options.on_stop,
            run_count: AtomicUsize::new(0),
        });

        if !options.lazy {
            inner.run();
        }

        Effect::from_inner(inner)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::proxy::value::Value;
    use crate::reactive::runtime::Runtime;

    #[test]
    fn effect_runs_on_creation() {
        let rt = Runtime::new();
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();

        let effect = rt.create_effect(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(effect.run_count(), 1);
        assert!(effect.is_active());
    }

    #[test]
    fn lazy_effect_waits_for_first_run() {
        let rt = Runtime::new();
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();

        let effect = rt.create_effect_with(
            move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::new().lazy(true),
        );

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        effect.run();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn effect_reruns_on_tracked_write_only() {
        let rt = Runtime::new();
        let state = rt.reactive(Value::object()).as_object().unwrap();
        state.insert("a", 1.into());
        state.insert("b", 1.into());

        let seen = Arc::new(AtomicI32::new(0));
        let seen_clone = seen.clone();
        let inner = state.clone();
        let effect = rt.create_effect(move || {
            seen_clone.store(inner.get("a").as_int().unwrap_or(0) as i32, Ordering::SeqCst);
        });

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(effect.run_count(), 1);

        // Tracked key: exactly one rerun.
        state.insert("a", 2.into());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(effect.run_count(), 2);

        // Untracked key: no rerun.
        state.insert("b", 2.into());
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn branch_no_longer_read_stops_being_a_dependency() {
        let rt = Runtime::new();
        let state = rt.reactive(Value::object()).as_object().unwrap();
        state.insert("cond", true.into());
        state.insert("a", 1.into());
        state.insert("b", 10.into());

        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let inner = state.clone();
        let _effect = rt.create_effect(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            let key = if inner.get("cond").as_bool().unwrap_or(false) {
                "a"
            } else {
                "b"
            };
            let _ = inner.get(key);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Flip the branch; the effect reruns and resubscribes.
        state.insert("cond", false.into());
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // "a" is no longer read: writing it must not rerun the effect.
        state.insert("a", 2.into());
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // "b" is now read: writing it reruns.
        state.insert("b", 20.into());
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn stopped_effect_never_runs_again() {
        let rt = Runtime::new();
        let state = rt.reactive(Value::object()).as_object().unwrap();
        state.insert("a", 0.into());

        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let inner = state.clone();
        let effect = rt.create_effect(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            let _ = inner.get("a");
        });

        effect.stop();
        assert!(!effect.is_active());

        state.insert("a", 1.into());
        state.insert("a", 2.into());
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Explicit run after stop is also a no-op.
        effect.run();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_is_idempotent_and_fires_hook_once() {
        let rt = Runtime::new();
        let stops = Arc::new(AtomicI32::new(0));
        let stops_clone = stops.clone();

        let effect = rt.create_effect_with(
            || {},
            EffectOptions::new().on_stop(move || {
                stops_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        effect.stop();
        effect.stop();
        effect.stop();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn scheduler_defers_reruns_and_stop_cancels_pending() {
        let rt = Runtime::new();
        let state = rt.reactive(Value::object()).as_object().unwrap();
        state.insert("a", 0.into());

        let queue: Arc<Mutex<Vec<Effect>>> = Arc::new(Mutex::new(Vec::new()));
        let queue_clone = queue.clone();

        let seen = Arc::new(AtomicI32::new(-1));
        let seen_clone = seen.clone();
        let inner = state.clone();
        let effect = rt.create_effect_with(
            move || {
                seen_clone.store(inner.get("a").as_int().unwrap_or(0) as i32, Ordering::SeqCst);
            },
            EffectOptions::new().scheduler(move |e| {
                queue_clone.lock().unwrap().push(e.clone());
            }),
        );

        assert_eq!(seen.load(Ordering::SeqCst), 0);

        // The write only enqueues.
        state.insert("a", 1.into());
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(queue.lock().unwrap().len(), 1);

        // Flushing the queue runs the effect.
        for e in queue.lock().unwrap().drain(..) {
            e.run();
        }
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        // Stop before the flush: the pending run is a no-op.
        state.insert("a", 2.into());
        effect.stop();
        for e in queue.lock().unwrap().drain(..) {
            e.run();
        }
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn track_hook_fires_per_new_subscription() {
        let rt = Runtime::new();
        let state = rt.reactive(Value::object()).as_object().unwrap();
        state.insert("a", 1.into());

        let tracked = Arc::new(AtomicI32::new(0));
        let tracked_clone = tracked.clone();
        let inner = state.clone();
        let _effect = rt.create_effect_with(
            move || {
                // Two reads of the same key subscribe once.
                let _ = inner.get("a");
                let _ = inner.get("a");
            },
            EffectOptions::new().on_track(move |_| {
                tracked_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(tracked.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn trigger_hook_fires_before_rerun() {
        let rt = Runtime::new();
        let state = rt.reactive(Value::object()).as_object().unwrap();
        state.insert("a", 1.into());

        let triggered = Arc::new(AtomicI32::new(0));
        let triggered_clone = triggered.clone();
        let inner = state.clone();
        let _effect = rt.create_effect_with(
            move || {
                let _ = inner.get("a");
            },
            EffectOptions::new().on_trigger(move |event| {
                assert_eq!(event.op, TriggerOp::Set);
                triggered_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        state.insert("a", 2.into());
        assert_eq!(triggered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn effect_clone_shares_state() {
        let rt = Runtime::new();
        let effect1 = rt.create_effect(|| {});
        let effect2 = effect1.clone();

        assert_eq!(effect1.id(), effect2.id());
        assert_eq!(effect2.run_count(), 1);

        effect1.stop();
        assert!(!effect2.is_active());
    }
}
