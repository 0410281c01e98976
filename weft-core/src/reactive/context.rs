//! Observer Context
//!
//! Tracks which effect is currently running so instrumented reads know who
//! to subscribe. This is a stack, not a slot: effects read computed values,
//! whose runners are effects themselves, so runs nest.
//!
//! Every run pushes a frame and pops it through an RAII guard, which
//! guarantees release on all exit paths including panics. A leaked frame
//! would attribute unrelated later reads to a finished effect.
//!
//! The stack is owned by the runtime instance, not a thread-local: each
//! runtime is its own universe, and two runtimes never see each other's
//! observers.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::effect::EffectInner;
use super::runtime::RuntimeInner;

/// Guard for one observer-stack frame. Pops on drop.
pub(crate) struct ObserverFrame {
    runtime: Arc<RuntimeInner>,
    effect_id: u64,
}

impl ObserverFrame {
    /// Push `effect` onto the runtime's observer stack.
    pub(crate) fn enter(runtime: Arc<RuntimeInner>, effect: Arc<EffectInner>) -> Self {
        let effect_id = effect.id();
        runtime.observers.lock().push(effect);
        Self { runtime, effect_id }
    }
}

impl Drop for ObserverFrame {
    fn drop(&mut self) {
        let popped = self.runtime.observers.lock().pop();
        if let Some(effect) = popped {
            debug_assert_eq!(
                effect.id(),
                self.effect_id,
                "observer frame mismatch: expected {}, got {}",
                self.effect_id,
                effect.id()
            );
        }
    }
}

/// Guard for one level of tracking pause. Resumes on drop.
pub(crate) struct PauseGuard {
    runtime: Arc<RuntimeInner>,
}

impl PauseGuard {
    pub(crate) fn enter(runtime: Arc<RuntimeInner>) -> Self {
        runtime.pause_depth.fetch_add(1, Ordering::SeqCst);
        Self { runtime }
    }
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        self.runtime.pause_depth.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RuntimeInner {
    /// The effect on top of the observer stack, if any.
    pub(crate) fn current_observer(&self) -> Option<Arc<EffectInner>> {
        self.observers.lock().last().map(Arc::clone)
    }

    /// True if `effect_id` is anywhere on the stack. Used as the structural
    /// recursion guard in effect runs.
    pub(crate) fn observer_contains(&self, effect_id: u64) -> bool {
        self.observers.lock().iter().any(|e| e.id() == effect_id)
    }

    pub(crate) fn tracking_paused(&self) -> bool {
        self.pause_depth.load(Ordering::SeqCst) > 0
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
