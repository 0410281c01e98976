//! Reactive Substrate
//!
//! This module implements the engine underneath the proxy layer: the
//! runtime context, the dependency graph, the observer stack, effects, and
//! computed values.
//!
//! # Concepts
//!
//! ## Track and Trigger
//!
//! Every instrumented read calls `track`, recording that the currently
//! running effect depends on one (target, key) pair. Every instrumented
//! write calls `trigger`, re-running exactly the effects recorded under the
//! written pair. These two primitives are the whole engine; the proxy layer
//! is just the code that decides when to call them.
//!
//! ## Effects
//!
//! An effect is a re-runnable computation that auto-subscribes to whatever
//! it reads. Its subscriptions are rebuilt from scratch on every run, so
//! dependencies follow the control flow actually taken.
//!
//! ## Computed Values
//!
//! A computed is a lazy, cached derived value built from an internal effect
//! plus a dirty flag. Reading one inside another effect chains the
//! subscription through, exactly like a plain property.
//!
//! # Implementation Notes
//!
//! All engine state hangs off an instantiable `Runtime`; there are no
//! process-wide registries and no thread-locals. The "current effect" is an
//! observer stack owned by the runtime, pushed and popped through RAII
//! frames so it unwinds correctly on panics. This transparent-reactivity
//! design follows Vue 3, SolidJS, and MobX.

mod computed;
mod context;
mod effect;
mod graph;
pub(crate) mod runtime;

pub use computed::Computed;
pub use effect::{
    Effect, EffectOptions, Scheduler, StopHook, TrackEvent, TrackHook, TriggerEvent, TriggerHook,
};
pub use graph::{DepKey, TrackOp, TriggerOp};
pub use runtime::{Runtime, RuntimeBuilder};
