//! Weft Core
//!
//! This crate provides a transparent reactivity engine: dependency-tracked
//! views over plain data, effects that re-run when the data they read
//! changes, and lazy cached computed values. It implements:
//!
//! - Reactive and readonly proxy views over objects, arrays, maps, sets,
//!   and their weak variants
//! - A (target, key) dependency graph with fine-grained invalidation
//! - Effects with per-run dependency collection and optional schedulers
//! - Computed values with dirty-flag laziness
//!
//! All state is scoped to an instantiable [`Runtime`]; independent runtimes
//! are fully isolated universes, and every handle is `Send + Sync`.
//!
//! # Example
//!
//! ```rust
//! use weft_core::{ObjectRef, Runtime};
//!
//! let rt = Runtime::new();
//!
//! // Wrap plain data in a reactive view.
//! let state = rt.reactive(ObjectRef::new()).as_object().unwrap();
//! state.insert("count", 0.into());
//!
//! // Effects re-run when what they read changes.
//! let snapshot = state.clone();
//! let effect = rt.create_effect(move || {
//!     let _ = snapshot.get("count");
//! });
//!
//! state.insert("count", 1.into());
//! assert_eq!(effect.run_count(), 2);
//! ```

pub mod error;
pub mod proxy;
pub mod reactive;

pub use error::{Error, Result};
pub use proxy::{
    ArrayRef, EntryKey, MapRef, NodeId, ObjectRef, SetRef, Value, WeakMapRef, WeakSetRef,
};
pub use reactive::{
    Computed, DepKey, Effect, EffectOptions, Runtime, RuntimeBuilder, Scheduler, StopHook,
    TrackEvent, TrackHook, TrackOp, TriggerEvent, TriggerHook, TriggerOp,
};
