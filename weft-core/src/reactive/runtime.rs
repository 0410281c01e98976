//! Reactivity Runtime
//!
//! The runtime is one self-contained reactivity universe: it owns the proxy
//! identity caches, the dependency graph, the observer stack, and the
//! escape-hatch registries. Nothing in the engine is process-wide state, so
//! independent runtimes (one per test, one per document, ...) never observe
//! each other.
//!
//! # How It Works
//!
//! 1. `reactive()` / `readonly()` wrap a raw container in a proxy whose
//!    reads call `track` and whose writes call `trigger` on this runtime.
//!
//! 2. `create_effect()` / `create_computed()` build the computations that
//!    those track calls subscribe.
//!
//! 3. When a tracked property is written, the runtime re-runs exactly the
//!    effects that read it last time.
//!
//! # Resource Model
//!
//! Every cache holds weak node handles: once a raw target becomes
//! unreachable its proxies, graph entries, and marks are dead weight that
//! `compact()` sweeps. Proxies hold the runtime weakly in turn, so dropping
//! the last `Runtime` handle degrades proxy reads to plain raw reads and
//! lets the whole universe be reclaimed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::Mutex;

use super::context::PauseGuard;
use super::effect::{Effect, EffectInner, EffectOptions};
use super::graph::TargetDeps;
use crate::proxy::value::{Node, NodeId, Value};

/// Internal state of one runtime, shared by its handles and (weakly) by
/// every proxy it creates.
pub(crate) struct RuntimeInner {
    pub(crate) label: Option<String>,
    pub(crate) warnings: bool,

    /// raw id → reactive proxy node.
    pub(crate) reactive_cache: DashMap<NodeId, Weak<Node>>,
    /// raw id → readonly proxy node. Independent identity from the
    /// reactive variant.
    pub(crate) readonly_cache: DashMap<NodeId, Weak<Node>>,

    /// Raws registered as never-observe.
    pub(crate) raw_marks: DashMap<NodeId, Weak<Node>>,
    /// Raws whose `reactive()` calls redirect to the readonly variant.
    pub(crate) readonly_marks: DashMap<NodeId, Weak<Node>>,

    /// (target, key) → subscribed effects.
    pub(crate) graph: Mutex<IndexMap<NodeId, TargetDeps>>,
    /// Stack of currently running effects, innermost last.
    pub(crate) observers: Mutex<Vec<Arc<EffectInner>>>,
    /// Tracking is paused while this is non-zero.
    pub(crate) pause_depth: AtomicUsize,
}

impl RuntimeInner {
    /// Soft-failure reporting; suppressed when the runtime was built with
    /// `warnings(false)`.
    pub(crate) fn warn(&self, message: &str) {
        if !self.warnings {
            return;
        }
        match &self.label {
            Some(label) => tracing::warn!(runtime = %label, "{message}"),
            None => tracing::warn!("{message}"),
        }
    }
}

/// Builder for [`Runtime`].
#[derive(Default)]
pub struct RuntimeBuilder {
    label: Option<String>,
    warnings: Option<bool>,
}

impl RuntimeBuilder {
    /// Attach a label, included in every warning this runtime emits.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Enable or disable soft-failure warnings (default: enabled).
    pub fn warnings(mut self, warnings: bool) -> Self {
        self.warnings = Some(warnings);
        self
    }

    pub fn build(self) -> Runtime {
        Runtime {
            inner: Arc::new(RuntimeInner {
                label: self.label,
                warnings: self.warnings.unwrap_or(true),
                reactive_cache: DashMap::new(),
                readonly_cache: DashMap::new(),
                raw_marks: DashMap::new(),
                readonly_marks: DashMap::new(),
                graph: Mutex::new(IndexMap::new()),
                observers: Mutex::new(Vec::new()),
                pause_depth: AtomicUsize::new(0),
            }),
        }
    }
}

/// One reactivity universe. Clones share state.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with default settings.
    pub fn new() -> Self {
        RuntimeBuilder::default().build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// Wrap `value` in a deep, lazy, mutable observed proxy.
    ///
    /// Idempotent per raw target: repeated calls return the identical
    /// proxy, and wrapping a proxy returns it unchanged. Scalars come back
    /// unchanged with a warning; the call is safe unconditionally.
    pub fn reactive(&self, value: impl Into<Value>) -> Value {
        let value = value.into();
        if !value.is_container() {
            self.inner
                .warn(&format!("reactive() called on a {} value", value.kind_name()));
            return value;
        }
        self.inner.observe(value, false)
    }

    /// Wrap `value` in a deep, lazy, write-blocking observed proxy.
    ///
    /// Shares the raw target with the reactive variant: writes made through
    /// `reactive()` remain visible here.
    pub fn readonly(&self, value: impl Into<Value>) -> Value {
        let value = value.into();
        if !value.is_container() {
            self.inner
                .warn(&format!("readonly() called on a {} value", value.kind_name()));
            return value;
        }
        self.inner.observe(value, true)
    }

    /// Create an effect and run it immediately.
    pub fn create_effect<F>(&self, func: F) -> Effect
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner
            .spawn_effect(Box::new(func), EffectOptions::default(), false)
    }

    /// Create an effect with explicit options.
    pub fn create_effect_with<F>(&self, func: F, options: EffectOptions) -> Effect
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.spawn_effect(Box::new(func), options, false)
    }

    /// Register `value`'s raw target as never-observe.
    ///
    /// Only effective before the first `reactive()`/`readonly()` call on
    /// that raw; once a proxy exists the mark is ignored with a warning.
    pub fn mark_raw(&self, value: &Value) {
        let Some(node) = value.node() else {
            self.inner
                .warn(&format!("mark_raw() called on a {} value", value.kind_name()));
            return;
        };
        let raw = node.raw_target();
        if self.has_live_proxy(raw.id) {
            self.inner
                .warn("mark_raw() ignored: a proxy for this target already exists");
            return;
        }
        self.inner.raw_marks.insert(raw.id, Arc::downgrade(&raw));
    }

    /// Register `value`'s raw target so `reactive()` produces the readonly
    /// variant. Same ordering rule as [`mark_raw`].
    ///
    /// [`mark_raw`]: Runtime::mark_raw
    pub fn mark_readonly(&self, value: &Value) {
        let Some(node) = value.node() else {
            self.inner.warn(&format!(
                "mark_readonly() called on a {} value",
                value.kind_name()
            ));
            return;
        };
        let raw = node.raw_target();
        if self.has_live_proxy(raw.id) {
            self.inner
                .warn("mark_readonly() ignored: a proxy for this target already exists");
            return;
        }
        self.inner
            .readonly_marks
            .insert(raw.id, Arc::downgrade(&raw));
    }

    fn has_live_proxy(&self, raw: NodeId) -> bool {
        let live = |cache: &DashMap<NodeId, Weak<Node>>| {
            cache
                .get(&raw)
                .map(|w| w.strong_count() > 0)
                .unwrap_or(false)
        };
        live(&self.inner.reactive_cache) || live(&self.inner.readonly_cache)
    }

    /// Pause dependency tracking on this runtime. Nests; every call needs a
    /// matching [`resume_tracking`].
    ///
    /// [`resume_tracking`]: Runtime::resume_tracking
    pub fn pause_tracking(&self) {
        self.inner.pause_depth.fetch_add(1, Ordering::SeqCst);
    }

    /// Undo one level of [`pause_tracking`].
    ///
    /// [`pause_tracking`]: Runtime::pause_tracking
    pub fn resume_tracking(&self) {
        let _ = self
            .inner
            .pause_depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| d.checked_sub(1));
    }

    /// Run `f` with tracking paused, restoring the previous state on every
    /// exit path.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = PauseGuard::enter(Arc::clone(&self.inner));
        f()
    }

    /// True if an effect is currently running and tracking is not paused.
    pub fn is_tracking(&self) -> bool {
        !self.inner.tracking_paused() && !self.inner.observers.lock().is_empty()
    }

    /// Sweep caches, marks, and graph entries whose targets are gone.
    pub fn compact(&self) {
        let sweep = |cache: &DashMap<NodeId, Weak<Node>>| {
            cache.retain(|_, weak| weak.strong_count() > 0);
        };
        sweep(&self.inner.reactive_cache);
        sweep(&self.inner.readonly_cache);
        sweep(&self.inner.raw_marks);
        sweep(&self.inner.readonly_marks);
        self.inner.sweep_graph();
    }

    /// Number of live (target, key) deps. Diagnostic.
    pub fn dep_count(&self) -> usize {
        self.inner
            .graph
            .lock()
            .values()
            .map(|entry| entry.deps.len())
            .sum()
    }

    /// The label given at construction, if any.
    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("label", &self.inner.label)
            .field("proxies", &self.inner.reactive_cache.len())
            .field("readonly_proxies", &self.inner.readonly_cache.len())
            .field("deps", &self.dep_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
