//! Proxy Factory
//!
//! Creates and caches observed wrappers around raw containers. The factory
//! guarantees reference stability: for one raw target and one variant there
//! is at most one proxy, ever, and wrapping is idempotent.
//!
//! # Identity Rules
//!
//! - `reactive(reactive(x))` is `reactive(x)`: a proxy is never wrapped.
//! - `readonly(reactive(x))` unwraps to the raw target and wraps that
//!   readonly, so both variants view the same storage.
//! - `reactive(readonly(x))` returns the readonly proxy unchanged.
//! - A raw registered with `mark_raw` is returned unchanged; one registered
//!   with `mark_readonly` redirects `reactive()` to the readonly variant.
//! - Host-internal nodes are never wrapped.

use std::sync::Arc;

use crate::reactive::runtime::RuntimeInner;

use super::value::{Node, NodeId, NodeState, Value};

impl RuntimeInner {
    /// Wrap `value` in the proxy for the requested variant, creating and
    /// caching it on first use. Scalars and unobservable nodes come back
    /// unchanged. This is the silent internal entry behind
    /// `Runtime::reactive` / `Runtime::readonly` and behind lazy nested
    /// wrapping.
    pub(crate) fn observe(self: &Arc<Self>, value: Value, readonly: bool) -> Value {
        let Some(node) = value.node().map(Arc::clone) else {
            return value;
        };

        if let NodeState::Proxy {
            target,
            readonly: proxy_readonly,
            ..
        } = &node.state
        {
            // readonly() over a reactive proxy re-wraps the shared raw.
            if readonly && !proxy_readonly {
                return self.observe(value.with_node(Arc::clone(target)), true);
            }
            // Never wrap a proxy in a proxy.
            return value;
        }

        if !readonly && self.readonly_marks.contains_key(&node.id) {
            return self.observe(value, true);
        }

        let cache = if readonly {
            &self.readonly_cache
        } else {
            &self.reactive_cache
        };

        if let Some(existing) = cache.get(&node.id).and_then(|weak| weak.upgrade()) {
            return value.with_node(existing);
        }

        if !self.can_observe(&node) {
            return value;
        }

        let proxy = Arc::new(Node {
            id: NodeId::new(),
            internal: false,
            state: NodeState::Proxy {
                target: Arc::clone(&node),
                runtime: Arc::downgrade(self),
                readonly,
            },
        });
        cache.insert(node.id, Arc::downgrade(&proxy));
        value.with_node(proxy)
    }

    pub(crate) fn can_observe(&self, node: &Arc<Node>) -> bool {
        !node.internal && !self.raw_marks.contains_key(&node.id)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
