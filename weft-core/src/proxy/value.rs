//! Dynamic Value Model
//!
//! This module defines `Value`, the universal currency of the engine, and the
//! shared `Node` allocation behind every container. A container value is a
//! cheap clonable handle over an `Arc<Node>`; cloning a handle never copies
//! the underlying entries.
//!
//! # Raw vs. Proxy
//!
//! A node is either **raw** (it owns storage) or a **proxy** (it owns no
//! storage; it holds its raw target, a weak handle to the runtime that
//! created it, and a readonly flag). All reads and writes through a proxy
//! handle are routed through the owning runtime's track/trigger machinery;
//! the same operations on a raw handle are plain storage accesses.
//!
//! # Identity
//!
//! Every node carries a unique `NodeId`. Container equality and hashing go
//! by node identity, scalars compare by value. Floats compare by canonical
//! bit pattern, so NaN equals NaN and `0.0` differs from `-0.0`. That is
//! the change-detection rule used by `insert`-style operations to decide
//! whether a write actually changed anything.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, MutexGuard};

use crate::reactive::runtime::RuntimeInner;

/// Unique identifier for a node allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// A dynamically typed value: scalars plus six container kinds.
///
/// Container variants hold handles; cloning a `Value` is always cheap.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Object(ObjectRef),
    Array(ArrayRef),
    Map(MapRef),
    Set(SetRef),
    WeakMap(WeakMapRef),
    WeakSet(WeakSetRef),
}

/// One shared allocation behind a container handle.
pub(crate) struct Node {
    pub(crate) id: NodeId,
    /// Host-internal nodes are never wrapped by the proxy factory.
    pub(crate) internal: bool,
    pub(crate) state: NodeState,
}

pub(crate) enum NodeState {
    /// Owns storage. This is what callers build directly.
    Raw(Mutex<Storage>),
    /// Owns no storage; a tracked view over `target`.
    Proxy {
        target: Arc<Node>,
        runtime: Weak<RuntimeInner>,
        readonly: bool,
    },
    /// No storage at all: a dependency target for derived values.
    Anchor,
}

/// Container storage, one layout per kind.
///
/// Objects and maps are insertion-ordered. Stored values are always raw
/// (proxies are unwrapped before insertion), so storage never references a
/// runtime.
pub(crate) enum Storage {
    Object(IndexMap<Arc<str>, Value>),
    Array(Vec<Value>),
    Map(IndexMap<EntryKey, MapSlot>),
    Set(IndexMap<EntryKey, Value>),
    WeakMap(Vec<(Weak<Node>, Value)>),
    WeakSet(Vec<Weak<Node>>),
}

/// A map entry: the original key value plus the stored value.
///
/// The key is kept alongside the `EntryKey` index so iteration can hand the
/// caller back the key they inserted, not a lossy reconstruction.
pub(crate) struct MapSlot {
    pub(crate) key: Value,
    pub(crate) value: Value,
}

impl Storage {
    pub(crate) fn as_object(&mut self) -> &mut IndexMap<Arc<str>, Value> {
        match self {
            Storage::Object(m) => m,
            _ => unreachable!("object handle over non-object storage"),
        }
    }

    pub(crate) fn as_array(&mut self) -> &mut Vec<Value> {
        match self {
            Storage::Array(v) => v,
            _ => unreachable!("array handle over non-array storage"),
        }
    }

    pub(crate) fn as_map(&mut self) -> &mut IndexMap<EntryKey, MapSlot> {
        match self {
            Storage::Map(m) => m,
            _ => unreachable!("map handle over non-map storage"),
        }
    }

    pub(crate) fn as_set(&mut self) -> &mut IndexMap<EntryKey, Value> {
        match self {
            Storage::Set(s) => s,
            _ => unreachable!("set handle over non-set storage"),
        }
    }

    pub(crate) fn as_weak_map(&mut self) -> &mut Vec<(Weak<Node>, Value)> {
        match self {
            Storage::WeakMap(m) => m,
            _ => unreachable!("weak-map handle over non-weak-map storage"),
        }
    }

    pub(crate) fn as_weak_set(&mut self) -> &mut Vec<Weak<Node>> {
        match self {
            Storage::WeakSet(s) => s,
            _ => unreachable!("weak-set handle over non-weak-set storage"),
        }
    }
}

impl Node {
    pub(crate) fn raw(internal: bool, storage: Storage) -> Arc<Self> {
        Arc::new(Node {
            id: NodeId::new(),
            internal,
            state: NodeState::Raw(Mutex::new(storage)),
        })
    }

    pub(crate) fn anchor() -> Arc<Self> {
        Arc::new(Node {
            id: NodeId::new(),
            internal: false,
            state: NodeState::Anchor,
        })
    }

    /// The node that owns storage: `self` for a raw node, the target for a
    /// proxy.
    pub(crate) fn raw_target(self: &Arc<Self>) -> Arc<Node> {
        match &self.state {
            NodeState::Proxy { target, .. } => Arc::clone(target),
            _ => Arc::clone(self),
        }
    }

    /// Lock the storage this node views. Proxies delegate to their target.
    pub(crate) fn storage(&self) -> MutexGuard<'_, Storage> {
        match &self.state {
            NodeState::Raw(storage) => storage.lock(),
            NodeState::Proxy { target, .. } => target.storage(),
            NodeState::Anchor => unreachable!("anchor nodes carry no storage"),
        }
    }
}

/// How a container operation should execute, resolved from the node state.
///
/// A proxy whose runtime has been dropped degrades to a plain raw access:
/// the universe is gone, so there is nothing left to notify. The readonly
/// flag survives the downgrade; a readonly view never becomes writable.
pub(crate) enum Access {
    Plain {
        target: Arc<Node>,
        readonly: bool,
    },
    Tracked {
        runtime: Arc<RuntimeInner>,
        target: Arc<Node>,
        readonly: bool,
    },
}

pub(crate) fn access(node: &Arc<Node>) -> Access {
    match &node.state {
        NodeState::Proxy {
            target,
            runtime,
            readonly,
        } => match runtime.upgrade() {
            Some(rt) => Access::Tracked {
                runtime: rt,
                target: Arc::clone(target),
                readonly: *readonly,
            },
            None => Access::Plain {
                target: Arc::clone(target),
                readonly: *readonly,
            },
        },
        _ => Access::Plain {
            target: Arc::clone(node),
            readonly: false,
        },
    }
}

/// Hashable form of a `Value`, used to index map entries and set members.
///
/// Scalars go by value (floats by canonical bits), containers by the
/// identity of their raw target, so a proxy and its raw target index the
/// same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(Arc<str>),
    Node(NodeId),
}

/// Canonical bit pattern for float comparison and hashing: every NaN maps
/// to the same bits, `0.0` and `-0.0` stay distinct.
pub(crate) fn float_bits(f: f64) -> u64 {
    if f.is_nan() {
        f64::NAN.to_bits()
    } else {
        f.to_bits()
    }
}

pub(crate) fn entry_key(value: &Value) -> EntryKey {
    match value.to_raw() {
        Value::Null => EntryKey::Null,
        Value::Bool(b) => EntryKey::Bool(b),
        Value::Int(i) => EntryKey::Int(i),
        Value::Float(f) => EntryKey::Float(float_bits(f)),
        Value::Str(s) => EntryKey::Str(s),
        other => EntryKey::Node(other.node().expect("container value has a node").id),
    }
}

macro_rules! container_ref {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone)]
        pub struct $name {
            pub(crate) node: Arc<Node>,
        }

        impl $name {
            pub(crate) fn from_node(node: Arc<Node>) -> Self {
                Self { node }
            }

            /// Identity of the underlying node.
            pub fn id(&self) -> NodeId {
                self.node.id
            }

            /// True if two handles view the same node.
            pub fn ptr_eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.node, &other.node)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("id", &self.node.id.raw())
                    .field("proxy", &matches!(self.node.state, NodeState::Proxy { .. }))
                    .finish()
            }
        }
    };
}

container_ref!(
    /// Handle to a keyed record with string properties.
    ObjectRef
);
container_ref!(
    /// Handle to an index-addressed sequence.
    ArrayRef
);
container_ref!(
    /// Handle to a keyed map whose keys are arbitrary values.
    MapRef
);
container_ref!(
    /// Handle to an insertion-ordered set of values.
    SetRef
);
container_ref!(
    /// Handle to a map whose container keys are held weakly.
    WeakMapRef
);
container_ref!(
    /// Handle to a set whose container members are held weakly.
    WeakSetRef
);

impl Value {
    /// New empty raw object.
    pub fn object() -> Self {
        Value::Object(ObjectRef::new())
    }

    /// New empty raw array.
    pub fn array() -> Self {
        Value::Array(ArrayRef::new())
    }

    /// New empty raw map.
    pub fn map() -> Self {
        Value::Map(MapRef::new())
    }

    /// New empty raw set.
    pub fn set() -> Self {
        Value::Set(SetRef::new())
    }

    pub(crate) fn node(&self) -> Option<&Arc<Node>> {
        match self {
            Value::Object(r) => Some(&r.node),
            Value::Array(r) => Some(&r.node),
            Value::Map(r) => Some(&r.node),
            Value::Set(r) => Some(&r.node),
            Value::WeakMap(r) => Some(&r.node),
            Value::WeakSet(r) => Some(&r.node),
            _ => None,
        }
    }

    /// Rebuild the same container variant over a different node.
    pub(crate) fn with_node(&self, node: Arc<Node>) -> Value {
        match self {
            Value::Object(_) => Value::Object(ObjectRef::from_node(node)),
            Value::Array(_) => Value::Array(ArrayRef::from_node(node)),
            Value::Map(_) => Value::Map(MapRef::from_node(node)),
            Value::Set(_) => Value::Set(SetRef::from_node(node)),
            Value::WeakMap(_) => Value::WeakMap(WeakMapRef::from_node(node)),
            Value::WeakSet(_) => Value::WeakSet(WeakSetRef::from_node(node)),
            scalar => scalar.clone(),
        }
    }

    /// True if this value is a container kind.
    pub fn is_container(&self) -> bool {
        self.node().is_some()
    }

    /// True if this value was produced by a reactivity factory (either
    /// variant).
    pub fn is_reactive(&self) -> bool {
        matches!(
            self.node().map(|n| &n.state),
            Some(NodeState::Proxy { .. })
        )
    }

    /// True if this value is a readonly proxy.
    pub fn is_readonly(&self) -> bool {
        matches!(
            self.node().map(|n| &n.state),
            Some(NodeState::Proxy { readonly: true, .. })
        )
    }

    /// Unwrap a proxy to its raw target; raw values come back unchanged.
    pub fn to_raw(&self) -> Value {
        match self.node() {
            Some(node) => match &node.state {
                NodeState::Proxy { target, .. } => self.with_node(Arc::clone(target)),
                _ => self.clone(),
            },
            None => self.clone(),
        }
    }

    /// Node identity, if this is a container.
    pub fn identity(&self) -> Option<NodeId> {
        self.node().map(|n| n.id)
    }

    /// True if both values are the same container node (exact, without
    /// unwrapping: a proxy is not `ptr_eq` to its raw target).
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self.node(), other.node()) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Human-readable kind name, used in warnings and errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::WeakMap(_) => "weak map",
            Value::WeakSet(_) => "weak set",
        }
    }

    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Value::Object(r) => Some(r.clone()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<ArrayRef> {
        match self {
            Value::Array(r) => Some(r.clone()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<MapRef> {
        match self {
            Value::Map(r) => Some(r.clone()),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<SetRef> {
        match self {
            Value::Set(r) => Some(r.clone()),
            _ => None,
        }
    }

    pub fn as_weak_map(&self) -> Option<WeakMapRef> {
        match self {
            Value::WeakMap(r) => Some(r.clone()),
            _ => None,
        }
    }

    pub fn as_weak_set(&self) -> Option<WeakSetRef> {
        match self {
            Value::WeakSet(r) => Some(r.clone()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => float_bits(*a) == float_bits(*b),
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => match (self.node(), other.node()) {
                (Some(a), Some(b)) => a.id == b.id,
                _ => false,
            },
        }
    }
}

impl Eq for Value {}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Object(r) => write!(f, "{r:?}"),
            Value::Array(r) => write!(f, "{r:?}"),
            Value::Map(r) => write!(f, "{r:?}"),
            Value::Set(r) => write!(f, "{r:?}"),
            Value::WeakMap(r) => write!(f, "{r:?}"),
            Value::WeakSet(r) => write!(f, "{r:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s.as_str()))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<ObjectRef> for Value {
    fn from(r: ObjectRef) -> Self {
        Value::Object(r)
    }
}

impl From<ArrayRef> for Value {
    fn from(r: ArrayRef) -> Self {
        Value::Array(r)
    }
}

impl From<MapRef> for Value {
    fn from(r: MapRef) -> Self {
        Value::Map(r)
    }
}

impl From<SetRef> for Value {
    fn from(r: SetRef) -> Self {
        Value::Set(r)
    }
}

impl From<WeakMapRef> for Value {
    fn from(r: WeakMapRef) -> Self {
        Value::WeakMap(r)
    }
}

impl From<WeakSetRef> for Value {
    fn from(r: WeakSetRef) -> Self {
        Value::WeakSet(r)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
