//! Proxy Layer
//!
//! Reactive views over plain data. A raw container is an inert value; a
//! proxy over it is a view whose reads are tracked and whose writes
//! trigger. Handles are cheap clones of a shared node, so the same
//! container can be reached through raw, reactive, and readonly views at
//! once, and writes through any writable view are seen by all of them.
//!
//! # How It Works
//!
//! Every container is backed by a [`value::Node`]. Raw nodes own storage;
//! proxy nodes hold a strong reference to the raw target plus a weak
//! reference to their runtime. Accessor methods on the handle types
//! (`ObjectRef`, `ArrayRef`, ...) resolve the node once per call and then
//! either read storage directly (raw) or instrument the operation with
//! track/trigger calls (proxy).
//!
//! Wrapping is lazy and identity-cached: reading a nested container
//! through a proxy returns a proxy over it, and repeated reads return the
//! same one.

mod array;
mod collections;
mod factory;
mod object;
pub(crate) mod value;

pub use value::{
    ArrayRef, EntryKey, MapRef, NodeId, ObjectRef, SetRef, Value, WeakMapRef, WeakSetRef,
};
