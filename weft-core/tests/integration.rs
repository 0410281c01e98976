//! Integration Tests for the Reactivity Engine
//!
//! These tests verify that proxies, effects, and computed values work
//! together correctly across module boundaries.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use weft_core::{ArrayRef, MapRef, ObjectRef, Runtime, Value};

/// Capture engine warnings in test output. Safe to call from every test;
/// only the first call installs a subscriber.
fn init_logging() {
    let _ = tracing_subscriber::fmt::try_init();
}

/// The canonical scenario: an effect that reads a tracked property reruns
/// synchronously when that property is written.
#[test]
fn effect_reruns_on_tracked_write() {
    init_logging();
    let rt = Runtime::new();
    let state = rt.reactive(ObjectRef::new()).as_object().unwrap();
    state.insert("count", 0.into());

    let observed = Arc::new(AtomicI32::new(-1));
    let observed_clone = observed.clone();
    let state_clone = state.clone();
    let effect = rt.create_effect(move || {
        let count = state_clone.get("count").as_int().unwrap_or(-1);
        observed_clone.store(count as i32, Ordering::SeqCst);
    });

    // Effect runs on creation, captures initial value.
    assert_eq!(observed.load(Ordering::SeqCst), 0);

    // The write reruns the effect before returning.
    state.insert("count", 7.into());
    assert_eq!(observed.load(Ordering::SeqCst), 7);
    assert_eq!(effect.run_count(), 2);

    // An untracked property leaves it alone.
    state.insert("other", 1.into());
    assert_eq!(effect.run_count(), 2);
}

/// A readonly view and a reactive view over the same raw data stay in
/// sync: writes through the reactive side rerun readonly-side effects.
#[test]
fn readonly_view_sees_reactive_writes() {
    init_logging();
    let rt = Runtime::new();
    let raw = ObjectRef::new();
    raw.insert("n", 1.into());

    let writable = rt.reactive(raw.clone()).as_object().unwrap();
    let view = rt.readonly(raw).as_object().unwrap();

    let observed = Arc::new(AtomicI32::new(0));
    let observed_clone = observed.clone();
    let view_clone = view.clone();
    let _effect = rt.create_effect(move || {
        observed_clone.store(
            view_clone.get("n").as_int().unwrap_or(0) as i32,
            Ordering::SeqCst,
        );
    });
    assert_eq!(observed.load(Ordering::SeqCst), 1);

    writable.insert("n", 2.into());
    assert_eq!(observed.load(Ordering::SeqCst), 2);

    // The readonly side itself cannot write.
    view.insert("n", 99.into());
    assert_eq!(observed.load(Ordering::SeqCst), 2);
}

/// Deep access through nested containers subscribes at every level.
#[test]
fn nested_reads_track_each_level() {
    init_logging();
    let rt = Runtime::new();
    let state = rt.reactive(ObjectRef::new()).as_object().unwrap();
    let inner = ObjectRef::new();
    inner.insert("x", 1.into());
    state.insert("inner", inner.into());

    let observed = Arc::new(AtomicI32::new(0));
    let observed_clone = observed.clone();
    let state_clone = state.clone();
    let effect = rt.create_effect(move || {
        let inner = state_clone.get("inner").as_object();
        let x = inner.map(|o| o.get("x")).unwrap_or(Value::Null);
        observed_clone.store(x.as_int().unwrap_or(0) as i32, Ordering::SeqCst);
    });
    assert_eq!(observed.load(Ordering::SeqCst), 1);

    // Mutating the leaf through an independently obtained handle still
    // reruns, because both reads resolve to the same proxy.
    let handle = state.get("inner").as_object().unwrap();
    handle.insert("x", 2.into());
    assert_eq!(observed.load(Ordering::SeqCst), 2);

    // Replacing the whole inner object reruns via the outer key.
    let replacement = ObjectRef::new();
    replacement.insert("x", 5.into());
    state.insert("inner", replacement.into());
    assert_eq!(observed.load(Ordering::SeqCst), 5);
    assert_eq!(effect.run_count(), 3);
}

/// Computed values chain: effect -> computed -> computed -> state.
#[test]
fn computed_chain_propagates_invalidation() {
    init_logging();
    let rt = Runtime::new();
    let state = rt.reactive(ObjectRef::new()).as_object().unwrap();
    state.insert("n", 2.into());

    let base = state.clone();
    let doubled = rt.create_computed(move || base.get("n").as_int().unwrap_or(0) * 2);
    let doubled_clone = doubled.clone();
    let quadrupled = rt.create_computed(move || doubled_clone.get() * 2);

    let observed = Arc::new(AtomicI32::new(0));
    let observed_clone = observed.clone();
    let quad_clone = quadrupled.clone();
    let effect = rt.create_effect(move || {
        observed_clone.store(quad_clone.get() as i32, Ordering::SeqCst);
    });
    assert_eq!(observed.load(Ordering::SeqCst), 8);

    state.insert("n", 3.into());
    assert_eq!(observed.load(Ordering::SeqCst), 12);
    assert_eq!(effect.run_count(), 2);

    // Writing an equal value starts no cascade.
    state.insert("n", 3.into());
    assert_eq!(effect.run_count(), 2);
}

/// Computed laziness: nothing recomputes until someone reads.
#[test]
fn computed_is_lazy_and_cached() {
    init_logging();
    let rt = Runtime::new();
    let state = rt.reactive(ObjectRef::new()).as_object().unwrap();
    state.insert("n", 1.into());

    let compute_count = Arc::new(AtomicI32::new(0));
    let compute_clone = compute_count.clone();
    let base = state.clone();
    let computed = rt.create_computed(move || {
        compute_clone.fetch_add(1, Ordering::SeqCst);
        base.get("n").as_int().unwrap_or(0)
    });

    // Not computed yet.
    assert_eq!(compute_count.load(Ordering::SeqCst), 0);

    assert_eq!(computed.get(), 1);
    assert_eq!(computed.get(), 1);
    assert_eq!(compute_count.load(Ordering::SeqCst), 1);

    // A write only marks dirty; the recompute waits for the next read.
    state.insert("n", 2.into());
    assert_eq!(compute_count.load(Ordering::SeqCst), 1);
    assert!(computed.is_dirty());
    assert_eq!(computed.get(), 2);
    assert_eq!(compute_count.load(Ordering::SeqCst), 2);
}

/// Array iteration depends on length; maps separate value deps from
/// membership deps.
#[test]
fn collection_dependency_granularity() {
    init_logging();
    let rt = Runtime::new();

    let list = rt.reactive(ArrayRef::new()).as_array().unwrap();
    list.push(1.into());

    let sum = Arc::new(AtomicI32::new(0));
    let sum_clone = sum.clone();
    let list_clone = list.clone();
    let _sum_effect = rt.create_effect(move || {
        let total: i64 = list_clone
            .to_vec()
            .iter()
            .filter_map(|v| v.as_int())
            .sum();
        sum_clone.store(total as i32, Ordering::SeqCst);
    });
    assert_eq!(sum.load(Ordering::SeqCst), 1);

    list.push(10.into());
    assert_eq!(sum.load(Ordering::SeqCst), 11);
    list.set(0, 5.into());
    assert_eq!(sum.load(Ordering::SeqCst), 15);

    let map = rt.reactive(MapRef::new()).as_map().unwrap();
    map.insert("k".into(), 1.into());

    let size_runs = Arc::new(AtomicI32::new(0));
    let size_clone = size_runs.clone();
    let map_clone = map.clone();
    let _size_effect = rt.create_effect(move || {
        size_clone.fetch_add(1, Ordering::SeqCst);
        let _ = map_clone.len();
    });
    assert_eq!(size_runs.load(Ordering::SeqCst), 1);

    // Value overwrite is not a membership change.
    map.insert("k".into(), 2.into());
    assert_eq!(size_runs.load(Ordering::SeqCst), 1);
    map.insert("j".into(), 1.into());
    assert_eq!(size_runs.load(Ordering::SeqCst), 2);
}

/// Two runtimes over the same raw data are isolated universes.
#[test]
fn runtimes_are_isolated() {
    init_logging();
    let rt_a = Runtime::builder().label("a").build();
    let rt_b = Runtime::builder().label("b").build();

    let raw = ObjectRef::new();
    raw.insert("n", 0.into());

    let a = rt_a.reactive(raw.clone()).as_object().unwrap();
    let b = rt_b.reactive(raw.clone()).as_object().unwrap();
    assert!(!Value::from(a.clone()).ptr_eq(&b.clone().into()));

    let a_runs = Arc::new(AtomicI32::new(0));
    let a_clone = a_runs.clone();
    let a_inner = a.clone();
    let _a_effect = rt_a.create_effect(move || {
        a_clone.fetch_add(1, Ordering::SeqCst);
        let _ = a_inner.get("n");
    });

    // A write through B's universe updates shared storage but never
    // reaches A's graph.
    b.insert("n", 1.into());
    assert_eq!(a_runs.load(Ordering::SeqCst), 1);
    assert_eq!(a.get("n"), Value::from(1));

    // A write through A's own proxy does.
    a.insert("n", 2.into());
    assert_eq!(a_runs.load(Ordering::SeqCst), 2);
}

/// Untracked reads opt out of subscription without affecting the rest of
/// the effect body.
#[test]
fn untracked_reads_do_not_subscribe() {
    init_logging();
    let rt = Runtime::new();
    let state = rt.reactive(ObjectRef::new()).as_object().unwrap();
    state.insert("tracked", 1.into());
    state.insert("peeked", 1.into());

    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let state_clone = state.clone();
    let rt_clone = rt.clone();
    let _effect = rt.create_effect(move || {
        runs_clone.fetch_add(1, Ordering::SeqCst);
        let _ = state_clone.get("tracked");
        let peek = state_clone.clone();
        rt_clone.untracked(move || {
            let _ = peek.get("peeked");
        });
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    state.insert("peeked", 2.into());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    state.insert("tracked", 2.into());
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Stopping an effect is permanent: later writes never rerun it.
#[test]
fn stopped_effects_stay_stopped() {
    init_logging();
    let rt = Runtime::new();
    let state = rt.reactive(ObjectRef::new()).as_object().unwrap();
    state.insert("n", 0.into());

    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let state_clone = state.clone();
    let effect = rt.create_effect(move || {
        runs_clone.fetch_add(1, Ordering::SeqCst);
        let _ = state_clone.get("n");
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    effect.stop();
    state.insert("n", 1.into());
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // Manual run is also inert after stop.
    effect.run();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}
