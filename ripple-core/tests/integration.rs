//! Integration Tests for the Reactive Runtime
//!
//! These tests verify that signals and derivations work together correctly
//! across turns.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ripple_core::reactive::{read_untracked, Derivation, Purity, Runtime, Signal};
use ripple_core::ReactiveError;

fn init_tracing() {
    static ONCE: std::sync::OnceLock<()> = std::sync::OnceLock::new();
    ONCE.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .try_init();
    });
}

/// A pure `a + b` derivation that counts its calls.
fn counted_sum(
    runtime: &Runtime,
    a: &Signal<i32>,
    b: &Signal<i32>,
) -> (Derivation<i32>, Rc<Cell<usize>>) {
    let calls = Rc::new(Cell::new(0));
    let (a, b, counter) = (a.clone(), b.clone(), Rc::clone(&calls));
    let sum = runtime.derive(Purity::Pure, move || {
        counter.set(counter.get() + 1);
        a.get() + b.get()
    });
    (sum, calls)
}

/// The counter / doubled / tripled walkthrough.
#[test]
fn counter_doubled_tripled() {
    init_tracing();
    let runtime = Runtime::new();
    let counter = runtime.signal(0);

    let c = counter.clone();
    let doubled = runtime.derive(Purity::Pure, move || c.get() * 2);

    let (d, c) = (doubled.clone(), counter.clone());
    let tripled = runtime.derive(Purity::Pure, move || d.get() + read_untracked(&c));

    assert_eq!(doubled.get(), 0);
    assert_eq!(tripled.get(), 0);

    counter.set(1).unwrap();
    runtime.flush().unwrap();
    assert_eq!(doubled.get(), 2);
    assert_eq!(tripled.get(), 3);

    let executions = runtime.stats().executions;
    counter.set(1).unwrap();
    assert_eq!(runtime.flush().unwrap(), 0);
    assert_eq!(runtime.stats().executions, executions);
}

/// An impure derivation reflects every write batch exactly once.
#[test]
fn impure_reads_after_write() {
    init_tracing();
    let runtime = Runtime::new();
    let signal = runtime.signal(String::from("a"));

    let source = signal.clone();
    let upper = runtime.derive(Purity::Impure, move || source.get().to_uppercase());

    for (batch, value) in ["b", "c", "d"].into_iter().enumerate() {
        runtime.turn(|| signal.set(value.to_string())).unwrap().unwrap();
        assert_eq!(upper.get(), value.to_uppercase());
        assert_eq!(upper.execution_count(), batch + 2);
    }
}

/// Returning to a previously seen combination of inputs hits the cache.
#[test]
fn pure_memoization() {
    init_tracing();
    let runtime = Runtime::new();
    let a = runtime.signal(1);
    let b = runtime.signal(10);
    let (sum, calls) = counted_sum(&runtime, &a, &b);

    runtime.turn(|| a.set(2).unwrap()).unwrap(); // (2, 10) miss
    runtime.turn(|| b.set(20).unwrap()).unwrap(); // (2, 20) miss
    assert_eq!(calls.get(), 3);
    assert_eq!(sum.get(), 22);

    runtime
        .turn(|| {
            a.set(5).unwrap();
            b.set(10).unwrap();
            a.set(2).unwrap();
        })
        .unwrap(); // (2, 10) hit
    assert_eq!(sum.get(), 12);
    assert_eq!(calls.get(), 3);
    assert_eq!(sum.cache_hits(), 1);
    assert_eq!(runtime.stats().cache_hits, 1);
}

/// Writing a producer the last execution did not read costs nothing.
#[test]
fn unused_producer_filtering() {
    init_tracing();
    let runtime = Runtime::new();
    let use_b = runtime.signal(false);
    let a = runtime.signal(1);
    let b = runtime.signal(2);

    let calls = Rc::new(Cell::new(0));
    let (flag, a2, b2, counter) = (use_b.clone(), a.clone(), b.clone(), Rc::clone(&calls));
    let picked = runtime.derive(Purity::Pure, move || {
        counter.set(counter.get() + 1);
        if flag.get() {
            b2.get()
        } else {
            a2.get()
        }
    });

    // Make `b` a registered producer, then stop reading it.
    runtime.turn(|| use_b.set(true).unwrap()).unwrap();
    runtime.turn(|| use_b.set(false).unwrap()).unwrap();
    assert_eq!(picked.producer_ids(), vec![use_b.id(), a.id()]);
    assert_eq!(b.consumer_count(), 1);

    let before = calls.get();
    runtime.turn(|| b.set(99).unwrap()).unwrap();
    assert_eq!(calls.get(), before);
    assert_eq!(picked.get(), 1);
    assert!(runtime.stats().filtered >= 1);
}

/// Writing an equal value never reaches a pure consumer.
#[test]
fn no_op_write_suppression() {
    init_tracing();
    let runtime = Runtime::new();
    let a = runtime.signal(3);
    let b = runtime.signal(4);
    let (_sum, calls) = counted_sum(&runtime, &a, &b);

    runtime
        .turn(|| {
            a.set(3).unwrap();
            b.set(4).unwrap();
        })
        .unwrap();

    assert_eq!(calls.get(), 1);
    assert_eq!(runtime.stats().suppressed, 2);
    assert_eq!(runtime.stats().scheduled, 0);
}

/// A derivation reading a derivation tracks the derivation, not its inputs.
#[test]
fn nested_tracking() {
    init_tracing();
    let runtime = Runtime::new();
    let s = runtime.signal(1);

    let source = s.clone();
    let inner = runtime.derive(Purity::Impure, move || source.get() * 10);

    let nested = inner.clone();
    let outer = runtime.derive(Purity::Impure, move || nested.get() + 1);

    assert_eq!(outer.producer_ids(), vec![inner.id()]);
    assert!(!outer.producer_ids().contains(&s.id()));
    assert_eq!(outer.get(), 11);

    runtime
        .turn(|| {
            s.set(2).unwrap();
            s.set(3).unwrap();
        })
        .unwrap();

    assert_eq!(inner.get(), 30);
    assert_eq!(outer.get(), 31);
    assert_eq!(inner.execution_count(), 2);
    assert_eq!(outer.execution_count(), 2);
}

/// A derivation may also be constructed inside another one.
#[test]
fn derivation_created_inside_a_derivation() {
    init_tracing();
    let runtime = Runtime::new();
    let s = runtime.signal(2);

    let (rt, source) = (runtime.clone(), s.clone());
    let outer = runtime.derive(Purity::Impure, move || {
        let source = source.clone();
        let squared = rt.derive(Purity::Pure, move || source.get() * source.get());
        squared.get() + 1
    });

    assert_eq!(outer.get(), 5);
    assert!(!runtime.is_tracking());
}

/// Writes from inside a derivation fail and leave the target untouched.
#[test]
fn reentrancy_guard() {
    init_tracing();
    let runtime = Runtime::new();
    let trigger = runtime.signal(0);
    let target = runtime.signal(0);
    let errors = Rc::new(RefCell::new(Vec::new()));

    let (t, victim, log) = (trigger.clone(), target.clone(), Rc::clone(&errors));
    let _writer = runtime.derive(Purity::Impure, move || {
        let value = t.get();
        if let Err(err) = victim.set(value) {
            log.borrow_mut().push(err);
        }
        value
    });

    runtime.turn(|| trigger.set(7).unwrap()).unwrap();

    let expected = ReactiveError::IllegalMutationDuringComputation {
        producer: target.id(),
    };
    assert_eq!(*errors.borrow(), vec![expected, expected]);
    assert_eq!(target.get(), 0);
}

/// Producers forget consumers that nothing references any more.
#[test]
fn leak_freedom() {
    init_tracing();
    let runtime = Runtime::new();
    let s = runtime.signal(0);

    let derivations: Vec<_> = (0..5)
        .map(|i| {
            let source = s.clone();
            runtime.derive(Purity::from(i % 2 == 0), move || source.get() + i)
        })
        .collect();
    assert_eq!(s.consumer_count(), 5);

    drop(derivations);
    assert_eq!(s.consumer_count(), 0);

    // Writing afterwards queues nothing.
    s.set(1).unwrap();
    assert_eq!(runtime.pending(), 0);
}

/// N writes within one turn produce one execution per affected derivation.
#[test]
fn coalescing() {
    init_tracing();
    let runtime = Runtime::new();
    let s = runtime.signal(0);

    let (p, q) = (s.clone(), s.clone());
    let pure = runtime.derive(Purity::Pure, move || p.get() * 2);
    let impure = runtime.derive(Purity::Impure, move || q.get() * 3);

    runtime
        .turn(|| {
            for value in 1..=100 {
                s.set(value).unwrap();
            }
        })
        .unwrap();

    assert_eq!(pure.execution_count(), 2);
    assert_eq!(impure.execution_count(), 2);
    assert_eq!(pure.get(), 200);
    assert_eq!(impure.get(), 300);
    assert_eq!(runtime.stats().coalesced, 198);
}

/// Shared values compare by contents but key the cache by identity.
#[test]
fn shared_values_key_by_identity() {
    init_tracing();
    let runtime = Runtime::new();
    let first = Rc::new(vec![1, 2, 3]);
    let list = runtime.signal(Rc::clone(&first));

    let calls = Rc::new(Cell::new(0));
    let (source, counter) = (list.clone(), Rc::clone(&calls));
    let total = runtime.derive(Purity::Pure, move || {
        counter.set(counter.get() + 1);
        source.get().iter().sum::<i32>()
    });

    // Equal contents: an unchanged write.
    runtime.turn(|| list.set(Rc::new(vec![1, 2, 3])).unwrap()).unwrap();
    assert_eq!(calls.get(), 1);

    runtime.turn(|| list.set(Rc::new(vec![4])).unwrap()).unwrap();
    runtime.turn(|| list.set(Rc::clone(&first)).unwrap()).unwrap();
    assert_eq!(calls.get(), 3);
    assert_eq!(total.get(), 6);

    // Another `[4]` object is a different key.
    runtime.turn(|| list.set(Rc::new(vec![4])).unwrap()).unwrap();
    assert_eq!(calls.get(), 4);

    runtime.turn(|| list.set(Rc::clone(&first)).unwrap()).unwrap();
    assert_eq!(calls.get(), 4);
    assert_eq!(total.get(), 6);
    assert_eq!(total.cache_hits(), 1);
}

/// Nested options never serve each other's cached results.
#[test]
fn nested_options_keep_separate_cache_entries() {
    init_tracing();
    let runtime = Runtime::new();
    let slot: Signal<Option<Option<i32>>> = runtime.signal(Some(Some(1)));

    let source = slot.clone();
    let depth = runtime.derive(Purity::Pure, move || match source.get() {
        None => 0,
        Some(None) => 1,
        Some(Some(x)) => x,
    });

    runtime.turn(|| slot.set(Some(None)).unwrap()).unwrap();
    runtime.turn(|| slot.set(Some(Some(7))).unwrap()).unwrap();
    assert_eq!(depth.get(), 7);

    runtime.turn(|| slot.set(None).unwrap()).unwrap();
    assert_eq!(depth.get(), 0);
    assert_eq!(depth.cache_hits(), 0);

    runtime.turn(|| slot.set(Some(None)).unwrap()).unwrap();
    assert_eq!(depth.get(), 1);
    assert_eq!(depth.cache_hits(), 1);
}

/// Tuple and vector values key element by element.
#[test]
fn structured_values_memoize() {
    init_tracing();
    let runtime = Runtime::new();
    let point = runtime.signal((1, 2));
    let path = runtime.signal(vec![1, 2, 3]);

    let (p, q) = (point.clone(), path.clone());
    let score = runtime.derive(Purity::Pure, move || {
        let (x, y) = p.get();
        x * 100 + y * 10 + q.get().len() as i32
    });
    assert_eq!(score.get(), 123);

    runtime.turn(|| point.set((2, 1)).unwrap()).unwrap();
    assert_eq!(score.get(), 213);
    runtime.turn(|| path.set(vec![9]).unwrap()).unwrap();
    assert_eq!(score.get(), 211);
    runtime.turn(|| path.set(vec![1, 2, 3]).unwrap()).unwrap();
    assert_eq!(score.get(), 213);
    assert_eq!(score.cache_hits(), 1);
    assert_eq!(score.execution_count(), 3);
}
