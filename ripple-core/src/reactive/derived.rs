//! Derivation Implementation
//!
//! A Derivation is a computed value that tracks the producers it reads and
//! recomputes when one of them is written.
//!
//! # How Derivations Work
//!
//! 1. On construction, the function runs once inside the derivation's
//!    context, so the derivation has a value straight away.
//!
//! 2. When a producer it read is written, the derivation moves from idle to
//!    "recompute requested" and is appended to the runtime's run queue.
//!    Further requests before the run are absorbed.
//!
//! 3. When the queue is flushed:
//!    - impure derivations call their function again
//!    - pure derivations key the current values of the producers read last
//!      time; a known key serves the cached result, an unknown one calls the
//!      function and caches what it returns.
//!
//! 4. The result is written to an internal signal cell, which queues the
//!    derivation's own consumers. Derivations can therefore read each other
//!    to any depth.
//!
//! # Memory
//!
//! The result cache of a pure derivation is never evicted; it grows for as
//! long as the derivation lives.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::identity::HashKey;

use super::consumer::Recompute;
use super::runtime::RuntimeState;
use super::signal::{ProducerId, Readable, SignalCell, Value};
use super::{ContextKey, Purity};

/// A computed value that recomputes when the producers it read change.
///
/// Handles are cheap to clone and share state. The derivation stops
/// receiving recomputes once the last handle is dropped.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{Purity, Runtime};
///
/// let runtime = Runtime::new();
/// let first = runtime.signal(String::from("Ada"));
///
/// let name = first.clone();
/// let greeting = runtime.derive(Purity::Pure, move || format!("Hello, {}", name.get()));
/// assert_eq!(greeting.get(), "Hello, Ada");
///
/// first.set(String::from("Grace")).unwrap();
/// runtime.flush().unwrap();
/// assert_eq!(greeting.get(), "Hello, Grace");
/// ```
pub struct Derivation<T: Value> {
    inner: Rc<DerivationInner<T>>,
}

struct DerivationInner<T: Value> {
    key: ContextKey,
    purity: Purity,

    /// Holds the latest result; this is what consumers read.
    cell: Rc<SignalCell<T>>,

    compute: Box<dyn Fn() -> T>,

    /// Results keyed by the values of the producers they were computed from.
    cache: RefCell<HashMap<HashKey, T>>,

    executions: Cell<usize>,
    cache_hits: Cell<usize>,

    runtime: Rc<RuntimeState>,
}

/// Removes a freshly registered context if construction does not finish.
struct Reservation<'a> {
    runtime: &'a RuntimeState,
    key: ContextKey,
    armed: bool,
}

impl Reservation<'_> {
    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.runtime.remove_context(self.key);
        }
    }
}

/// Returns the context to idle when a deferred run ends, panicking or not.
struct FinishRun<'a> {
    runtime: &'a RuntimeState,
    key: ContextKey,
}

impl Drop for FinishRun<'_> {
    fn drop(&mut self) {
        self.runtime.finish_run(self.key);
    }
}

impl<T: Value> Derivation<T> {
    pub(crate) fn new<F>(runtime: Rc<RuntimeState>, purity: Purity, compute: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let key = runtime.register_context(purity);
        let reservation = Reservation {
            runtime: &runtime,
            key,
            armed: true,
        };

        let value = {
            let _ctx = runtime.begin_execution(key);
            compute()
        };
        reservation.keep();

        let inner = Rc::new(DerivationInner {
            key,
            purity,
            cell: SignalCell::new(Rc::clone(&runtime), value),
            compute: Box::new(compute),
            cache: RefCell::new(HashMap::new()),
            executions: Cell::new(1),
            cache_hits: Cell::new(0),
            runtime: Rc::clone(&runtime),
        });

        let weak = Rc::downgrade(&inner);
        let handler: Weak<dyn Recompute> = weak;
        runtime.attach(key, handler);

        Self { inner }
    }

    /// The ID of this derivation's output, as seen by its consumers.
    pub fn id(&self) -> ProducerId {
        self.inner.cell.id()
    }

    /// Whether this derivation is memoized.
    pub fn purity(&self) -> Purity {
        self.inner.purity
    }

    /// Get the current value.
    ///
    /// If called while another derivation is running, this registers that
    /// derivation as a consumer of this one.
    pub fn get(&self) -> T {
        self.inner.cell.read()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.cell.read_untracked()
    }

    /// Number of times the function has been called, construction included.
    pub fn execution_count(&self) -> usize {
        self.inner.executions.get()
    }

    /// Number of deferred runs served from the cache.
    pub fn cache_hits(&self) -> usize {
        self.inner.cache_hits.get()
    }

    /// Number of cached results.
    pub fn cache_len(&self) -> usize {
        self.inner.cache.borrow().len()
    }

    /// Producers read by the most recent execution, in first-read order.
    pub fn producer_ids(&self) -> Vec<ProducerId> {
        self.inner.runtime.producer_ids(self.inner.key)
    }

    /// Whether a recompute is queued and has not run yet.
    pub fn is_pending(&self) -> bool {
        self.inner.runtime.is_pending(self.inner.key)
    }

    /// Number of live consumers of this derivation.
    pub fn consumer_count(&self) -> usize {
        self.inner.cell.consumer_count()
    }
}

impl<T: Value> DerivationInner<T> {
    /// Call the function inside this derivation's context and publish the
    /// result.
    fn execute(&self) -> T {
        let _ctx = self.runtime.begin_execution(self.key);
        self.executions.set(self.executions.get() + 1);

        let value = (self.compute)();
        self.cell.replace_and_notify(value.clone());
        value
    }
}

impl<T: Value> Recompute for DerivationInner<T> {
    fn run_scheduled(&self) {
        let _finish = FinishRun {
            runtime: &self.runtime,
            key: self.key,
        };

        if !(self.purity.is_pure() && self.runtime.config().memoize) {
            self.execute();
            return;
        }

        let fingerprint = self.runtime.fingerprint(self.key);
        let cached = self.cache.borrow().get(&fingerprint).cloned();

        match cached {
            Some(value) => {
                trace!(context = ?self.key, %fingerprint, "serving cached result");
                self.cache_hits.set(self.cache_hits.get() + 1);
                self.runtime.record_cache_hit();
                self.cell.replace_and_notify(value);
            }
            None => {
                let value = self.execute();
                self.cache.borrow_mut().insert(fingerprint, value);
            }
        }
    }
}

impl<T: Value> Drop for DerivationInner<T> {
    fn drop(&mut self) {
        self.runtime.remove_context(self.key);
    }
}

impl<T: Value> Readable for Derivation<T> {
    type Value = T;

    fn get(&self) -> T {
        Derivation::get(self)
    }

    fn get_untracked(&self) -> T {
        Derivation::get_untracked(self)
    }
}

impl<T: Value> Clone for Derivation<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Derivation<T>
where
    T: Value + Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derivation")
            .field("id", &self.id())
            .field("purity", &self.purity())
            .field("value", &self.get_untracked())
            .field("pending", &self.is_pending())
            .field("execution_count", &self.execution_count())
            .field("cache_len", &self.cache_len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
