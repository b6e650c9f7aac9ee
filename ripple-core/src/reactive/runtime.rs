//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals and
//! derivations. It owns everything that has to be shared between them:
//!
//! - the arena of consumer contexts
//! - the stack of running derivations
//! - the run queue of deferred recomputes
//! - the identity hasher used to key memo caches
//!
//! # How It Works
//!
//! 1. When a derivation reads a producer, the runtime records the edge in
//!    both directions: the producer's registry gets the context key, and the
//!    context's producer set gets the producer.
//!
//! 2. When a signal is written, the runtime filters each consumer's request
//!    (pure consumers ignore unchanged values and producers they did not
//!    read), coalesces it with any request already queued, and otherwise
//!    appends the context to the run queue.
//!
//! 3. [`Runtime::flush`] is the end of the turn: it drains the queue in
//!    submission order. Runs that publish a new value queue their own
//!    consumers, which are drained by the same flush.
//!
//! # Threading
//!
//! A runtime and every handle it creates are single-threaded (`Rc`-based).

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use slotmap::SlotMap;
use tracing::{debug, trace};

use crate::config::RuntimeConfig;
use crate::error::{ReactiveError, Result};
use crate::identity::{HashKey, IdentityHasher, KeyPart};

use super::consumer::{ConsumerContext, Recompute};
use super::context::{ContextGuard, ContextStack};
use super::derived::Derivation;
use super::registry::WeakRegistry;
use super::signal::{Producer, ProducerId, Signal, Value};
use super::{ContextKey, Purity};

/// Counters describing what the runtime has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Recomputes appended to the run queue.
    pub scheduled: u64,
    /// Requests absorbed by a recompute that was already queued.
    pub coalesced: u64,
    /// Requests a pure derivation ignored because it did not read the producer.
    pub filtered: u64,
    /// Requests a pure derivation never received because the value was unchanged.
    pub suppressed: u64,
    /// Calls of a user function, including the one at construction.
    pub executions: u64,
    /// Deferred runs served from a memo cache.
    pub cache_hits: u64,
}

/// State shared by a runtime and every handle created from it.
pub(crate) struct RuntimeState {
    config: RuntimeConfig,
    contexts: RefCell<SlotMap<ContextKey, ConsumerContext>>,
    stack: ContextStack,
    queue: RefCell<VecDeque<ContextKey>>,
    hasher: RefCell<IdentityHasher>,
    stats: Cell<RuntimeStats>,
}

impl RuntimeState {
    fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            contexts: RefCell::new(SlotMap::with_key()),
            stack: ContextStack::default(),
            queue: RefCell::new(VecDeque::new()),
            hasher: RefCell::new(IdentityHasher::new()),
            stats: Cell::new(RuntimeStats::default()),
        }
    }

    pub(crate) fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    fn bump(&self, f: impl FnOnce(&mut RuntimeStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    // ------------------------------------------------------------------
    // Context stack
    // ------------------------------------------------------------------

    pub(crate) fn current_context(&self) -> Option<ContextKey> {
        self.stack.current()
    }

    pub(crate) fn is_tracking(&self) -> bool {
        self.stack.is_active()
    }

    /// Start one execution of a derivation's function: forget the producers
    /// of the previous execution and make the context current.
    pub(crate) fn begin_execution(&self, key: ContextKey) -> ContextGuard<'_> {
        debug!(context = ?key, depth = self.stack.depth(), "recomputing");
        self.bump(|stats| stats.executions += 1);

        if let Some(context) = self.contexts.borrow_mut().get_mut(key) {
            context.clear_producers();
        }

        self.stack.enter(key)
    }

    // ------------------------------------------------------------------
    // Context arena
    // ------------------------------------------------------------------

    pub(crate) fn register_context(&self, purity: Purity) -> ContextKey {
        self.contexts
            .borrow_mut()
            .insert(ConsumerContext::new(purity))
    }

    pub(crate) fn attach(&self, key: ContextKey, handler: Weak<dyn Recompute>) {
        if let Some(context) = self.contexts.borrow_mut().get_mut(key) {
            context.attach(handler);
        }
    }

    pub(crate) fn remove_context(&self, key: ContextKey) {
        self.contexts.borrow_mut().remove(key);
    }

    pub(crate) fn record_read(&self, key: ContextKey, id: ProducerId, producer: Weak<dyn Producer>) {
        if let Some(context) = self.contexts.borrow_mut().get_mut(key) {
            context.record_read(id, producer);
        }
    }

    pub(crate) fn producer_ids(&self, key: ContextKey) -> Vec<ProducerId> {
        self.contexts
            .borrow()
            .get(key)
            .map(ConsumerContext::producer_ids)
            .unwrap_or_default()
    }

    pub(crate) fn is_pending(&self, key: ContextKey) -> bool {
        self.contexts
            .borrow()
            .get(key)
            .is_some_and(ConsumerContext::is_pending)
    }

    /// Return a context to idle once its deferred run has finished.
    pub(crate) fn finish_run(&self, key: ContextKey) {
        if let Some(context) = self.contexts.borrow_mut().get_mut(key) {
            context.set_pending(false);
        }
    }

    /// Register a consumer with a producer's registry.
    pub(crate) fn track(&self, registry: &mut WeakRegistry<ContextKey>, key: ContextKey) {
        registry.add_pruning(key, &*self.contexts.borrow());
    }

    /// Live consumers of a registry, dropping dead keys along the way.
    pub(crate) fn live_consumers(&self, registry: &mut WeakRegistry<ContextKey>) -> Vec<ContextKey> {
        let contexts = self.contexts.borrow();
        registry.prune(&*contexts);
        let live = registry.iter(&*contexts).collect();
        live
    }

    pub(crate) fn count_live(&self, registry: &WeakRegistry<ContextKey>) -> usize {
        registry.len(&*self.contexts.borrow())
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Handle a producer's recompute request for one consumer.
    pub(crate) fn request_recompute(&self, key: ContextKey, producer: ProducerId, unchanged: bool) {
        {
            let mut contexts = self.contexts.borrow_mut();
            let Some(context) = contexts.get_mut(key) else {
                return;
            };

            if context.purity().is_pure() {
                if unchanged {
                    trace!(context = ?key, %producer, "value unchanged, request suppressed");
                    self.bump(|stats| stats.suppressed += 1);
                    return;
                }
                if !context.has_producer(producer) {
                    trace!(context = ?key, %producer, "producer not read last time, request filtered");
                    self.bump(|stats| stats.filtered += 1);
                    return;
                }
            }

            if context.is_pending() {
                trace!(context = ?key, %producer, "recompute already queued");
                self.bump(|stats| stats.coalesced += 1);
                return;
            }

            context.set_pending(true);
        }

        trace!(context = ?key, %producer, "recompute queued");
        self.queue.borrow_mut().push_back(key);
        self.bump(|stats| stats.scheduled += 1);
    }

    /// Key the current values of a context's last-active producers.
    pub(crate) fn fingerprint(&self, key: ContextKey) -> HashKey {
        let producers = self
            .contexts
            .borrow()
            .get(key)
            .map(ConsumerContext::sorted_producers)
            .unwrap_or_default();

        let mut hasher = self.hasher.borrow_mut();
        let fingerprint = producers
            .iter()
            .map(|producer| match producer.upgrade() {
                Some(producer) => producer.identity_key(&mut hasher),
                None => KeyPart::Absent,
            })
            .collect();
        fingerprint
    }

    pub(crate) fn record_cache_hit(&self) {
        self.bump(|stats| stats.cache_hits += 1);
    }
}

/// The reactive runtime.
///
/// Every signal and derivation belongs to the runtime that created it.
/// Cloning a runtime yields another handle to the same state.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{Purity, Runtime};
///
/// let runtime = Runtime::new();
/// let count = runtime.signal(1);
///
/// let source = count.clone();
/// let doubled = runtime.derive(Purity::Pure, move || source.get() * 2);
/// assert_eq!(doubled.get(), 2);
///
/// count.set(5).unwrap();
/// // Still the old value: the recompute is deferred to the end of the turn.
/// assert_eq!(doubled.get(), 2);
///
/// runtime.flush().unwrap();
/// assert_eq!(doubled.get(), 10);
/// ```
#[derive(Clone)]
pub struct Runtime {
    state: Rc<RuntimeState>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with the given configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            state: Rc::new(RuntimeState::new(config)),
        }
    }

    /// The configuration this runtime was created with.
    pub fn config(&self) -> &RuntimeConfig {
        self.state.config()
    }

    /// Create a signal with an initial value.
    pub fn signal<T: Value>(&self, value: T) -> Signal<T> {
        Signal::new(Rc::clone(&self.state), value)
    }

    /// Create a derivation.
    ///
    /// The function runs once before this returns, so the derivation has a
    /// value immediately. `purity` accepts a [`Purity`] or a `bool`
    /// (`true` meaning pure).
    pub fn derive<T, F>(&self, purity: impl Into<Purity>, compute: F) -> Derivation<T>
    where
        T: Value,
        F: Fn() -> T + 'static,
    {
        Derivation::new(Rc::clone(&self.state), purity.into(), compute)
    }

    /// Run every deferred recompute (the end of the current turn).
    ///
    /// Recomputes queued while flushing run in the same call. With a
    /// `flush_budget`, at most that many runs happen and the rest wait for
    /// the next flush. Returns the number of runs performed, cache hits
    /// included.
    ///
    /// A panic in a derivation's function propagates out of this call; the
    /// remaining queue is left for the next flush.
    pub fn flush(&self) -> Result<usize> {
        if self.state.is_tracking() {
            return Err(ReactiveError::FlushDuringComputation);
        }

        let budget = self.state.config.flush_budget;
        let mut runs = 0;

        while budget.map_or(true, |budget| runs < budget.get()) {
            let next = self.state.queue.borrow_mut().pop_front();
            let Some(key) = next else {
                break;
            };

            let handler = self
                .state
                .contexts
                .borrow()
                .get(key)
                .and_then(ConsumerContext::handler);

            match handler.and_then(|handler| handler.upgrade()) {
                Some(handler) => {
                    handler.run_scheduled();
                    runs += 1;
                }
                None => trace!(context = ?key, "derivation dropped before its recompute ran"),
            }
        }

        let remaining = self.pending();
        if remaining > 0 {
            debug!(runs, remaining, "flush budget exhausted");
        }

        Ok(runs)
    }

    /// Run the synchronous part of a turn, then flush.
    pub fn turn<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        let output = f();
        self.flush()?;
        Ok(output)
    }

    /// Number of recomputes waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.state.queue.borrow().len()
    }

    /// Check if a derivation is currently running.
    pub fn is_tracking(&self) -> bool {
        self.state.is_tracking()
    }

    /// Counters accumulated since the runtime was created.
    pub fn stats(&self) -> RuntimeStats {
        self.state.stats.get()
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
            .field("config", self.config())
            .field("contexts", &self.state.contexts.borrow().len())
            .field("pending", &self.pending())
            .field("stats", &self.stats())
            .finish()
    }
}
