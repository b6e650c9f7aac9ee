//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which derivations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read while a derivation is running, the signal
//!    registers that derivation's context as a consumer, and the context
//!    records the signal as one of its producers.
//!
//! 2. When a signal is written, every live consumer is asked to recompute.
//!    Pure consumers are skipped when the new value equals the old one.
//!
//! 3. Recompute requests are only queued here. They run when the runtime
//!    flushes, after the writes of the current turn.
//!
//! # Memory Layout
//!
//! Each signal consists of:
//! - A unique ID (8 bytes)
//! - The value, behind a `RefCell`
//! - A registry of consumer context keys (grows with number of dependents)
//!
//! Consumers are referenced by arena key only, so a signal never keeps a
//! derivation alive.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{ReactiveError, Result};
use crate::identity::{IdentityHasher, IdentityKey, KeyPart};

use super::registry::WeakRegistry;
use super::runtime::RuntimeState;
use super::ContextKey;

/// Counter for generating unique producer IDs.
static PRODUCER_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier of a signal or a derivation's output cell.
///
/// IDs are handed out in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProducerId(u64);

impl ProducerId {
    fn next() -> Self {
        Self(PRODUCER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ProducerId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Types that can be stored in a signal.
///
/// Equality drives no-op write suppression; the identity key drives the
/// memo cache of pure derivations.
pub trait Value: Clone + PartialEq + IdentityKey + 'static {}

impl<T> Value for T where T: Clone + PartialEq + IdentityKey + 'static {}

/// Type-erased view of a cell, as seen from a consumer's producer set.
pub(crate) trait Producer {
    fn id(&self) -> ProducerId;

    /// Key the current value without tracking the read.
    fn identity_key(&self, hasher: &mut IdentityHasher) -> KeyPart;
}

/// A single value slot with read tracking and write notification.
///
/// Backs both [`Signal`] and the output of every derivation.
pub(crate) struct SignalCell<T: Value> {
    id: ProducerId,
    value: RefCell<T>,
    consumers: RefCell<WeakRegistry<ContextKey>>,
    runtime: Rc<RuntimeState>,
    this: Weak<SignalCell<T>>,
}

impl<T: Value> SignalCell<T> {
    pub(crate) fn new(runtime: Rc<RuntimeState>, value: T) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            id: ProducerId::next(),
            value: RefCell::new(value),
            consumers: RefCell::new(WeakRegistry::new()),
            runtime,
            this: this.clone(),
        })
    }

    pub(crate) fn id(&self) -> ProducerId {
        self.id
    }

    /// Read the value, registering the running derivation (if any).
    pub(crate) fn read(&self) -> T {
        if let Some(key) = self.runtime.current_context() {
            self.runtime.track(&mut self.consumers.borrow_mut(), key);

            let producer: Weak<dyn Producer> = self.this.clone();
            self.runtime.record_read(key, self.id, producer);
        }

        self.read_untracked()
    }

    pub(crate) fn read_untracked(&self) -> T {
        self.value.borrow().clone()
    }

    /// The public write path, rejected while any derivation is running.
    pub(crate) fn write(&self, value: T) -> Result<()> {
        if self.runtime.is_tracking() {
            return Err(ReactiveError::IllegalMutationDuringComputation { producer: self.id });
        }

        self.replace_and_notify(value);
        Ok(())
    }

    /// Store a value and ask every live consumer to recompute.
    ///
    /// Derivations publish their results through here while their own
    /// context is still active, which is why it skips the write guard.
    pub(crate) fn replace_and_notify(&self, value: T) {
        let unchanged = {
            let mut slot = self.value.borrow_mut();
            let unchanged = *slot == value;
            *slot = value;
            unchanged
        };

        let consumers = self
            .runtime
            .live_consumers(&mut self.consumers.borrow_mut());

        for key in consumers {
            self.runtime.request_recompute(key, self.id, unchanged);
        }
    }

    pub(crate) fn consumer_count(&self) -> usize {
        self.runtime.count_live(&self.consumers.borrow())
    }
}

impl<T: Value> Producer for SignalCell<T> {
    fn id(&self) -> ProducerId {
        self.id
    }

    fn identity_key(&self, hasher: &mut IdentityHasher) -> KeyPart {
        self.value.borrow().identity_key(hasher)
    }
}

/// Anything whose value can be read, tracked or not.
pub trait Readable {
    /// The type read.
    type Value;

    /// Read the value, registering the running derivation as a consumer.
    fn get(&self) -> Self::Value;

    /// Read the value without creating a dependency edge.
    fn get_untracked(&self) -> Self::Value;
}

/// Read any handle without tracking.
pub fn read_untracked<R: Readable>(handle: &R) -> R::Value {
    handle.get_untracked()
}

/// A reactive signal holding a value of type T.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::Runtime;
///
/// let runtime = Runtime::new();
/// let count = runtime.signal(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (queues recomputes for consumers)
/// count.set(5).unwrap();
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T: Value> {
    cell: Rc<SignalCell<T>>,
}

impl<T: Value> Signal<T> {
    pub(crate) fn new(runtime: Rc<RuntimeState>, value: T) -> Self {
        Self {
            cell: SignalCell::new(runtime, value),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> ProducerId {
        self.cell.id()
    }

    /// Get the current value.
    ///
    /// If called while a derivation is running, this also registers that
    /// derivation as a consumer.
    pub fn get(&self) -> T {
        self.cell.read()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.cell.read_untracked()
    }

    /// Set a new value and request recomputes from consumers.
    ///
    /// Fails if a derivation is currently running.
    pub fn set(&self, value: T) -> Result<()> {
        self.cell.write(value)
    }

    /// Update the value using a function of the current one.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(&self.cell.read_untracked());
        self.set(next)
    }

    /// Number of live consumers.
    pub fn consumer_count(&self) -> usize {
        self.cell.consumer_count()
    }
}

impl<T: Value> Readable for Signal<T> {
    type Value = T;

    fn get(&self) -> T {
        Signal::get(self)
    }

    fn get_untracked(&self) -> T {
        Signal::get_untracked(self)
    }
}

impl<T: Value> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Value + Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id())
            .field("value", &self.get_untracked())
            .field("consumer_count", &self.consumer_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
