//! Consumer contexts.
//!
//! A consumer context is the bookkeeping record of one derivation: whether
//! it is pure, which producers its latest execution read, and whether a
//! recompute is already queued for it. Contexts live in the runtime's arena
//! and are addressed by [`ContextKey`].

use std::fmt;
use std::rc::Weak;

use indexmap::IndexMap;
use slotmap::new_key_type;

use super::signal::{Producer, ProducerId};

new_key_type! {
    /// Arena key of a consumer context.
    pub struct ContextKey;
}

/// Whether a derivation may be memoized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purity {
    /// A side-effect-free function of the producers it reads.
    ///
    /// Pure derivations skip requests from producers they did not read,
    /// ignore writes that do not change a value, and cache their results.
    Pure,

    /// Recomputes on every request.
    Impure,
}

impl Purity {
    /// Whether this is [`Purity::Pure`].
    pub fn is_pure(self) -> bool {
        matches!(self, Purity::Pure)
    }
}

impl From<bool> for Purity {
    fn from(pure: bool) -> Self {
        if pure {
            Purity::Pure
        } else {
            Purity::Impure
        }
    }
}

/// Receives the deferred recompute once the run queue reaches a context.
pub(crate) trait Recompute {
    fn run_scheduled(&self);
}

/// The record of one derivation inside the runtime arena.
pub(crate) struct ConsumerContext {
    purity: Purity,

    /// Producers read by the most recent execution, in first-read order.
    producers: IndexMap<ProducerId, Weak<dyn Producer>>,

    /// Set while a deferred recompute is queued and has not finished.
    pending: bool,

    /// Entry point of the owning derivation. `None` until construction has
    /// finished its first execution.
    handler: Option<Weak<dyn Recompute>>,
}

impl ConsumerContext {
    pub(crate) fn new(purity: Purity) -> Self {
        Self {
            purity,
            producers: IndexMap::new(),
            pending: false,
            handler: None,
        }
    }

    pub(crate) fn purity(&self) -> Purity {
        self.purity
    }

    pub(crate) fn attach(&mut self, handler: Weak<dyn Recompute>) {
        self.handler = Some(handler);
    }

    pub(crate) fn handler(&self) -> Option<Weak<dyn Recompute>> {
        self.handler.clone()
    }

    pub(crate) fn record_read(&mut self, id: ProducerId, producer: Weak<dyn Producer>) {
        self.producers.entry(id).or_insert(producer);
    }

    pub(crate) fn clear_producers(&mut self) {
        self.producers.clear();
    }

    pub(crate) fn has_producer(&self, id: ProducerId) -> bool {
        self.producers.contains_key(&id)
    }

    pub(crate) fn producer_ids(&self) -> Vec<ProducerId> {
        self.producers.keys().copied().collect()
    }

    /// The last-active producers ordered by id, which is creation order.
    pub(crate) fn sorted_producers(&self) -> Vec<Weak<dyn Producer>> {
        let mut producers: Vec<_> = self
            .producers
            .iter()
            .map(|(id, producer)| (*id, producer.clone()))
            .collect();
        producers.sort_unstable_by_key(|(id, _)| *id);
        producers.into_iter().map(|(_, producer)| producer).collect()
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending
    }

    pub(crate) fn set_pending(&mut self, pending: bool) {
        self.pending = pending;
    }
}

impl fmt::Debug for ConsumerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerContext")
            .field("purity", &self.purity)
            .field("producers", &self.producers.keys().collect::<Vec<_>>())
            .field("pending", &self.pending)
            .field("attached", &self.handler.is_some())
            .finish()
    }
}
