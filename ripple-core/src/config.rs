//! Runtime configuration.
//!
//! Hosts usually build a [`RuntimeConfig`] with the setters below, but the
//! type also deserializes from any serde format so it can live in an
//! application config file:
//!
//! ```toml
//! [reactive]
//! memoize = true
//! flush_budget = 256
//! ```

use std::num::NonZeroUsize;

use serde::Deserialize;

/// Tunables for a [`Runtime`](crate::reactive::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Whether pure derivations keep a result cache keyed by their inputs.
    ///
    /// When off, pure derivations still skip requests from producers they
    /// did not read and writes that did not change a value, but every
    /// deferred run calls the user function again.
    pub memoize: bool,

    /// Maximum number of deferred runs a single `flush` performs.
    ///
    /// Whatever is left stays queued for the next flush. `None` drains the
    /// queue completely. A budget is never zero, so every flush makes
    /// progress.
    pub flush_budget: Option<NonZeroUsize>,
}

impl RuntimeConfig {
    /// Enable or disable the pure-derivation result cache.
    pub fn memoize(mut self, memoize: bool) -> Self {
        self.memoize = memoize;
        self
    }

    /// Cap the number of deferred runs per flush.
    pub fn flush_budget(mut self, budget: NonZeroUsize) -> Self {
        self.flush_budget = Some(budget);
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            memoize: true,
            flush_budget: None,
        }
    }
}
