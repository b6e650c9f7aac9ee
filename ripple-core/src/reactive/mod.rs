//! Reactive Primitives
//!
//! This module implements the core reactive system: signals and
//! derivations, plus the runtime that connects them.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! while a derivation is running, the signal automatically registers that
//! derivation as a consumer. When the signal is written, its consumers are
//! asked to recompute.
//!
//! ## Derivations
//!
//! A Derivation is a computed value. It runs once when created, and again
//! (deferred to the end of the turn) whenever a producer it read is written.
//! Pure derivations additionally cache their results by input values and
//! ignore writes that cannot affect them.
//!
//! ## Turns
//!
//! Writes only queue work. [`Runtime::flush`] runs the queued recomputes,
//! at most once per derivation for all the writes made since the previous
//! flush.
//!
//! # Implementation Notes
//!
//! Dependency tracking is implicit: the runtime keeps a stack of running
//! derivations and a read attributes itself to the top of that stack. The
//! stack and the arena of consumer contexts are owned by the runtime rather
//! than being process-wide, and producers refer to consumers by arena key
//! only, so they never keep a derivation alive.

mod consumer;
mod context;
mod derived;
mod registry;
mod runtime;
mod signal;

pub use consumer::{ContextKey, Purity};
pub use derived::Derivation;
pub use registry::{Liveness, WeakRegistry};
pub use runtime::{Runtime, RuntimeStats};
pub use signal::{read_untracked, ProducerId, Readable, Signal, Value};
