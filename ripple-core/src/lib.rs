//! Ripple Core
//!
//! This crate provides a small push-driven reactive runtime: mutable state
//! cells ("signals") and derived values ("derivations") that track which
//! signals they read and recompute when those signals change.
//!
//! It implements:
//!
//! - Signals with implicit read tracking
//! - Derivations, optionally pure (memoized and filtered)
//! - Deferred, coalesced recomputes drained once per turn
//! - Identity hashing for memo cache keys
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: signals, derivations and the runtime that schedules them
//! - `identity`: keys for arbitrary values, used by memo caches
//! - `config`: runtime tunables
//! - `error`: the errors surfaced to the host
//!
//! # Example
//!
//! ```rust
//! use ripple_core::reactive::{read_untracked, Purity, Runtime};
//!
//! let runtime = Runtime::new();
//!
//! // Create a signal
//! let counter = runtime.signal(0);
//!
//! // Create derived values
//! let c = counter.clone();
//! let doubled = runtime.derive(Purity::Pure, move || c.get() * 2);
//!
//! let (d, c) = (doubled.clone(), counter.clone());
//! let tripled = runtime.derive(Purity::Pure, move || d.get() + read_untracked(&c));
//!
//! // Update the signal, then finish the turn
//! counter.set(1)?;
//! runtime.flush()?;
//!
//! assert_eq!(doubled.get(), 2);
//! assert_eq!(tripled.get(), 3);
//! # Ok::<(), ripple_core::ReactiveError>(())
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod reactive;

pub use config::RuntimeConfig;
pub use error::{ReactiveError, Result};
