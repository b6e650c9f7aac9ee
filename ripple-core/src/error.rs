//! Error types for the reactive runtime.

use thiserror::Error;

use crate::reactive::ProducerId;

/// Errors surfaced by signal writes and run-queue flushes.
///
/// Both variants are programming errors in the host: they are reported
/// synchronously and never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A signal was written while a derivation was executing.
    ///
    /// Restructure the code so the write happens outside the derivation.
    #[error("cannot write signal {producer} while a derivation is executing")]
    IllegalMutationDuringComputation {
        /// The signal the write was attempted on.
        producer: ProducerId,
    },

    /// The run queue was flushed from inside a derivation.
    #[error("cannot flush pending recomputes while a derivation is executing")]
    FlushDuringComputation,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;
