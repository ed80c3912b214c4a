//! Timelock-specific error types.

use thiserror::Error;

use super::ChangeDescriptor;
use crate::registry::RegistryError;

/// Errors that can occur during timelock operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TimelockError {
    /// `finalize` was called with no change initiated.
    #[error("no change is initiated")]
    NotInitiated,

    /// The enforced delay has not yet elapsed.
    #[error("timelock not elapsed: {remaining_ns}ns remaining")]
    TimelockNotElapsed {
        /// Nanoseconds until the change becomes finalizable.
        remaining_ns: u64,
    },

    /// A different change is already initiated.
    ///
    /// Only one change may be in flight; finalize or wait out the pending
    /// one before beginning another.
    #[error("a different change is already initiated: {pending}")]
    AlreadyInitialized {
        /// The change currently in flight.
        pending: ChangeDescriptor,
    },

    /// Applying the finalized change failed; the change stays initiated and
    /// may be finalized again.
    #[error("finalized change failed to apply: {0}")]
    Apply(#[from] RegistryError),

    /// Persisting the handshake state failed.
    #[error("failed to persist timelock state: {0}")]
    Persist(#[from] std::io::Error),

    /// Encoding or decoding the persisted state failed.
    #[error("corrupt timelock state: {0}")]
    Encode(#[from] serde_json::Error),
}
