//! Synchronizer-specific error types.
//!
//! These are the batch-level failures that abort a run before any mutation.
//! Per-item failures during apply are never errors at this level; they are
//! caught and recorded in the run's [`SyncReport`](super::SyncReport).

use thiserror::Error;

use crate::registry::RegistryError;
use crate::types::Address;

/// Errors that abort an entire synchronizer run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// The existing allow-list could not be derived.
    ///
    /// The existing set is *unknown*, not empty, and the distinction is
    /// load-bearing: an unknown set combined with a mass-revoke request
    /// must abort rather than risk revoking callers we cannot see.
    #[error("cannot derive existing allow-list: {reason}")]
    DerivationUnavailable {
        /// Why derivation failed.
        reason: String,
    },

    /// The registry's recorded governance does not match the authority this
    /// synchronizer is configured to act as.
    #[error("governance mismatch: registry records {actual}, configured authority is {expected}")]
    GovernanceMismatch {
        /// The authority we are configured to act as.
        expected: Address,
        /// The authority the registry actually records.
        actual: Address,
    },

    /// The registry could not answer a batch precondition read.
    #[error("registry precondition read failed: {0}")]
    Registry(#[from] RegistryError),
}
