//! Guard-specific error types.

use thiserror::Error;

use super::state::Role;
use crate::targets::TargetError;
use crate::types::Address;

/// Errors that can occur during guard operations.
///
/// Every rejection is a distinct variant so monitoring can tell "hit the
/// cap" apart from "not authorized" without parsing messages.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum GuardError {
    /// Issuance would push exposure above the global cap.
    #[error(
        "cap exceeded: issuing {requested} on top of {total_issued} breaches cap {global_cap}"
    )]
    CapExceeded {
        /// Amount that was requested.
        requested: u128,
        /// Exposure before the attempt.
        total_issued: u128,
        /// The configured cap.
        global_cap: u128,
    },

    /// Issuance would exceed the per-window rate limit.
    #[error(
        "rate limit exceeded: issuing {requested} on top of {accumulated} in-window breaches limit {rate_limit}"
    )]
    RateLimitExceeded {
        /// Amount that was requested.
        requested: u128,
        /// Amount already issued in the current window.
        accumulated: u128,
        /// The configured per-window bound.
        rate_limit: u128,
    },

    /// Controller issuance is paused.
    #[error("guard is paused")]
    Paused,

    /// The amount was zero or would overflow the exposure counter.
    #[error("invalid amount: {reason}")]
    InvalidAmount {
        /// Why the amount was rejected.
        reason: &'static str,
    },

    /// Retirement (or negative reconciliation) exceeds current exposure.
    #[error("insufficient exposure: retiring {requested} with only {total_issued} issued")]
    InsufficientExposure {
        /// Amount that was requested.
        requested: u128,
        /// Exposure at the time of the attempt.
        total_issued: u128,
    },

    /// The caller does not hold the required role.
    #[error("unauthorized: {actor} is not the {required}")]
    Unauthorized {
        /// The rejected caller.
        actor: Address,
        /// The role the operation requires.
        required: Role,
    },

    /// A required participant address was the all-zero sentinel.
    #[error("zero address for {field}")]
    ZeroAddress {
        /// Which parameter was zero.
        field: &'static str,
    },

    /// A new cap would fall below already-issued exposure.
    #[error("cap {global_cap} is below current exposure {total_issued}")]
    CapBelowIssued {
        /// The rejected cap.
        global_cap: u128,
        /// Current exposure.
        total_issued: u128,
    },

    /// The execution target failed; no guard state was mutated.
    #[error(transparent)]
    Target(#[from] TargetError),
}
