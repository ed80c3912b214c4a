//! Typed events emitted by the guard and observed from the registry.
//!
//! Guard events are the audit surface for off-chain monitoring: every
//! state-changing guard operation produces one, carrying the new running
//! total so monitors never have to reconstruct it. Authorization events are
//! the sole source of truth for deriving the on-chain allow-list (there is
//! no enumerable snapshot to query).
//!
//! Both kinds are persisted in the append-only [`EventStore`].

mod store;

pub use store::{EventStore, EventStoreError};

use serde::{Deserialize, Serialize};

use crate::types::Address;

/// Which retirement path moved the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetirePath {
    /// Value was debited from the settlement ledger.
    Ledger,
    /// Value was unwound through the conversion vault.
    Vault,
}

/// An event emitted by a guard operation.
///
/// Every variant carries the post-operation `total_issued` so a monitor can
/// track exposure without replaying the full history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuardEvent {
    /// Issuance succeeded; exposure went up.
    IssuanceIncreased {
        /// Account credited on the settlement ledger.
        recipient: Address,
        /// Amount issued.
        amount: u128,
        /// Exposure after the operation.
        total_issued: u128,
    },

    /// Retirement succeeded; exposure went down.
    IssuanceDecreased {
        /// Account debited, when retirement went through the ledger.
        source: Option<Address>,
        /// Amount retired.
        amount: u128,
        /// Exposure after the operation.
        total_issued: u128,
        /// Which execution target handled the retirement.
        path: RetirePath,
    },

    /// Owner applied a signed reconciliation adjustment.
    ///
    /// Deliberately distinct from the issuance events so controller-driven
    /// and owner-driven counter movement stay separately auditable.
    ReconciliationApplied {
        /// Signed adjustment applied to the counter.
        delta: i128,
        /// Exposure after the adjustment.
        total_issued: u128,
    },

    /// Owner changed the global cap.
    CapUpdated {
        /// New cap; zero means unbounded.
        global_cap: u128,
    },

    /// Owner changed the rate limit or window length.
    RateLimitUpdated {
        /// New per-window issuance bound; zero disables rate limiting.
        rate_limit: u128,
        /// New window length in seconds.
        rate_window_secs: u64,
    },

    /// Owner toggled the pause flag.
    PauseUpdated {
        /// New pause state.
        paused: bool,
    },
}

impl GuardEvent {
    /// Stable event-type string used as the store discriminator.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::IssuanceIncreased { .. } => "guard.issuance_increased",
            Self::IssuanceDecreased { .. } => "guard.issuance_decreased",
            Self::ReconciliationApplied { .. } => "guard.reconciliation_applied",
            Self::CapUpdated { .. } => "guard.cap_updated",
            Self::RateLimitUpdated { .. } => "guard.rate_limit_updated",
            Self::PauseUpdated { .. } => "guard.pause_updated",
        }
    }
}

/// A single `authorization-updated` registry event.
///
/// Ordinals are assigned by the event source and strictly increase; replaying
/// them in order from a checkpoint reconstructs the allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationEvent {
    /// Position of this event in the registry's ordered stream.
    pub ordinal: u64,
    /// The address whose authorization changed.
    pub address: Address,
    /// `true` when the address was added to the allow-list.
    pub authorized: bool,
}
