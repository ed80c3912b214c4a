//! Authorization synchronizer: derive, plan, apply.
//!
//! The on-chain allow-list has no enumerable snapshot, so the only way to
//! know its current membership is to fold the registry's ordered
//! authorization-change events. That shapes the whole module:
//!
//! - **Derivation** ([`Synchronizer::derive_existing`]) replays events from
//!   the last persisted checkpoint. When the event source is unreadable the
//!   result is *unknown*, a first-class outcome never coerced to "empty".
//! - **Planning** ([`compute_plan`]) takes the minimal set difference, with
//!   every ambiguous input biased toward doing nothing. Revoking every
//!   member (an empty desired set against a populated registry) requires
//!   the [`MassRevokeGate`]'s allow flag *and* its explicit confirmation
//!   token.
//! - **Application** ([`Synchronizer::apply`]) routes each mutation through
//!   the governance timelock, skips items that are already correct, and
//!   isolates per-item failures so one bad submission never aborts the
//!   batch. Convergence under concurrent or repeated runs comes from that
//!   idempotency, not from locking.

mod apply;
mod error;
mod plan;

pub use apply::{ItemAction, ItemOutcome, ItemReport, SyncReport, Synchronizer};
pub use error::SyncError;
pub use plan::{
    AuthorizationPlan, ExistingSet, MASS_REVOKE_CONFIRMATION, MassRevokeGate, compute_plan,
};
