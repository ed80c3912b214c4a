//! Exposure guard: capped, rate-limited issuance accounting.
//!
//! The guard owns a single exposure counter, the net amount of bridged
//! value issued and not yet retired, and gates every movement of that
//! counter behind role checks, a global cap, and a rolling issuance window.
//! Actual value movement is delegated to the execution targets in
//! [`crate::targets`]; the guard never holds balances itself.
//!
//! # Roles
//!
//! - **Controller** drives issuance and retirement. It cannot touch the raw
//!   counter: there is no controller-reachable adjustment primitive, so a
//!   compromised controller cannot fabricate spare capacity without real
//!   value movement.
//! - **Owner** reconfigures bounds, pauses issuance, and applies
//!   reconciliation adjustments (which work even while paused).
//!
//! # Failure atomicity
//!
//! Every operation either completes fully (counters, window state, target
//! call, emitted event) or returns a specific [`GuardError`] with the state
//! byte-identical to before the call.

mod engine;
mod error;
mod state;

pub use engine::ExposureGuard;
pub use error::GuardError;
pub use state::{GuardSnapshot, GuardState, Role};
