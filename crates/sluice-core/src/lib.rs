//! # sluice-core
//!
//! Safe, bounded issuance and retirement of a bridged value-bearing
//! accounting record, plus governance-controlled maintenance of the
//! allow-list of callers trusted to trigger it.
//!
//! Three subsystems cooperate:
//!
//! - The [`guard`] module owns the shared exposure counter. Issuance and
//!   retirement are gated behind a global cap, a rolling rate window, a
//!   pause flag, and strict controller/owner role separation, with every
//!   operation failing atomically.
//! - The [`sync`] module reconciles a desired allow-list against the
//!   on-chain set, which it derives by folding ordered registry events from
//!   a persisted checkpoint, there being no enumerable snapshot to read. All
//!   ambiguity biases toward doing nothing; revoking everyone requires an
//!   explicit, doubly-confirmed gate.
//! - The [`timelock`] module gates every privileged registry mutation
//!   behind an enforced delay, as a persisted two-step handshake that
//!   survives process restarts.
//!
//! Value movement itself is delegated to the execution targets in
//! [`targets`]; this crate keeps the books and enforces the bounds.
//!
//! ## Example
//!
//! ```rust
//! use sluice_core::guard::{ExposureGuard, GuardState};
//! use sluice_core::targets::{MemoryLedger, MemoryVault};
//! use sluice_core::types::Address;
//!
//! let controller = Address::new([0x11; 20]);
//! let owner = Address::new([0x22; 20]);
//! let recipient = Address::new([0x33; 20]);
//!
//! let state = GuardState::new(controller, owner)
//!     .expect("non-zero roles")
//!     .with_cap(1_000)
//!     .with_rate_limit(100, 60);
//! let mut guard = ExposureGuard::new(state, MemoryLedger::new(), MemoryVault::new());
//!
//! let event = guard.issue_at(controller, recipient, 60, 0).expect("within bounds");
//! assert_eq!(guard.total_issued(), 60);
//! # let _ = event;
//! ```

pub mod config;
pub mod events;
pub mod guard;
pub mod registry;
pub mod sync;
pub mod targets;
pub mod timelock;
pub mod types;

pub use config::{ConfigError, SluiceConfig};
pub use events::{AuthorizationEvent, EventStore, GuardEvent};
pub use guard::{ExposureGuard, GuardError, GuardState};
pub use registry::{AuthorizationRegistry, RegistryError};
pub use sync::{AuthorizationPlan, MassRevokeGate, SyncError, SyncReport, Synchronizer};
pub use timelock::{ChangeDescriptor, TimelockController, TimelockError};
pub use types::Address;
