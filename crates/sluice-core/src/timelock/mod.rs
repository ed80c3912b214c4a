//! Governance timelock controller.
//!
//! Every privileged transition (an authorization change, a governance
//! handover) moves through a two-step handshake: `begin` records the change
//! and its initiation time; `finalize` applies it only once the configured
//! delay has elapsed. There is no blocking wait inside this crate: waiting
//! out the delay is the caller's concern, and `finalize` simply fails with
//! [`TimelockError::TimelockNotElapsed`] until the clock catches up.
//!
//! # Resumability
//!
//! The handshake is a persisted state machine, not an in-memory timer. The
//! controller serializes `Idle`/`Initiated` to a JSON state file on every
//! transition and reloads it on construction, so `begin` and `finalize` can
//! be invoked from independent, restartable processes. Re-beginning the same
//! change is a no-op and never resets the timer.
//!
//! Cancellation of an initiated change is deliberately not modeled; only
//! `begin` and `finalize` exist.

mod error;

pub use error::TimelockError;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::registry::RegistryError;
use crate::types::Address;

/// A privileged change awaiting the delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeDescriptor {
    /// Add or remove an address on the authorization registry.
    SetAuthorized {
        /// The address whose authorization changes.
        address: Address,
        /// `true` to authorize, `false` to revoke.
        authorized: bool,
    },

    /// Hand the registry's governance over to a new authority.
    TransferGovernance {
        /// The incoming authority.
        new_authority: Address,
    },
}

impl fmt::Display for ChangeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetAuthorized {
                address,
                authorized,
            } => write!(f, "set_authorized({address}, {authorized})"),
            Self::TransferGovernance { new_authority } => {
                write!(f, "transfer_governance({new_authority})")
            }
        }
    }
}

/// The handshake's persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TimelockState {
    /// No change in flight.
    Idle,

    /// A change is initiated and waiting out the delay.
    Initiated {
        /// The pending change.
        change: ChangeDescriptor,
        /// When the change was initiated.
        initiated_at_ns: u64,
    },
}

/// Outcome of a `begin` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    /// The change was newly initiated.
    Started,
    /// The same change was already initiated; the timer was not reset.
    AlreadyPending,
}

/// Gates privileged transitions behind an enforced minimum delay.
#[derive(Debug)]
pub struct TimelockController {
    state: TimelockState,
    delay_ns: u64,
    state_path: Option<PathBuf>,
}

impl TimelockController {
    /// Creates a controller with no persistence, for tests and embedded use.
    #[must_use]
    pub const fn ephemeral(delay_ns: u64) -> Self {
        Self {
            state: TimelockState::Idle,
            delay_ns,
            state_path: None,
        }
    }

    /// Opens a controller backed by a JSON state file.
    ///
    /// A missing file starts `Idle`; an existing one resumes whatever
    /// handshake was in flight when the previous process stopped.
    pub fn open(path: impl AsRef<Path>, delay_ns: u64) -> Result<Self, TimelockError> {
        let path = path.as_ref();
        let state = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str(&raw)?
        } else {
            TimelockState::Idle
        };

        if let TimelockState::Initiated { change, .. } = &state {
            tracing::info!(%change, "resuming initiated timelock change");
        }

        Ok(Self {
            state,
            delay_ns,
            state_path: Some(path.to_path_buf()),
        })
    }

    /// The enforced delay in nanoseconds.
    #[must_use]
    pub const fn delay_ns(&self) -> u64 {
        self.delay_ns
    }

    /// Current handshake state.
    #[must_use]
    pub const fn state(&self) -> &TimelockState {
        &self.state
    }

    /// Initiates `change` at `now_ns`.
    ///
    /// From `Idle`, records the change and persists. Re-beginning an equal
    /// change is a no-op ([`BeginOutcome::AlreadyPending`]) so a retry never
    /// resets the timer. Beginning a different change while one is pending
    /// fails with [`TimelockError::AlreadyInitialized`].
    pub fn begin(
        &mut self,
        change: ChangeDescriptor,
        now_ns: u64,
    ) -> Result<BeginOutcome, TimelockError> {
        match &self.state {
            TimelockState::Idle => {
                self.state = TimelockState::Initiated {
                    change,
                    initiated_at_ns: now_ns,
                };
                self.persist()?;
                tracing::info!(%change, now_ns, "timelock change initiated");
                Ok(BeginOutcome::Started)
            }
            TimelockState::Initiated {
                change: pending, ..
            } if *pending == change => Ok(BeginOutcome::AlreadyPending),
            TimelockState::Initiated {
                change: pending, ..
            } => Err(TimelockError::AlreadyInitialized { pending: *pending }),
        }
    }

    /// Finalizes the initiated change at `now_ns`, applying it via `apply`.
    ///
    /// Valid only when a change is initiated and
    /// `now_ns ≥ initiated_at + delay`. On successful application the
    /// controller returns to `Idle` and persists; if `apply` fails, the
    /// change stays initiated and a later `finalize_with` may retry it.
    pub fn finalize_with(
        &mut self,
        now_ns: u64,
        apply: impl FnOnce(&ChangeDescriptor) -> Result<(), RegistryError>,
    ) -> Result<ChangeDescriptor, TimelockError> {
        let TimelockState::Initiated {
            change,
            initiated_at_ns,
        } = self.state
        else {
            return Err(TimelockError::NotInitiated);
        };

        let finalizable_at = initiated_at_ns.saturating_add(self.delay_ns);
        if now_ns < finalizable_at {
            return Err(TimelockError::TimelockNotElapsed {
                remaining_ns: finalizable_at - now_ns,
            });
        }

        apply(&change)?;

        self.state = TimelockState::Idle;
        self.persist()?;
        tracing::info!(%change, "timelock change finalized");
        Ok(change)
    }

    fn persist(&self) -> Result<(), TimelockError> {
        if let Some(path) = &self.state_path {
            let encoded = serde_json::to_string_pretty(&self.state)?;
            std::fs::write(path, encoded)?;
        }
        Ok(())
    }
}
