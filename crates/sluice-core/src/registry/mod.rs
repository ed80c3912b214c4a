//! Authorization registry surface.
//!
//! The registry is the on-chain allow-list of identifiers trusted to act as
//! controller-equivalent callers. This crate consumes it through the
//! [`AuthorizationRegistry`] trait: point reads (`is_authorized`), the
//! privileged mutation (`set_authorized`, reached only through the timelock
//! controller), the recorded governance authority, and the ordered
//! authorization-change event stream, the sole source of truth for
//! reconstructing the set, since no enumerable snapshot is assumed to exist.
//!
//! [`AuthorizationSetReducer`] folds that stream into a set;
//! [`CheckpointStore`] persists folded snapshots so later derivations replay
//! only the suffix.

mod checkpoint;
mod reducer;

pub use checkpoint::{Checkpoint, CheckpointStore, CheckpointStoreError};
pub use reducer::{AuthorizationSetReducer, ReplayError};

use std::collections::BTreeSet;

use thiserror::Error;

use crate::events::AuthorizationEvent;
use crate::types::Address;

/// Errors surfaced by a registry client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryError {
    /// The event source or read endpoint could not be reached.
    #[error("registry unavailable: {reason}")]
    Unavailable {
        /// Why the registry could not be reached.
        reason: String,
    },

    /// The registry refused a mutation.
    #[error("registry rejected mutation: {reason}")]
    Rejected {
        /// Why the mutation was refused.
        reason: String,
    },
}

/// Client surface of the on-chain authorization registry.
pub trait AuthorizationRegistry {
    /// Reads the current authorization status of `address`.
    fn is_authorized(&self, address: Address) -> Result<bool, RegistryError>;

    /// Submits the privileged authorization mutation and waits for
    /// confirmation.
    ///
    /// Callers must route through the timelock controller; the
    /// synchronizer only ever invokes this from inside a finalized change.
    fn set_authorized(&mut self, address: Address, authorized: bool) -> Result<(), RegistryError>;

    /// The governance authority the registry currently recognizes.
    fn governance(&self) -> Result<Address, RegistryError>;

    /// Hands governance over to a new authority.
    ///
    /// Like `set_authorized`, this is privileged and only ever reached
    /// through a finalized timelock change.
    fn transfer_governance(&mut self, new_authority: Address) -> Result<(), RegistryError>;

    /// Fetches ordered authorization events with `ordinal > after`.
    fn fetch_events(&self, after: u64) -> Result<Vec<AuthorizationEvent>, RegistryError>;
}

/// In-memory [`AuthorizationRegistry`] double.
///
/// Mutations append to an internal event stream with increasing ordinals,
/// exactly as a chain-backed client would observe them. Failure toggles let
/// tests exercise the unavailable/rejected paths; the mutation counter lets
/// idempotence tests assert that zero mutating calls were made.
#[derive(Debug)]
pub struct MemoryRegistry {
    governance: Address,
    events: Vec<AuthorizationEvent>,
    authorized: BTreeSet<Address>,
    fail_fetch: bool,
    fail_mutations: bool,
    mutation_count: u64,
}

impl MemoryRegistry {
    /// Creates a registry recognizing `governance` as its authority.
    #[must_use]
    pub fn new(governance: Address) -> Self {
        Self {
            governance,
            events: Vec::new(),
            authorized: BTreeSet::new(),
            fail_fetch: false,
            fail_mutations: false,
            mutation_count: 0,
        }
    }

    /// Seeds an authorization without counting it as a test-visible
    /// mutation.
    pub fn seed(&mut self, address: Address, authorized: bool) {
        self.push_event(address, authorized);
    }

    /// Makes `fetch_events` fail, simulating an unreadable event source.
    pub fn set_fetch_unavailable(&mut self, fail: bool) {
        self.fail_fetch = fail;
    }

    /// Makes `set_authorized` fail, simulating rejected submissions.
    pub fn set_mutations_failing(&mut self, fail: bool) {
        self.fail_mutations = fail;
    }

    /// Number of successful `set_authorized` calls since construction or
    /// the last [`reset_mutation_count`](Self::reset_mutation_count).
    #[must_use]
    pub const fn mutation_count(&self) -> u64 {
        self.mutation_count
    }

    /// Resets the mutation counter.
    pub fn reset_mutation_count(&mut self) {
        self.mutation_count = 0;
    }

    /// Current authorized set, for assertions.
    #[must_use]
    pub const fn authorized(&self) -> &BTreeSet<Address> {
        &self.authorized
    }

    fn push_event(&mut self, address: Address, authorized: bool) {
        let ordinal = self.events.len() as u64 + 1;
        self.events.push(AuthorizationEvent {
            ordinal,
            address,
            authorized,
        });
        if authorized {
            self.authorized.insert(address);
        } else {
            self.authorized.remove(&address);
        }
    }
}

impl AuthorizationRegistry for MemoryRegistry {
    fn is_authorized(&self, address: Address) -> Result<bool, RegistryError> {
        Ok(self.authorized.contains(&address))
    }

    fn set_authorized(&mut self, address: Address, authorized: bool) -> Result<(), RegistryError> {
        if self.fail_mutations {
            return Err(RegistryError::Rejected {
                reason: "submission refused".to_string(),
            });
        }
        self.push_event(address, authorized);
        self.mutation_count += 1;
        Ok(())
    }

    fn governance(&self) -> Result<Address, RegistryError> {
        Ok(self.governance)
    }

    fn transfer_governance(&mut self, new_authority: Address) -> Result<(), RegistryError> {
        if self.fail_mutations {
            return Err(RegistryError::Rejected {
                reason: "submission refused".to_string(),
            });
        }
        self.governance = new_authority;
        self.mutation_count += 1;
        Ok(())
    }

    fn fetch_events(&self, after: u64) -> Result<Vec<AuthorizationEvent>, RegistryError> {
        if self.fail_fetch {
            return Err(RegistryError::Unavailable {
                reason: "event source offline".to_string(),
            });
        }
        Ok(self
            .events
            .iter()
            .filter(|e| e.ordinal > after)
            .copied()
            .collect())
    }
}
