//! Folds ordered authorization events into the allow-list set.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::AuthorizationEvent;
use crate::types::Address;

/// Errors from replaying the authorization stream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplayError {
    /// An event arrived at or before the reducer's cursor.
    ///
    /// Replay is only correct over a strictly increasing ordinal sequence;
    /// a regression means the stream or the checkpoint is damaged, and the
    /// derivation must be treated as unavailable rather than guessed at.
    #[error("out-of-order event: ordinal {ordinal} at cursor {cursor}")]
    OutOfOrder {
        /// The reducer's current cursor.
        cursor: u64,
        /// The offending event ordinal.
        ordinal: u64,
    },

    /// A persisted checkpoint could not be decoded.
    #[error("corrupt checkpoint state: {reason}")]
    CorruptState {
        /// Decode failure detail.
        reason: String,
    },
}

/// Deterministic projection of the registry's event stream.
///
/// Folding the same ordered sequence always yields the same set, whether
/// replayed from genesis or restored from an intermediate checkpoint. The
/// checkpoint tests verify that property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationSetReducer {
    authorized: BTreeSet<Address>,
    cursor: u64,
}

impl AuthorizationSetReducer {
    /// A reducer at genesis: empty set, cursor 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a reducer from serialized checkpoint state.
    pub fn from_checkpoint_state(data: &str) -> Result<Self, ReplayError> {
        serde_json::from_str(data).map_err(|e| ReplayError::CorruptState {
            reason: e.to_string(),
        })
    }

    /// Serializes the reducer for checkpointing.
    #[must_use]
    pub fn to_checkpoint_state(&self) -> String {
        // BTreeSet + struct with no map keys: serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Applies one event; `authorized = true` inserts, `false` removes.
    pub fn apply(&mut self, event: &AuthorizationEvent) -> Result<(), ReplayError> {
        if event.ordinal <= self.cursor {
            return Err(ReplayError::OutOfOrder {
                cursor: self.cursor,
                ordinal: event.ordinal,
            });
        }

        if event.authorized {
            self.authorized.insert(event.address);
        } else {
            self.authorized.remove(&event.address);
        }
        self.cursor = event.ordinal;
        Ok(())
    }

    /// Applies an ordered batch.
    pub fn apply_all(&mut self, events: &[AuthorizationEvent]) -> Result<(), ReplayError> {
        for event in events {
            self.apply(event)?;
        }
        Ok(())
    }

    /// The folded allow-list.
    #[must_use]
    pub const fn authorized(&self) -> &BTreeSet<Address> {
        &self.authorized
    }

    /// Ordinal of the last folded event (0 at genesis).
    #[must_use]
    pub const fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Consumes the reducer, returning the folded set.
    #[must_use]
    pub fn into_set(self) -> BTreeSet<Address> {
        self.authorized
    }
}
