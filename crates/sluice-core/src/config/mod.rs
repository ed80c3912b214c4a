//! Configuration parsing and validation.
//!
//! Hosts describe a deployment in one TOML document: guard bounds and
//! roles, the desired allow-list with its mass-revoke gate, the timelock
//! delay and state path, and the store locations. Parsing is fail-closed:
//! contradictory input (an allow flag without its confirmation token, a
//! rate limit with a zero-length window, a zero role address) is rejected
//! at load time rather than discovered mid-run.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::guard::GuardState;
use crate::sync::{MASS_REVOKE_CONFIRMATION, MassRevokeGate};
use crate::types::Address;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be serialized.
    #[error("serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The configuration parsed but is internally inconsistent.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SluiceConfig {
    /// Exposure guard bounds and roles.
    pub guard: GuardSection,

    /// Synchronizer input: desired set, gates, dry-run.
    #[serde(default)]
    pub sync: SyncSection,

    /// Timelock delay and persistence.
    #[serde(default)]
    pub timelock: TimelockSection,

    /// Store locations.
    #[serde(default)]
    pub store: StoreSection,
}

impl SluiceConfig {
    /// Loads and validates configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.guard.controller.is_zero() {
            return Err(ConfigError::Validation(
                "guard.controller must not be the zero address".to_string(),
            ));
        }
        if self.guard.owner.is_zero() {
            return Err(ConfigError::Validation(
                "guard.owner must not be the zero address".to_string(),
            ));
        }
        if self.guard.rate_limit > 0 && self.guard.rate_window_secs == 0 {
            return Err(ConfigError::Validation(
                "guard.rate_window_secs must be positive when guard.rate_limit is set".to_string(),
            ));
        }
        if self.sync.authority.is_zero() {
            return Err(ConfigError::Validation(
                "sync.authority must not be the zero address".to_string(),
            ));
        }
        if self.sync.desired.iter().any(Address::is_zero) {
            return Err(ConfigError::Validation(
                "sync.desired must not contain the zero address".to_string(),
            ));
        }
        if self.sync.allow_mass_revoke
            && self.sync.mass_revoke_confirmation.as_deref() != Some(MASS_REVOKE_CONFIRMATION)
        {
            return Err(ConfigError::Validation(format!(
                "sync.allow_mass_revoke requires sync.mass_revoke_confirmation = \
                 \"{MASS_REVOKE_CONFIRMATION}\""
            )));
        }
        Ok(())
    }
}

/// `[guard]` section: bounds and roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardSection {
    /// Controller role address.
    pub controller: Address,

    /// Owner role address.
    pub owner: Address,

    /// Exposure cap; zero means unbounded.
    #[serde(default, with = "amount")]
    pub global_cap: u128,

    /// Per-window issuance bound; zero disables rate limiting.
    #[serde(default, with = "amount")]
    pub rate_limit: u128,

    /// Rate window length in seconds.
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,

    /// Whether the guard starts paused.
    #[serde(default)]
    pub start_paused: bool,
}

impl GuardSection {
    /// Builds the initial guard state this section describes.
    pub fn initial_state(&self) -> Result<GuardState, crate::guard::GuardError> {
        Ok(GuardState::new(self.controller, self.owner)?
            .with_cap(self.global_cap)
            .with_rate_limit(self.rate_limit, self.rate_window_secs)
            .with_paused(self.start_paused))
    }
}

impl Default for GuardSection {
    fn default() -> Self {
        Self {
            controller: Address::ZERO,
            owner: Address::ZERO,
            global_cap: 0,
            rate_limit: 0,
            rate_window_secs: default_rate_window_secs(),
            start_paused: false,
        }
    }
}

/// `[sync]` section: synchronizer input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSection {
    /// Governance identity the synchronizer acts as.
    pub authority: Address,

    /// The desired allow-list.
    #[serde(default)]
    pub desired: Vec<Address>,

    /// Allow flag for mass revocation.
    #[serde(default)]
    pub allow_mass_revoke: bool,

    /// Explicit confirmation token for mass revocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mass_revoke_confirmation: Option<String>,

    /// Compute and log without submitting.
    #[serde(default)]
    pub dry_run: bool,

    /// Optional event-replay checkpoint cursor; derivation resumes from the
    /// nearest persisted checkpoint at or before it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay_checkpoint: Option<u64>,
}

impl SyncSection {
    /// The desired set, deduplicated.
    #[must_use]
    pub fn desired_set(&self) -> BTreeSet<Address> {
        self.desired.iter().copied().collect()
    }

    /// The mass-revoke gate this section describes.
    #[must_use]
    pub fn mass_revoke_gate(&self) -> MassRevokeGate {
        MassRevokeGate {
            allow: self.allow_mass_revoke,
            confirmation: self.mass_revoke_confirmation.clone(),
        }
    }
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            authority: Address::ZERO,
            desired: Vec::new(),
            allow_mass_revoke: false,
            mass_revoke_confirmation: None,
            dry_run: false,
            replay_checkpoint: None,
        }
    }
}

/// `[timelock]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelockSection {
    /// Enforced delay between begin and finalize, in seconds.
    #[serde(default = "default_timelock_delay_secs")]
    pub delay_secs: u64,

    /// Handshake state file.
    #[serde(default = "default_timelock_state_file")]
    pub state_file: PathBuf,
}

impl TimelockSection {
    /// The delay in nanoseconds.
    #[must_use]
    pub const fn delay_ns(&self) -> u64 {
        self.delay_secs.saturating_mul(1_000_000_000)
    }
}

impl Default for TimelockSection {
    fn default() -> Self {
        Self {
            delay_secs: default_timelock_delay_secs(),
            state_file: default_timelock_state_file(),
        }
    }
}

/// `[store]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSection {
    /// Event store database path.
    #[serde(default = "default_events_db")]
    pub events_db: PathBuf,

    /// Checkpoint store database path.
    #[serde(default = "default_checkpoints_db")]
    pub checkpoints_db: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            events_db: default_events_db(),
            checkpoints_db: default_checkpoints_db(),
        }
    }
}

fn default_rate_window_secs() -> u64 {
    3600
}

fn default_timelock_delay_secs() -> u64 {
    86_400
}

fn default_timelock_state_file() -> PathBuf {
    PathBuf::from("sluice-timelock.json")
}

fn default_events_db() -> PathBuf {
    PathBuf::from("sluice-events.db")
}

fn default_checkpoints_db() -> PathBuf {
    PathBuf::from("sluice-checkpoints.db")
}

/// Amounts in TOML are decimal strings: token units routinely exceed the
/// signed 64-bit range TOML integers offer.
mod amount {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse()
            .map_err(|_| D::Error::custom(format!("invalid amount: {raw}")))
    }
}
