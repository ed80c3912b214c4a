//! Guard state: counters, bounds, window, and roles.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::GuardError;
use crate::types::Address;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// The two roles that may call guard operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May trigger issuance and retirement against execution targets.
    Controller,
    /// May reconfigure bounds, pause, and reconcile the counter.
    Owner,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Controller => write!(f, "controller"),
            Self::Owner => write!(f, "owner"),
        }
    }
}

/// The guard's owned, serializable state.
///
/// Mutated only through [`ExposureGuard`](super::ExposureGuard) operations;
/// the hosting environment serializes calls, so per-call atomicity is the
/// only concurrency requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardState {
    /// Net exposure: issued and not yet retired.
    pub total_issued: u128,

    /// Upper bound on exposure; zero means unbounded.
    pub global_cap: u128,

    /// Cumulative issuance bound per window; zero disables rate limiting.
    pub rate_limit: u128,

    /// Window length in nanoseconds.
    pub rate_window_ns: u64,

    /// Start of the current window; `None` until first rate-limited issuance.
    pub window_start_ns: Option<u64>,

    /// Issuance accumulated inside the current window.
    pub window_accumulated: u128,

    /// When `true`, controller issuance is rejected; owner reconciliation
    /// still works.
    pub paused: bool,

    /// Role permitted to issue and retire.
    pub controller: Address,

    /// Role permitted to reconfigure and reconcile.
    pub owner: Address,
}

impl GuardState {
    /// Creates a fresh state with zero counters and unbounded limits.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::ZeroAddress`] if either role is the zero
    /// sentinel.
    pub fn new(controller: Address, owner: Address) -> Result<Self, GuardError> {
        if controller.is_zero() {
            return Err(GuardError::ZeroAddress {
                field: "controller",
            });
        }
        if owner.is_zero() {
            return Err(GuardError::ZeroAddress { field: "owner" });
        }

        Ok(Self {
            total_issued: 0,
            global_cap: 0,
            rate_limit: 0,
            rate_window_ns: 0,
            window_start_ns: None,
            window_accumulated: 0,
            paused: false,
            controller,
            owner,
        })
    }

    /// Sets the global cap (builder style).
    #[must_use]
    pub const fn with_cap(mut self, global_cap: u128) -> Self {
        self.global_cap = global_cap;
        self
    }

    /// Sets the rate limit and window length (builder style).
    #[must_use]
    pub const fn with_rate_limit(mut self, rate_limit: u128, rate_window_secs: u64) -> Self {
        self.rate_limit = rate_limit;
        self.rate_window_ns = rate_window_secs.saturating_mul(NANOS_PER_SEC);
        self
    }

    /// Sets the initial pause flag (builder style).
    #[must_use]
    pub const fn with_paused(mut self, paused: bool) -> Self {
        self.paused = paused;
        self
    }

    /// Remaining capacity under the cap, or `None` when unbounded.
    #[must_use]
    pub const fn remaining_capacity(&self) -> Option<u128> {
        if self.global_cap == 0 {
            None
        } else {
            Some(self.global_cap.saturating_sub(self.total_issued))
        }
    }

    /// Plans the window update for issuing `amount` at `now_ns` without
    /// mutating anything.
    ///
    /// Reset-on-idle semantics: a window that never started, or whose start
    /// lies at least one window length in the past, restarts at `now_ns`
    /// with zero accumulation before the bound is checked. The committed
    /// plan is applied only after the execution target succeeds, keeping
    /// failed issuance free of side effects.
    pub(super) fn plan_window(
        &self,
        amount: u128,
        now_ns: u64,
    ) -> Result<WindowPlan, GuardError> {
        if self.rate_limit == 0 {
            return Ok(WindowPlan {
                window_start_ns: self.window_start_ns,
                window_accumulated: self.window_accumulated,
            });
        }

        let (start, accumulated) = match self.window_start_ns {
            Some(start) if now_ns.saturating_sub(start) < self.rate_window_ns => {
                (start, self.window_accumulated)
            }
            // Never started, or idle past the window length: fresh window.
            _ => (now_ns, 0),
        };

        let next = accumulated
            .checked_add(amount)
            .ok_or(GuardError::InvalidAmount {
                reason: "window accumulation overflow",
            })?;
        if next > self.rate_limit {
            return Err(GuardError::RateLimitExceeded {
                requested: amount,
                accumulated,
                rate_limit: self.rate_limit,
            });
        }

        Ok(WindowPlan {
            window_start_ns: Some(start),
            window_accumulated: next,
        })
    }

    /// Exports a serializable snapshot for monitoring.
    #[must_use]
    pub fn snapshot(&self) -> GuardSnapshot {
        GuardSnapshot {
            total_issued: self.total_issued,
            global_cap: self.global_cap,
            remaining_capacity: self.remaining_capacity(),
            rate_limit: self.rate_limit,
            rate_window_secs: self.rate_window_ns / NANOS_PER_SEC,
            window_start_ns: self.window_start_ns,
            window_accumulated: self.window_accumulated,
            paused: self.paused,
            controller: self.controller,
            owner: self.owner,
        }
    }
}

/// Window values to commit after a successful issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct WindowPlan {
    pub(super) window_start_ns: Option<u64>,
    pub(super) window_accumulated: u128,
}

/// Point-in-time guard summary for off-chain monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardSnapshot {
    /// Net exposure.
    pub total_issued: u128,
    /// Configured cap; zero means unbounded.
    pub global_cap: u128,
    /// Capacity left under the cap, `None` when unbounded.
    pub remaining_capacity: Option<u128>,
    /// Per-window issuance bound; zero disables rate limiting.
    pub rate_limit: u128,
    /// Window length in seconds.
    pub rate_window_secs: u64,
    /// Current window start, if one is open.
    pub window_start_ns: Option<u64>,
    /// Issuance accumulated in the current window.
    pub window_accumulated: u128,
    /// Pause flag.
    pub paused: bool,
    /// Controller role address.
    pub controller: Address,
    /// Owner role address.
    pub owner: Address,
}
