//! Plan computation: the minimal diff between desired and existing sets.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::Address;

/// The confirmation token that must accompany a mass revocation.
///
/// An empty desired set against a known, non-empty existing set revokes
/// everyone. That is occasionally intended (decommissioning) but more often
/// a truncated config file, so it requires both the allow flag and this
/// exact token before any revocation is planned.
pub const MASS_REVOKE_CONFIRMATION: &str = "revoke-all-authorizations";

/// The event-derived allow-list, or the fact that it could not be derived.
///
/// `Unknown` is distinct from `Known(empty)` by design: an unreadable event
/// source means we do not know who is authorized, and every planning rule
/// biases toward doing nothing rather than guessing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExistingSet {
    /// Derivation succeeded; this is the folded set.
    Known(BTreeSet<Address>),
    /// Derivation failed; membership is unknowable right now.
    Unknown,
}

impl ExistingSet {
    /// Convenience constructor from an iterator of members.
    pub fn known(members: impl IntoIterator<Item = Address>) -> Self {
        Self::Known(members.into_iter().collect())
    }
}

/// Operator intent gate for mass revocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MassRevokeGate {
    /// The allow flag from configuration.
    pub allow: bool,
    /// The operator-supplied confirmation token.
    pub confirmation: Option<String>,
}

impl MassRevokeGate {
    /// A gate that permits nothing.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            allow: false,
            confirmation: None,
        }
    }

    /// Returns `true` when mass revocation was requested at all (flag set),
    /// confirmed or not.
    #[must_use]
    pub const fn requested(&self) -> bool {
        self.allow
    }

    /// Returns `true` only when the flag is set AND the exact confirmation
    /// token is present.
    #[must_use]
    pub fn confirmed(&self) -> bool {
        self.allow && self.confirmation.as_deref() == Some(MASS_REVOKE_CONFIRMATION)
    }
}

/// The minimal authorize/revoke diff for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationPlan {
    /// Addresses to add to the allow-list.
    pub to_authorize: BTreeSet<Address>,
    /// Addresses to remove from the allow-list.
    pub to_revoke: BTreeSet<Address>,
}

impl AuthorizationPlan {
    /// Returns `true` when the plan changes nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.to_authorize.is_empty() && self.to_revoke.is_empty()
    }

    /// Total number of planned items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.to_authorize.len() + self.to_revoke.len()
    }

    /// Returns `true` when the plan has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.is_noop()
    }
}

/// Computes the minimal plan moving `existing` to `desired`.
///
/// Every ambiguous input biases toward the empty plan:
///
/// - unknown existing set + empty desired set → no-op (never guess);
/// - unknown existing set + non-empty desired set → authorize-only (the
///   revoke side is not computable; apply's idempotent skip makes the
///   authorize side safe);
/// - empty desired set + known non-empty existing set → no-op unless the
///   mass-revoke gate is fully confirmed, in which case everyone is revoked.
///
/// A non-empty desired set demonstrates explicit intent, so revocations are
/// plain set difference with no extra gate.
#[must_use]
pub fn compute_plan(
    desired: &BTreeSet<Address>,
    existing: &ExistingSet,
    gate: &MassRevokeGate,
) -> AuthorizationPlan {
    if desired.is_empty() {
        return match existing {
            ExistingSet::Unknown => AuthorizationPlan::default(),
            ExistingSet::Known(current) if current.is_empty() => AuthorizationPlan::default(),
            ExistingSet::Known(current) => {
                if gate.confirmed() {
                    tracing::warn!(
                        count = current.len(),
                        "mass revocation confirmed: planning full lockout"
                    );
                    AuthorizationPlan {
                        to_authorize: BTreeSet::new(),
                        to_revoke: current.clone(),
                    }
                } else {
                    tracing::warn!(
                        count = current.len(),
                        "empty desired set without confirmed mass-revoke gate: planning nothing"
                    );
                    AuthorizationPlan::default()
                }
            }
        };
    }

    match existing {
        ExistingSet::Known(current) => AuthorizationPlan {
            to_authorize: desired.difference(current).copied().collect(),
            to_revoke: current.difference(desired).copied().collect(),
        },
        ExistingSet::Unknown => {
            tracing::warn!(
                "existing set unknown: planning authorizations only, no revocations"
            );
            AuthorizationPlan {
                to_authorize: desired.clone(),
                to_revoke: BTreeSet::new(),
            }
        }
    }
}
