//! Derivation and gated application of authorization plans.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::error::SyncError;
use super::plan::{AuthorizationPlan, ExistingSet, MassRevokeGate, compute_plan};
use crate::events::EventStore;
use crate::registry::{
    AuthorizationRegistry, AuthorizationSetReducer, Checkpoint, CheckpointStore,
    CheckpointStoreError, RegistryError,
};
use crate::timelock::{BeginOutcome, ChangeDescriptor, TimelockController, TimelockError};
use crate::types::Address;

/// Checkpoint projection name for the authorization set.
const PROJECTION: &str = "authorization-set";

/// What to do with one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemAction {
    /// Add the address to the allow-list.
    Authorize,
    /// Remove the address from the allow-list.
    Revoke,
}

/// What happened to one plan item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// The registry already had the desired status; nothing was submitted.
    Skipped,

    /// Dry run: the item would have been submitted.
    Planned,

    /// The change was newly initiated; the timelock delay is now running.
    Initiated,

    /// The change was finalized, submitted, and re-verified.
    Applied,

    /// The item could not proceed this run and should be retried later.
    Deferred {
        /// Why the item was deferred.
        reason: String,
    },

    /// The item failed; later items were still processed.
    Failed {
        /// Why the item failed.
        reason: String,
    },
}

/// Per-address entry in a [`SyncReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReport {
    /// The address the item concerns.
    pub address: Address,
    /// Whether the item authorizes or revokes.
    pub action: ItemAction,
    /// What happened.
    pub outcome: ItemOutcome,
}

/// Aggregated result of one apply run.
///
/// The caller inspects this to decide what to retry: `Deferred` items wait
/// for the timelock, `Failed` items need investigation, and a report of
/// nothing but `Skipped` means the registry already matches the desired
/// set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Whether this run was a dry run.
    pub dry_run: bool,
    /// One entry per plan item, in plan order.
    pub items: Vec<ItemReport>,
}

impl SyncReport {
    /// Number of items with the given outcome kind.
    fn count(&self, matches: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.items.iter().filter(|i| matches(&i.outcome)).count()
    }

    /// Items already correct on-chain.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Skipped))
    }

    /// Items finalized and verified this run.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Applied))
    }

    /// Items newly initiated or deferred to a later run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Initiated | ItemOutcome::Deferred { .. }))
    }

    /// Items that failed outright.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed { .. }))
    }

    /// Returns `true` when the registry already matched the desired set.
    #[must_use]
    pub fn converged(&self) -> bool {
        self.items
            .iter()
            .all(|i| matches!(i.outcome, ItemOutcome::Skipped))
    }
}

/// Reconciles the on-chain allow-list toward a desired set.
///
/// One synchronizer run is: derive the existing set from events, compute
/// the minimal plan, apply it item by item through the timelock. Runs are
/// resumable and convergent: items are independently re-verified against
/// the registry before and after mutation, so re-running (or running
/// concurrently with another instance) skips whatever is already correct
/// instead of corrupting state.
pub struct Synchronizer<'a, R> {
    registry: &'a mut R,
    timelock: &'a mut TimelockController,
    events: &'a EventStore,
    checkpoints: &'a CheckpointStore,
    authority: Address,
}

impl<'a, R: AuthorizationRegistry> Synchronizer<'a, R> {
    /// Wires a synchronizer to its collaborators.
    ///
    /// `authority` is the governance identity this synchronizer acts as; a
    /// registry recording a different governance aborts every run.
    pub fn new(
        registry: &'a mut R,
        timelock: &'a mut TimelockController,
        events: &'a EventStore,
        checkpoints: &'a CheckpointStore,
        authority: Address,
    ) -> Self {
        Self {
            registry,
            timelock,
            events,
            checkpoints,
            authority,
        }
    }

    /// Derives the existing allow-list by checkpointed event replay.
    ///
    /// Loads the newest checkpoint (a lost or corrupt checkpoint degrades
    /// to a full replay from genesis, since the event stream can always
    /// rebuild it), fetches events past the checkpoint cursor, mirrors them into
    /// the local store, folds them, and persists a fresh checkpoint.
    ///
    /// An unreadable event source fails with
    /// [`SyncError::DerivationUnavailable`]; it never comes back as an
    /// empty set.
    pub fn derive_existing(&mut self, now_ns: u64) -> Result<BTreeSet<Address>, SyncError> {
        self.derive_existing_from(None, now_ns)
    }

    /// Like [`derive_existing`](Self::derive_existing), but replays from an
    /// explicit checkpoint cursor instead of the newest persisted one.
    ///
    /// The nearest checkpoint at or before `from_cursor` seeds the fold;
    /// everything past it is re-fetched and re-folded. Useful when a stretch
    /// of the stream is suspect and an operator wants to re-derive from
    /// before it.
    pub fn derive_existing_from(
        &mut self,
        from_cursor: Option<u64>,
        now_ns: u64,
    ) -> Result<BTreeSet<Address>, SyncError> {
        let loaded = match from_cursor {
            Some(cursor) => self.checkpoints.load_at_or_before(PROJECTION, cursor),
            None => self.checkpoints.load_latest(PROJECTION),
        };
        let mut reducer = match loaded {
            Ok(checkpoint) => {
                match AuthorizationSetReducer::from_checkpoint_state(&checkpoint.state_data) {
                    Ok(reducer) => reducer,
                    Err(e) => {
                        tracing::warn!(error = %e, "corrupt checkpoint, replaying from genesis");
                        AuthorizationSetReducer::new()
                    }
                }
            }
            Err(CheckpointStoreError::NotFound { .. }) => AuthorizationSetReducer::new(),
            Err(e) => {
                tracing::warn!(error = %e, "checkpoint store unreadable, replaying from genesis");
                AuthorizationSetReducer::new()
            }
        };

        let from = reducer.cursor();
        let fetched = self.registry.fetch_events(from).map_err(|e| {
            SyncError::DerivationUnavailable {
                reason: e.to_string(),
            }
        })?;

        for event in &fetched {
            // The mirror is a local cache; failing to write it does not make
            // the freshly fetched stream any less authoritative.
            if let Err(e) = self.events.record_authorization(event, now_ns) {
                tracing::warn!(ordinal = event.ordinal, error = %e, "failed to mirror event");
            }
        }

        reducer
            .apply_all(&fetched)
            .map_err(|e| SyncError::DerivationUnavailable {
                reason: e.to_string(),
            })?;

        if reducer.cursor() > from {
            let checkpoint = Checkpoint::new(
                PROJECTION,
                reducer.cursor(),
                reducer.to_checkpoint_state(),
            );
            if let Err(e) = self.checkpoints.save(&checkpoint) {
                tracing::warn!(error = %e, "failed to persist checkpoint");
            }
        }

        tracing::debug!(
            members = reducer.authorized().len(),
            cursor = reducer.cursor(),
            "derived existing allow-list"
        );
        Ok(reducer.into_set())
    }

    /// One full reconciliation run: derive, plan, apply.
    ///
    /// A failed derivation aborts only when the gate requests mass
    /// revocation (revoking against an unknowable set is the one
    /// combination that must never proceed); otherwise the run continues
    /// with an unknown existing set, which plans authorizations only.
    pub fn run(
        &mut self,
        desired: &BTreeSet<Address>,
        gate: &MassRevokeGate,
        dry_run: bool,
        now_ns: u64,
    ) -> Result<SyncReport, SyncError> {
        self.check_governance()?;

        let existing = match self.derive_existing(now_ns) {
            Ok(set) => ExistingSet::Known(set),
            Err(SyncError::DerivationUnavailable { reason }) => {
                if gate.requested() {
                    tracing::warn!(%reason, "aborting: mass revocation against unknown set");
                    return Err(SyncError::DerivationUnavailable { reason });
                }
                tracing::warn!(%reason, "proceeding with unknown existing set");
                ExistingSet::Unknown
            }
            Err(other) => return Err(other),
        };

        let plan = compute_plan(desired, &existing, gate);
        self.apply(&plan, dry_run, now_ns)
    }

    /// Applies a plan item by item.
    ///
    /// The governance precondition is checked before any mutation. Each
    /// item's failure is caught, logged, and recorded; processing always
    /// continues to the remaining items. With `dry_run` set, nothing is
    /// submitted and would-be mutations are reported as
    /// [`ItemOutcome::Planned`].
    pub fn apply(
        &mut self,
        plan: &AuthorizationPlan,
        dry_run: bool,
        now_ns: u64,
    ) -> Result<SyncReport, SyncError> {
        self.check_governance()?;

        let mut report = SyncReport {
            dry_run,
            items: Vec::with_capacity(plan.len()),
        };

        let work = plan
            .to_authorize
            .iter()
            .map(|&a| (a, ItemAction::Authorize))
            .chain(plan.to_revoke.iter().map(|&a| (a, ItemAction::Revoke)));

        for (address, action) in work {
            let authorized = matches!(action, ItemAction::Authorize);
            let outcome = apply_item(
                &mut *self.registry,
                &mut *self.timelock,
                address,
                authorized,
                dry_run,
                now_ns,
            );

            match &outcome {
                ItemOutcome::Failed { reason } => {
                    tracing::warn!(%address, ?action, %reason, "plan item failed");
                }
                other => {
                    tracing::info!(%address, ?action, outcome = ?other, "plan item processed");
                }
            }
            report.items.push(ItemReport {
                address,
                action,
                outcome,
            });
        }

        Ok(report)
    }

    fn check_governance(&self) -> Result<(), SyncError> {
        let actual = self.registry.governance()?;
        if actual != self.authority {
            return Err(SyncError::GovernanceMismatch {
                expected: self.authority,
                actual,
            });
        }
        Ok(())
    }
}

/// Processes one plan item; never panics, never aborts the batch.
fn apply_item<R: AuthorizationRegistry>(
    registry: &mut R,
    timelock: &mut TimelockController,
    address: Address,
    authorized: bool,
    dry_run: bool,
    now_ns: u64,
) -> ItemOutcome {
    let current = match registry.is_authorized(address) {
        Ok(current) => current,
        Err(e) => {
            return ItemOutcome::Failed {
                reason: format!("status read failed: {e}"),
            };
        }
    };
    if current == authorized {
        return ItemOutcome::Skipped;
    }
    if dry_run {
        return ItemOutcome::Planned;
    }

    let change = ChangeDescriptor::SetAuthorized {
        address,
        authorized,
    };
    let begun = match timelock.begin(change, now_ns) {
        Ok(outcome) => outcome,
        Err(TimelockError::AlreadyInitialized { pending }) => {
            return ItemOutcome::Deferred {
                reason: format!("another change is pending: {pending}"),
            };
        }
        Err(e) => {
            return ItemOutcome::Failed {
                reason: format!("begin failed: {e}"),
            };
        }
    };

    match timelock.finalize_with(now_ns, |c| apply_change(registry, c)) {
        Ok(_) => match registry.is_authorized(address) {
            Ok(now_authorized) if now_authorized == authorized => ItemOutcome::Applied,
            Ok(_) => ItemOutcome::Failed {
                reason: "post-apply verification mismatch".to_string(),
            },
            Err(e) => ItemOutcome::Failed {
                reason: format!("post-apply verification failed: {e}"),
            },
        },
        Err(TimelockError::TimelockNotElapsed { remaining_ns }) => match begun {
            BeginOutcome::Started => ItemOutcome::Initiated,
            BeginOutcome::AlreadyPending => ItemOutcome::Deferred {
                reason: format!("timelock not elapsed: {remaining_ns}ns remaining"),
            },
        },
        Err(e) => ItemOutcome::Failed {
            reason: format!("finalize failed: {e}"),
        },
    }
}

fn apply_change<R: AuthorizationRegistry>(
    registry: &mut R,
    change: &ChangeDescriptor,
) -> Result<(), RegistryError> {
    match change {
        ChangeDescriptor::SetAuthorized {
            address,
            authorized,
        } => registry.set_authorized(*address, *authorized),
        ChangeDescriptor::TransferGovernance { new_authority } => {
            registry.transfer_governance(*new_authority)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;
    use crate::types::ADDRESS_LEN;

    const SEC: u64 = 1_000_000_000;

    fn addr(byte: u8) -> Address {
        Address::new([byte; ADDRESS_LEN])
    }

    fn authority() -> Address {
        addr(0xee)
    }

    fn desired(bytes: &[u8]) -> BTreeSet<Address> {
        bytes.iter().map(|&b| addr(b)).collect()
    }

    struct Fixture {
        registry: MemoryRegistry,
        timelock: TimelockController,
        events: EventStore,
        checkpoints: CheckpointStore,
    }

    impl Fixture {
        fn new(delay_ns: u64) -> Self {
            Self {
                registry: MemoryRegistry::new(authority()),
                timelock: TimelockController::ephemeral(delay_ns),
                events: EventStore::in_memory().unwrap(),
                checkpoints: CheckpointStore::in_memory().unwrap(),
            }
        }

        fn sync(&mut self) -> Synchronizer<'_, MemoryRegistry> {
            Synchronizer::new(
                &mut self.registry,
                &mut self.timelock,
                &self.events,
                &self.checkpoints,
                authority(),
            )
        }
    }

    mod derivation {
        use super::*;

        #[test]
        fn folds_fetched_events_and_checkpoints() {
            let mut fx = Fixture::new(0);
            fx.registry.seed(addr(1), true);
            fx.registry.seed(addr(2), true);
            fx.registry.seed(addr(1), false);

            let set = fx.sync().derive_existing(0).unwrap();
            assert_eq!(set, desired(&[2]));

            // A checkpoint at the stream head was persisted.
            let checkpoint = fx.checkpoints.load_latest("authorization-set").unwrap();
            assert_eq!(checkpoint.cursor, 3);
        }

        #[test]
        fn second_derivation_replays_only_the_suffix() {
            let mut fx = Fixture::new(0);
            fx.registry.seed(addr(1), true);
            fx.sync().derive_existing(0).unwrap();

            fx.registry.seed(addr(2), true);
            let set = fx.sync().derive_existing(0).unwrap();
            assert_eq!(set, desired(&[1, 2]));

            // Mirrored events cover the whole stream despite the split.
            let mirrored = fx.events.read_authorizations_after(0).unwrap();
            assert_eq!(mirrored.len(), 2);
        }

        #[test]
        fn unreadable_source_is_unavailable_not_empty() {
            let mut fx = Fixture::new(0);
            fx.registry.seed(addr(1), true);
            fx.registry.set_fetch_unavailable(true);

            let err = fx.sync().derive_existing(0).unwrap_err();
            assert!(matches!(err, SyncError::DerivationUnavailable { .. }));
        }

        #[test]
        fn explicit_checkpoint_replays_forward_from_it() {
            let mut fx = Fixture::new(0);
            fx.registry.seed(addr(1), true);
            fx.sync().derive_existing(0).unwrap(); // checkpoint at cursor 1

            fx.registry.seed(addr(2), true);
            fx.sync().derive_existing(0).unwrap(); // checkpoint at cursor 2
            fx.registry.seed(addr(2), false);

            // Replaying from the cursor-1 checkpoint refolds everything
            // after it, landing on the same head state.
            let set = fx.sync().derive_existing_from(Some(1), 0).unwrap();
            assert_eq!(set, desired(&[1]));
        }

        #[test]
        fn corrupt_checkpoint_degrades_to_genesis_replay() {
            let mut fx = Fixture::new(0);
            fx.registry.seed(addr(1), true);
            fx.checkpoints
                .save(&Checkpoint::new("authorization-set", 9, "not json".to_string()))
                .unwrap();

            let set = fx.sync().derive_existing(0).unwrap();
            assert_eq!(set, desired(&[1]));
        }
    }

    mod application {
        use super::*;

        #[test]
        fn applies_diff_in_one_pass_with_zero_delay() {
            let mut fx = Fixture::new(0);
            fx.registry.seed(addr(0xb), true);
            fx.registry.seed(addr(0xc), true);

            let report = fx
                .sync()
                .run(&desired(&[0xa, 0xb]), &MassRevokeGate::disabled(), false, 0)
                .unwrap();

            assert_eq!(report.applied(), 2);
            assert_eq!(report.failed(), 0);
            assert!(fx.registry.is_authorized(addr(0xa)).unwrap());
            assert!(fx.registry.is_authorized(addr(0xb)).unwrap());
            assert!(!fx.registry.is_authorized(addr(0xc)).unwrap());
        }

        #[test]
        fn converged_state_issues_zero_mutations() {
            let mut fx = Fixture::new(0);
            fx.registry.seed(addr(1), true);
            fx.registry.seed(addr(2), true);
            fx.registry.reset_mutation_count();

            let report = fx
                .sync()
                .run(&desired(&[1, 2]), &MassRevokeGate::disabled(), false, 0)
                .unwrap();

            assert!(report.converged());
            assert_eq!(fx.registry.mutation_count(), 0);
        }

        #[test]
        fn dry_run_submits_nothing() {
            let mut fx = Fixture::new(0);
            fx.registry.seed(addr(2), true);

            let report = fx
                .sync()
                .run(&desired(&[1]), &MassRevokeGate::disabled(), true, 0)
                .unwrap();

            assert!(report.dry_run);
            assert_eq!(report.items.len(), 2);
            assert!(report
                .items
                .iter()
                .all(|i| matches!(i.outcome, ItemOutcome::Planned)));
            assert_eq!(fx.registry.mutation_count(), 0);
            // The timelock was never touched either.
            assert_eq!(
                fx.timelock.state(),
                &crate::timelock::TimelockState::Idle
            );
        }

        #[test]
        fn governance_mismatch_aborts_before_any_mutation() {
            let mut fx = Fixture::new(0);
            fx.registry = MemoryRegistry::new(addr(0x99));

            let err = fx
                .sync()
                .run(&desired(&[1]), &MassRevokeGate::disabled(), false, 0)
                .unwrap_err();

            assert!(matches!(err, SyncError::GovernanceMismatch { .. }));
            assert_eq!(fx.registry.mutation_count(), 0);
        }

        #[test]
        fn nonzero_delay_initiates_then_applies_across_runs() {
            let mut fx = Fixture::new(60 * SEC);

            let first = fx
                .sync()
                .run(&desired(&[1]), &MassRevokeGate::disabled(), false, 0)
                .unwrap();
            assert_eq!(first.items[0].outcome, ItemOutcome::Initiated);
            assert!(!fx.registry.is_authorized(addr(1)).unwrap());

            // Too early: deferred, timer not reset.
            let early = fx
                .sync()
                .run(&desired(&[1]), &MassRevokeGate::disabled(), false, 30 * SEC)
                .unwrap();
            assert!(matches!(
                early.items[0].outcome,
                ItemOutcome::Deferred { .. }
            ));

            let done = fx
                .sync()
                .run(&desired(&[1]), &MassRevokeGate::disabled(), false, 60 * SEC)
                .unwrap();
            assert_eq!(done.items[0].outcome, ItemOutcome::Applied);
            assert!(fx.registry.is_authorized(addr(1)).unwrap());
        }

        #[test]
        fn failed_item_does_not_abort_the_batch() {
            let mut fx = Fixture::new(0);
            fx.registry.set_mutations_failing(true);

            let report = fx
                .sync()
                .run(&desired(&[1, 2]), &MassRevokeGate::disabled(), false, 0)
                .unwrap();

            // The first item's submission fails and leaves its change
            // pending in the timelock; the second is deferred behind it.
            // Both are recorded, neither aborted the run.
            assert_eq!(report.items.len(), 2);
            assert!(matches!(
                report.items[0].outcome,
                ItemOutcome::Failed { .. }
            ));
            assert!(matches!(
                report.items[1].outcome,
                ItemOutcome::Deferred { .. }
            ));

            // Once submissions recover, re-running drains the backlog.
            fx.registry.set_mutations_failing(false);
            let retry = fx
                .sync()
                .run(&desired(&[1, 2]), &MassRevokeGate::disabled(), false, 0)
                .unwrap();
            assert_eq!(retry.applied(), 2);
        }

        #[test]
        fn mass_revoke_against_unavailable_derivation_aborts() {
            let mut fx = Fixture::new(0);
            fx.registry.seed(addr(1), true);
            fx.registry.set_fetch_unavailable(true);

            let gate = MassRevokeGate {
                allow: true,
                confirmation: Some(crate::sync::MASS_REVOKE_CONFIRMATION.to_string()),
            };
            let err = fx
                .sync()
                .run(&BTreeSet::new(), &gate, false, 0)
                .unwrap_err();
            assert!(matches!(err, SyncError::DerivationUnavailable { .. }));
            assert_eq!(fx.registry.mutation_count(), 0);
        }

        #[test]
        fn unavailable_derivation_without_mass_revoke_authorizes_only() {
            let mut fx = Fixture::new(0);
            fx.registry.seed(addr(9), true);
            fx.registry.set_fetch_unavailable(true);

            let report = fx
                .sync()
                .run(&desired(&[1]), &MassRevokeGate::disabled(), false, 0)
                .unwrap();

            assert_eq!(report.applied(), 1);
            // The unknown member was not revoked.
            assert!(fx.registry.is_authorized(addr(9)).unwrap());
        }

        #[test]
        fn confirmed_mass_revoke_empties_the_registry() {
            let mut fx = Fixture::new(0);
            fx.registry.seed(addr(1), true);
            fx.registry.seed(addr(2), true);

            let gate = MassRevokeGate {
                allow: true,
                confirmation: Some(crate::sync::MASS_REVOKE_CONFIRMATION.to_string()),
            };
            let report = fx.sync().run(&BTreeSet::new(), &gate, false, 0).unwrap();

            assert_eq!(report.applied(), 2);
            assert!(fx.registry.authorized().is_empty());
        }
    }
}
