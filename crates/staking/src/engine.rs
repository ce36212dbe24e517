// staking/src/engine.rs

use crate::active_set::ActiveSet;
use crate::events::StakingEvent;
use crate::ledger::{DelegationLedger, DelegationView};
use crate::params::ChainParams;
use crate::slashing::{SlashOutcome, SlashingPolicy};
use crate::validator::{Validator, ValidatorRegistry};
use crate::{StakingError, StakingResult};
use chain_core::{Address, Amount, BlockNumber, EpochClock, EpochNumber};
use std::collections::BTreeMap;

/// Read-only registry surface consumed by collaborators (the pool front-end,
/// downstream indexers). Caller identity is always an explicit argument.
pub trait ValidatorDirectory {
    fn is_validator(&self, account: &Address) -> bool;
    fn is_validator_active(&self, account: &Address) -> bool;
    fn current_epoch(&self) -> EpochNumber;
}

/// The PoSA validator economics engine.
///
/// Owns all registry, ledger, and active-set state and sequences every
/// operation. Each call is an atomic transition: it either completes or fails
/// without partial writes. The current epoch is derived from the height
/// counter on every call and never cached.
pub struct Staking {
    params: ChainParams,
    clock: EpochClock,
    registry: ValidatorRegistry,
    ledger: DelegationLedger,
    active_set: ActiveSet,
    height: BlockNumber,
    /// Rewards forfeited through misdemeanor slashes, readable by the
    /// treasury collaborator
    total_forfeited: Amount,
    events: Vec<StakingEvent>,
}

impl Staking {
    pub fn new(params: ChainParams) -> StakingResult<Self> {
        params.validate()?;
        let clock = EpochClock::new(params.epoch_block_interval)?;
        let active_set = ActiveSet::new(params.active_validators_length as usize);
        Ok(Self {
            params,
            clock,
            registry: ValidatorRegistry::new(),
            ledger: DelegationLedger::new(),
            active_set,
            height: 0,
            total_forfeited: Amount::zero(),
            events: Vec::new(),
        })
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn height(&self) -> BlockNumber {
        self.height
    }

    pub fn current_epoch(&self) -> EpochNumber {
        self.clock.epoch_at(self.height)
    }

    fn next_epoch(&self) -> EpochNumber {
        self.current_epoch() + 1
    }

    /// Advance the raw height counter. Heights never move backwards.
    pub fn set_height(&mut self, height: BlockNumber) -> StakingResult<()> {
        if height < self.height {
            return Err(StakingError::InvalidState(format!(
                "height must not decrease ({} -> {})",
                self.height, height
            )));
        }
        if self.clock.crosses_boundary(self.height, height) {
            tracing::info!(
                "entering epoch {} at height {}",
                self.clock.epoch_at(height),
                height
            );
        }
        self.height = height;
        Ok(())
    }

    /// Structured events emitted since the last drain
    pub fn drain_events(&mut self) -> Vec<StakingEvent> {
        std::mem::take(&mut self.events)
    }

    /// Add a validator with no stake. Privileged: routed through governance,
    /// which is trusted to have authorized the call.
    pub fn add_validator(&mut self, account: Address) -> StakingResult<()> {
        let epoch = self.current_epoch();
        self.registry
            .insert(Validator::new(account, account, 0, epoch), epoch)?;
        self.update_active_set(&account);
        self.events
            .push(StakingEvent::ValidatorAdded { validator: account });
        tracing::info!("validator {} added", account.to_hex());
        Ok(())
    }

    /// Remove a validator. Privileged. Snapshot history survives so committed
    /// epochs stay claimable by delegators.
    pub fn remove_validator(&mut self, account: &Address) -> StakingResult<()> {
        self.registry.remove(account)?;
        if self.active_set.remove(account) {
            self.refill_active_set();
        }
        self.events
            .push(StakingEvent::ValidatorRemoved { validator: *account });
        tracing::info!("validator {} removed", account.to_hex());
        Ok(())
    }

    /// Self-service registration bundling creation with the initial
    /// self-delegation.
    pub fn register_validator(
        &mut self,
        account: Address,
        owner: Address,
        commission_rate: u16,
        self_stake: Amount,
    ) -> StakingResult<()> {
        if self.registry.contains(&account) {
            return Err(StakingError::InvalidState(format!(
                "validator {} already exists",
                account.to_hex()
            )));
        }
        self.check_commission_rate(commission_rate)?;
        self.check_delegation_amount(&self_stake)?;
        let epoch = self.current_epoch();
        self.registry
            .insert(Validator::new(account, owner, commission_rate, epoch), epoch)?;
        self.events
            .push(StakingEvent::ValidatorAdded { validator: account });
        tracing::info!(
            "validator {} registered with commission {} bps",
            account.to_hex(),
            commission_rate
        );
        self.delegate(owner, account, self_stake)
    }

    pub fn change_validator_owner(
        &mut self,
        account: &Address,
        caller: &Address,
        new_owner: Address,
    ) -> StakingResult<()> {
        let validator = self.registry.require_mut(account)?;
        if validator.owner != *caller {
            return Err(StakingError::Unauthorized(format!(
                "{} is not the owner of validator {}",
                caller.to_hex(),
                account.to_hex()
            )));
        }
        validator.owner = new_owner;
        self.events.push(StakingEvent::ValidatorOwnerChanged {
            validator: *account,
            owner: new_owner,
        });
        Ok(())
    }

    /// Change the commission rate, effective from the next epoch so the
    /// current epoch's split stays fixed.
    pub fn change_validator_commission_rate(
        &mut self,
        account: &Address,
        caller: &Address,
        rate_bps: u16,
    ) -> StakingResult<()> {
        self.check_commission_rate(rate_bps)?;
        let validator = self.registry.require(account)?;
        if validator.owner != *caller {
            return Err(StakingError::Unauthorized(format!(
                "{} is not the owner of validator {}",
                caller.to_hex(),
                account.to_hex()
            )));
        }
        let next = self.next_epoch();
        self.registry.touch_snapshot(account, next).commission_rate = rate_bps;
        let validator = self.registry.require_mut(account)?;
        validator.commission_rate = rate_bps;
        validator.changed_at_epoch = next;
        self.events.push(StakingEvent::CommissionRateChanged {
            validator: *account,
            rate_bps,
            epoch: next,
        });
        Ok(())
    }

    /// Delegate stake to a validator, effective from the next epoch.
    pub fn delegate(
        &mut self,
        delegator: Address,
        validator: Address,
        amount: Amount,
    ) -> StakingResult<()> {
        let record = self.registry.require(&validator)?;
        if record.is_jailed() {
            return Err(StakingError::InvalidState(format!(
                "validator {} is jailed",
                validator.to_hex()
            )));
        }
        self.check_delegation_amount(&amount)?;
        let next = self.next_epoch();
        self.registry.increase_stake(&validator, &amount, next)?;
        self.ledger
            .entry(&validator, &delegator)
            .record_delegate(&amount, next);
        self.update_active_set(&validator);
        self.events.push(StakingEvent::Delegated {
            validator,
            delegator,
            amount,
            epoch: next,
        });
        Ok(())
    }

    /// Reduce a delegation; the amount matures after the undelegate period.
    pub fn undelegate(
        &mut self,
        delegator: Address,
        validator: Address,
        amount: Amount,
    ) -> StakingResult<()> {
        self.registry.require(&validator)?;
        self.check_unstake_amount(&amount)?;
        let epoch = self.current_epoch();
        let next = epoch + 1;
        let unlock = epoch + self.params.undelegate_period + 1;
        let entry = self.ledger.get_mut(&validator, &delegator).ok_or_else(|| {
            StakingError::InsufficientBalance {
                requested: amount.clone(),
                available: Amount::zero(),
            }
        })?;
        entry.record_undelegate(&amount, next, unlock)?;
        self.registry.decrease_stake(&validator, &amount, next)?;
        self.update_active_set(&validator);
        self.events.push(StakingEvent::Undelegated {
            validator,
            delegator,
            amount,
            epoch: next,
        });
        Ok(())
    }

    /// Credit rewards to the validator's pool for the current epoch. The
    /// amount becomes claimable only once this epoch has closed.
    pub fn deposit(&mut self, validator: Address, amount: Amount) -> StakingResult<()> {
        self.registry.require(&validator)?;
        if amount.is_zero() {
            return Err(StakingError::InvalidAmount(
                "deposit amount must be positive".into(),
            ));
        }
        let epoch = self.current_epoch();
        let snapshot = self.registry.touch_snapshot(&validator, epoch);
        snapshot.total_rewards = snapshot
            .total_rewards
            .checked_add(&amount)
            .ok_or_else(|| StakingError::InvalidState("reward overflow".into()))?;
        self.events.push(StakingEvent::Deposited {
            validator,
            amount,
            epoch,
        });
        Ok(())
    }

    /// Commission accumulated across committed epochs since the owner's last
    /// claim. Pure read.
    pub fn get_validator_fee(&self, validator: &Address) -> StakingResult<Amount> {
        let record = self.registry.require(validator)?;
        let to = self.current_epoch();
        let mut fee = Amount::zero();
        if let Some(book) = self.registry.snapshot_book(validator) {
            for (_, snapshot) in book.range(record.claimed_at_epoch..to) {
                fee = fee + snapshot.validator_share();
            }
        }
        Ok(fee)
    }

    /// Rewards claimable by a delegator across committed epochs. Pure read;
    /// zero for unknown delegations.
    pub fn get_delegator_fee(&self, validator: &Address, delegator: &Address) -> Amount {
        let Some(entry) = self.ledger.get(validator, delegator) else {
            return Amount::zero();
        };
        let empty = BTreeMap::new();
        let book = self.registry.snapshot_book(validator).unwrap_or(&empty);
        entry.fee_owed(book, self.current_epoch())
    }

    /// Matured, unclaimed undelegated principal. Pure read.
    pub fn get_pending_undelegates(&self, validator: &Address, delegator: &Address) -> Amount {
        self.ledger
            .get(validator, delegator)
            .map(|entry| entry.matured_undelegates(self.current_epoch()))
            .unwrap_or_else(Amount::zero)
    }

    /// Pay out the owner's commission and advance the claim checkpoint.
    pub fn claim_validator_fee(
        &mut self,
        validator: &Address,
        caller: &Address,
    ) -> StakingResult<Amount> {
        let record = self.registry.require(validator)?;
        if record.owner != *caller {
            return Err(StakingError::Unauthorized(format!(
                "{} is not the owner of validator {}",
                caller.to_hex(),
                validator.to_hex()
            )));
        }
        let amount = self.get_validator_fee(validator)?;
        let epoch = self.current_epoch();
        self.registry.require_mut(validator)?.claimed_at_epoch = epoch;
        self.events.push(StakingEvent::ValidatorFeeClaimed {
            validator: *validator,
            owner: *caller,
            amount: amount.clone(),
            epoch,
        });
        Ok(amount)
    }

    /// Pay out a delegator's committed rewards plus matured undelegates and
    /// advance the checkpoint. Claiming with nothing owed pays zero.
    pub fn claim_delegator_fee(
        &mut self,
        validator: &Address,
        delegator: &Address,
    ) -> StakingResult<Amount> {
        let epoch = self.current_epoch();
        let mut payout = self.get_delegator_fee(validator, delegator);
        if let Some(entry) = self.ledger.get_mut(validator, delegator) {
            payout = payout + entry.take_matured_undelegates(epoch);
            entry.settle_to(epoch);
        }
        self.events.push(StakingEvent::DelegatorFeeClaimed {
            validator: *validator,
            delegator: *delegator,
            amount: payout.clone(),
            epoch,
        });
        Ok(payout)
    }

    /// Convert the claimable fee back into delegation without a transfer.
    /// Only whole staking units are restaked; the remainder stays claimable
    /// as dust. Returns the restaked amount.
    pub fn redelegate_delegator_fee(
        &mut self,
        validator: &Address,
        delegator: &Address,
    ) -> StakingResult<Amount> {
        let record = self.registry.require(validator)?;
        if record.is_jailed() {
            return Err(StakingError::InvalidState(format!(
                "validator {} is jailed",
                validator.to_hex()
            )));
        }
        let claimable = self.get_delegator_fee(validator, delegator);
        let stakeable = claimable.floor_to_multiple(&self.params.min_staking_unit);
        if stakeable.is_zero() {
            return Err(StakingError::InvalidAmount(
                "claimable fee is below one staking unit".into(),
            ));
        }
        let dust = claimable.clone() - stakeable.clone();
        let epoch = self.current_epoch();
        let next = epoch + 1;
        let entry = self.ledger.entry(validator, delegator);
        entry.settle_to(epoch);
        entry.credit_dust(dust.clone());
        entry.record_delegate(&stakeable, next);
        self.registry.increase_stake(validator, &stakeable, next)?;
        self.update_active_set(validator);
        self.events.push(StakingEvent::DelegatorFeeClaimed {
            validator: *validator,
            delegator: *delegator,
            amount: claimable,
            epoch,
        });
        self.events.push(StakingEvent::Redelegated {
            validator: *validator,
            delegator: *delegator,
            amount: stakeable.clone(),
            dust,
            epoch: next,
        });
        Ok(stakeable)
    }

    /// Record one misbehavior report against a validator.
    pub fn slash(&mut self, validator: &Address) -> StakingResult<()> {
        let epoch = self.current_epoch();
        let policy = SlashingPolicy::from_params(&self.params);
        let outcome = self.registry.apply_slash(validator, &policy, epoch)?;
        let slashes_count = self
            .registry
            .get(validator)
            .map(|v| v.slashes_count)
            .unwrap_or(0);
        self.events.push(StakingEvent::Slashed {
            validator: *validator,
            slashes_count,
            epoch,
        });
        match outcome {
            SlashOutcome::Jailed { until_epoch } => {
                if self.active_set.remove(validator) {
                    self.refill_active_set();
                }
                self.events.push(StakingEvent::Jailed {
                    validator: *validator,
                    until_epoch,
                });
                tracing::warn!(
                    "validator {} jailed until epoch {}",
                    validator.to_hex(),
                    until_epoch
                );
            }
            SlashOutcome::RewardsForfeited { amount } => {
                tracing::warn!(
                    "validator {} forfeited {} of epoch {} rewards",
                    validator.to_hex(),
                    amount,
                    epoch
                );
                self.total_forfeited = self.total_forfeited.clone() + amount;
            }
            SlashOutcome::Counted { .. } => {}
        }
        Ok(())
    }

    /// Release a jailed validator. Owner-only; the validator re-enters the
    /// active set lazily on its next stake change.
    pub fn release_validator_from_jail(
        &mut self,
        validator: &Address,
        caller: &Address,
    ) -> StakingResult<()> {
        let epoch = self.current_epoch();
        let policy = SlashingPolicy::from_params(&self.params);
        let record = self.registry.require_mut(validator)?;
        if record.owner != *caller {
            return Err(StakingError::Unauthorized(format!(
                "{} is not the owner of validator {}",
                caller.to_hex(),
                validator.to_hex()
            )));
        }
        policy.release(record, epoch)?;
        self.events.push(StakingEvent::Released {
            validator: *validator,
            epoch,
        });
        tracing::info!("validator {} released from jail", validator.to_hex());
        Ok(())
    }

    pub fn validator(&self, account: &Address) -> Option<&Validator> {
        self.registry.get(account)
    }

    /// Active-set membership, highest stake first
    pub fn active_validators(&self) -> &[Address] {
        self.active_set.as_slice()
    }

    pub fn get_validator_delegation(
        &self,
        validator: &Address,
        delegator: &Address,
    ) -> DelegationView {
        self.ledger
            .get(validator, delegator)
            .map(|entry| entry.view())
            .unwrap_or(DelegationView {
                delegated_amount: Amount::zero(),
                pending_undelegate: Amount::zero(),
                unstake_blocked_before: 0,
            })
    }

    pub fn total_forfeited(&self) -> &Amount {
        &self.total_forfeited
    }

    /// Re-verify the ledger/registry invariants. Intended for tests and
    /// debugging assertions after operation sequences.
    pub fn verify_invariants(&self) -> StakingResult<()> {
        for validator in self.registry.iter_ordered() {
            let sum = self.ledger.total_delegated_to(&validator.account);
            if sum != validator.total_delegated {
                return Err(StakingError::InvalidState(format!(
                    "delegation sum {} does not match total {} for validator {}",
                    sum,
                    validator.total_delegated,
                    validator.account.to_hex()
                )));
            }
        }
        if self.active_set.len() > self.active_set.capacity() {
            return Err(StakingError::InvalidState(
                "active set exceeds its capacity".into(),
            ));
        }
        Ok(())
    }

    fn check_commission_rate(&self, rate_bps: u16) -> StakingResult<()> {
        if rate_bps > self.params.max_commission_rate {
            return Err(StakingError::BadDistribution(format!(
                "commission rate {} exceeds {} bps",
                rate_bps, self.params.max_commission_rate
            )));
        }
        Ok(())
    }

    fn check_delegation_amount(&self, amount: &Amount) -> StakingResult<()> {
        if amount.is_zero() {
            return Err(StakingError::InvalidAmount(
                "amount must be positive".into(),
            ));
        }
        if *amount < self.params.min_staking_amount {
            return Err(StakingError::InvalidAmount(format!(
                "amount {} is below the minimum staking amount {}",
                amount, self.params.min_staking_amount
            )));
        }
        self.check_unit_multiple(amount)
    }

    fn check_unstake_amount(&self, amount: &Amount) -> StakingResult<()> {
        if amount.is_zero() {
            return Err(StakingError::InvalidAmount(
                "amount must be positive".into(),
            ));
        }
        self.check_unit_multiple(amount)
    }

    fn check_unit_multiple(&self, amount: &Amount) -> StakingResult<()> {
        if !amount.is_multiple_of(&self.params.min_staking_unit) {
            return Err(StakingError::InvalidAmount(format!(
                "amount {} is not a multiple of the staking unit {}",
                amount, self.params.min_staking_unit
            )));
        }
        Ok(())
    }

    fn update_active_set(&mut self, account: &Address) {
        let eligible = self
            .registry
            .get(account)
            .map(|v| v.is_active())
            .unwrap_or(false);
        if !eligible {
            if self.active_set.remove(account) {
                self.refill_active_set();
            }
            return;
        }
        let registry = &self.registry;
        self.active_set
            .on_stake_changed(*account, |a| registry.stake_of(a));
    }

    /// Promote the best-staked eligible outsiders after an eviction.
    fn refill_active_set(&mut self) {
        while self.active_set.len() < self.active_set.capacity() {
            let mut best: Option<(Address, Amount)> = None;
            for validator in self.registry.iter_ordered() {
                if !validator.is_active() || self.active_set.is_member(&validator.account) {
                    continue;
                }
                let better = match &best {
                    None => true,
                    Some((_, stake)) => validator.total_delegated > *stake,
                };
                if better {
                    best = Some((validator.account, validator.total_delegated.clone()));
                }
            }
            match best {
                Some((account, _)) => {
                    let registry = &self.registry;
                    self.active_set
                        .on_stake_changed(account, |a| registry.stake_of(a));
                }
                None => break,
            }
        }
    }
}

impl ValidatorDirectory for Staking {
    fn is_validator(&self, account: &Address) -> bool {
        self.registry.contains(account)
    }

    fn is_validator_active(&self, account: &Address) -> bool {
        self.registry
            .get(account)
            .map(|v| v.is_active())
            .unwrap_or(false)
    }

    fn current_epoch(&self) -> EpochNumber {
        Staking::current_epoch(self)
    }
}
