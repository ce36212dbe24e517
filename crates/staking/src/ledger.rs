// staking/src/ledger.rs

use crate::validator::ValidatorSnapshot;
use crate::{StakingError, StakingResult};
use chain_core::{Address, Amount, EpochNumber};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Principal step: the absolute delegated amount in effect from `since_epoch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationOp {
    pub amount: Amount,
    pub since_epoch: EpochNumber,
}

/// Read-side view of a single delegation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationView {
    pub delegated_amount: Amount,
    pub pending_undelegate: Amount,
    pub unstake_blocked_before: EpochNumber,
}

/// Pull-based bookkeeping between one delegator and one validator.
///
/// Principal changes are stored as absolute steps keyed by the epoch they take
/// effect, so each committed epoch's reward split sees exactly the principal
/// that was in force when the epoch started. Settled epochs are pruned behind
/// a moving checkpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidatorDelegation {
    ops: VecDeque<DelegationOp>,
    /// Undelegated principal waiting out the lock period
    pending_undelegate: Amount,
    /// Epoch before which the pending amount may not be claimed
    unstake_blocked_before: EpochNumber,
    /// Rewards are settled for epochs strictly below this
    claimed_before_epoch: EpochNumber,
    /// Sub-unit remainder left behind by redelegation
    dust_credit: Amount,
}

impl ValidatorDelegation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current principal (the latest recorded step)
    pub fn delegated_amount(&self) -> Amount {
        self.ops
            .back()
            .map(|op| op.amount.clone())
            .unwrap_or_else(Amount::zero)
    }

    /// Principal in effect for the given epoch
    pub fn principal_at(&self, epoch: EpochNumber) -> Amount {
        self.ops
            .iter()
            .rev()
            .find(|op| op.since_epoch <= epoch)
            .map(|op| op.amount.clone())
            .unwrap_or_else(Amount::zero)
    }

    pub fn view(&self) -> DelegationView {
        DelegationView {
            delegated_amount: self.delegated_amount(),
            pending_undelegate: self.pending_undelegate.clone(),
            unstake_blocked_before: self.unstake_blocked_before,
        }
    }

    /// Record a principal increase effective from `since_epoch`.
    pub fn record_delegate(&mut self, amount: &Amount, since_epoch: EpochNumber) {
        let new_total = self.delegated_amount() + amount.clone();
        self.push_step(new_total, since_epoch);
    }

    /// Record a principal decrease effective from `since_epoch`; the amount
    /// becomes claimable once `unlock_epoch` is reached.
    pub fn record_undelegate(
        &mut self,
        amount: &Amount,
        since_epoch: EpochNumber,
        unlock_epoch: EpochNumber,
    ) -> StakingResult<()> {
        let available = self.delegated_amount();
        let new_total = available.checked_sub(amount).ok_or_else(|| {
            StakingError::InsufficientBalance {
                requested: amount.clone(),
                available,
            }
        })?;
        self.push_step(new_total, since_epoch);
        self.pending_undelegate = self.pending_undelegate.clone() + amount.clone();
        // a fresh request re-arms the lock for the whole pending amount
        self.unstake_blocked_before = unlock_epoch;
        Ok(())
    }

    fn push_step(&mut self, amount: Amount, since_epoch: EpochNumber) {
        match self.ops.back_mut() {
            Some(last) if last.since_epoch == since_epoch => last.amount = amount,
            _ => self.ops.push_back(DelegationOp { amount, since_epoch }),
        }
    }

    /// Matured pending undelegates, without mutating state
    pub fn matured_undelegates(&self, epoch: EpochNumber) -> Amount {
        if !self.pending_undelegate.is_zero() && epoch >= self.unstake_blocked_before {
            self.pending_undelegate.clone()
        } else {
            Amount::zero()
        }
    }

    /// Withdraw matured pending undelegates
    pub fn take_matured_undelegates(&mut self, epoch: EpochNumber) -> Amount {
        if !self.pending_undelegate.is_zero() && epoch >= self.unstake_blocked_before {
            self.unstake_blocked_before = 0;
            std::mem::take(&mut self.pending_undelegate)
        } else {
            Amount::zero()
        }
    }

    /// Rewards owed for committed epochs in `[checkpoint, to_epoch)`, plus any
    /// dust left behind by redelegation. Pure read.
    pub fn fee_owed(
        &self,
        book: &BTreeMap<EpochNumber, ValidatorSnapshot>,
        to_epoch: EpochNumber,
    ) -> Amount {
        let mut fee = self.dust_credit.clone();
        for (epoch, snapshot) in book.range(self.claimed_before_epoch..to_epoch) {
            if snapshot.total_rewards.is_zero() || snapshot.total_delegated.is_zero() {
                continue;
            }
            let principal = self.principal_at(*epoch);
            if principal.is_zero() {
                continue;
            }
            let share = snapshot
                .delegator_pool()
                .mul_div_floor(&principal, &snapshot.total_delegated)
                .unwrap_or_else(Amount::zero);
            fee = fee + share;
        }
        fee
    }

    /// Advance the reward checkpoint to `to_epoch`, clearing dust and pruning
    /// steps no epoch at or above the checkpoint can reference.
    pub fn settle_to(&mut self, to_epoch: EpochNumber) {
        if to_epoch > self.claimed_before_epoch {
            self.claimed_before_epoch = to_epoch;
        }
        self.dust_credit = Amount::zero();
        while self.ops.len() >= 2 && self.ops[1].since_epoch <= self.claimed_before_epoch {
            self.ops.pop_front();
        }
    }

    /// Park a sub-unit remainder so it stays claimable after redelegation.
    pub fn credit_dust(&mut self, dust: Amount) {
        self.dust_credit = self.dust_credit.clone() + dust;
    }

    pub fn checkpoint_epoch(&self) -> EpochNumber {
        self.claimed_before_epoch
    }

    /// Whether nothing is left to track
    pub fn is_drained(&self) -> bool {
        self.delegated_amount().is_zero()
            && self.pending_undelegate.is_zero()
            && self.dust_credit.is_zero()
    }
}

/// All delegations, keyed by validator then delegator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelegationLedger {
    entries: HashMap<Address, HashMap<Address, ValidatorDelegation>>,
}

impl DelegationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, validator: &Address, delegator: &Address) -> Option<&ValidatorDelegation> {
        self.entries.get(validator).and_then(|m| m.get(delegator))
    }

    pub fn get_mut(
        &mut self,
        validator: &Address,
        delegator: &Address,
    ) -> Option<&mut ValidatorDelegation> {
        self.entries
            .get_mut(validator)
            .and_then(|m| m.get_mut(delegator))
    }

    pub fn entry(&mut self, validator: &Address, delegator: &Address) -> &mut ValidatorDelegation {
        self.entries
            .entry(*validator)
            .or_default()
            .entry(*delegator)
            .or_default()
    }

    /// Sum of live principal delegated to a validator
    pub fn total_delegated_to(&self, validator: &Address) -> Amount {
        self.entries
            .get(validator)
            .map(|m| {
                m.values()
                    .fold(Amount::zero(), |acc, d| acc + d.delegated_amount())
            })
            .unwrap_or_else(Amount::zero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(rewards: u64, delegated: u64, commission: u16) -> ValidatorSnapshot {
        let mut snap = ValidatorSnapshot::new(Amount::from_u64(delegated), commission);
        snap.total_rewards = Amount::from_u64(rewards);
        snap
    }

    #[test]
    fn test_principal_steps() {
        let mut delegation = ValidatorDelegation::new();
        delegation.record_delegate(&Amount::from_u64(100), 1);
        delegation.record_delegate(&Amount::from_u64(50), 3);

        assert_eq!(delegation.principal_at(0), Amount::zero());
        assert_eq!(delegation.principal_at(1), Amount::from_u64(100));
        assert_eq!(delegation.principal_at(2), Amount::from_u64(100));
        assert_eq!(delegation.principal_at(3), Amount::from_u64(150));
        assert_eq!(delegation.delegated_amount(), Amount::from_u64(150));
    }

    #[test]
    fn test_same_epoch_steps_merge() {
        let mut delegation = ValidatorDelegation::new();
        delegation.record_delegate(&Amount::from_u64(100), 1);
        delegation.record_delegate(&Amount::from_u64(100), 1);
        assert_eq!(delegation.delegated_amount(), Amount::from_u64(200));
        assert_eq!(delegation.view().delegated_amount, Amount::from_u64(200));
    }

    #[test]
    fn test_undelegate_checks_balance() {
        let mut delegation = ValidatorDelegation::new();
        delegation.record_delegate(&Amount::from_u64(100), 1);
        let err = delegation
            .record_undelegate(&Amount::from_u64(150), 2, 4)
            .unwrap_err();
        assert!(matches!(err, StakingError::InsufficientBalance { .. }));
    }

    #[test]
    fn test_undelegate_locks_until_unlock_epoch() {
        let mut delegation = ValidatorDelegation::new();
        delegation.record_delegate(&Amount::from_u64(100), 1);
        delegation
            .record_undelegate(&Amount::from_u64(40), 2, 5)
            .unwrap();

        assert_eq!(delegation.delegated_amount(), Amount::from_u64(60));
        assert_eq!(delegation.matured_undelegates(4), Amount::zero());
        assert_eq!(delegation.matured_undelegates(5), Amount::from_u64(40));
        assert_eq!(delegation.take_matured_undelegates(5), Amount::from_u64(40));
        assert_eq!(delegation.take_matured_undelegates(5), Amount::zero());
    }

    #[test]
    fn test_fee_only_counts_committed_epochs() {
        let mut delegation = ValidatorDelegation::new();
        delegation.record_delegate(&Amount::from_u64(100), 1);

        let mut book = BTreeMap::new();
        book.insert(1, snapshot(1000, 100, 0));
        book.insert(2, snapshot(500, 100, 0));

        // epoch 2 still open: only epoch 1 pays out
        assert_eq!(delegation.fee_owed(&book, 2), Amount::from_u64(1000));
        assert_eq!(delegation.fee_owed(&book, 3), Amount::from_u64(1500));
    }

    #[test]
    fn test_fee_respects_commission_and_prorata() {
        let mut alice = ValidatorDelegation::new();
        alice.record_delegate(&Amount::from_u64(300), 1);
        let mut bob = ValidatorDelegation::new();
        bob.record_delegate(&Amount::from_u64(100), 1);

        let mut book = BTreeMap::new();
        book.insert(1, snapshot(1000, 400, 1000)); // 10% commission

        // delegator pool is 900, split 3:1
        assert_eq!(alice.fee_owed(&book, 2), Amount::from_u64(675));
        assert_eq!(bob.fee_owed(&book, 2), Amount::from_u64(225));
    }

    #[test]
    fn test_settle_prunes_and_stops_replay() {
        let mut delegation = ValidatorDelegation::new();
        delegation.record_delegate(&Amount::from_u64(100), 1);

        let mut book = BTreeMap::new();
        book.insert(1, snapshot(1000, 100, 0));

        assert_eq!(delegation.fee_owed(&book, 2), Amount::from_u64(1000));
        delegation.settle_to(2);
        assert_eq!(delegation.fee_owed(&book, 2), Amount::zero());
        assert_eq!(delegation.delegated_amount(), Amount::from_u64(100));
    }

    #[test]
    fn test_dust_credit_is_paid_once() {
        let mut delegation = ValidatorDelegation::new();
        delegation.credit_dust(Amount::from_u64(7));
        let book = BTreeMap::new();
        assert_eq!(delegation.fee_owed(&book, 5), Amount::from_u64(7));
        delegation.settle_to(5);
        assert_eq!(delegation.fee_owed(&book, 5), Amount::zero());
    }

    #[test]
    fn test_ledger_totals() {
        let mut ledger = DelegationLedger::new();
        let validator = Address::new([1u8; 20]);
        ledger
            .entry(&validator, &Address::new([2u8; 20]))
            .record_delegate(&Amount::from_u64(100), 1);
        ledger
            .entry(&validator, &Address::new([3u8; 20]))
            .record_delegate(&Amount::from_u64(50), 1);

        assert_eq!(ledger.total_delegated_to(&validator), Amount::from_u64(150));
        assert_eq!(
            ledger.total_delegated_to(&Address::new([9u8; 20])),
            Amount::zero()
        );
    }
}
