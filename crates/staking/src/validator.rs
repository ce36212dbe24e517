// staking/src/validator.rs

use crate::slashing::{SlashOutcome, SlashingPolicy};
use crate::{StakingError, StakingResult};
use chain_core::{Address, Amount, EpochNumber};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::params::MAX_SHARE_BPS;

/// Validator status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidatorStatus {
    /// Active and eligible for the active set
    Active,
    /// Temporarily excluded after repeated misbehavior
    Jailed,
}

/// Complete validator information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validator {
    /// Stable validator identity
    pub account: Address,
    /// Identity authorized to manage this validator
    pub owner: Address,
    /// Current status
    pub status: ValidatorStatus,
    /// Commission rate (basis points, 0-10000)
    pub commission_rate: u16,
    /// Sum of all live delegations (self + external)
    pub total_delegated: Amount,
    /// Misbehavior reports accrued since the last jail release
    pub slashes_count: u32,
    /// Epoch before which the validator may not be released (0 when not jailed)
    pub jailed_before_epoch: EpochNumber,
    /// Epoch of the last recorded stake/commission change
    pub changed_at_epoch: EpochNumber,
    /// Last epoch through which the owner's commission was claimed
    pub claimed_at_epoch: EpochNumber,
}

impl Validator {
    pub fn new(account: Address, owner: Address, commission_rate: u16, epoch: EpochNumber) -> Self {
        Self {
            account,
            owner,
            status: ValidatorStatus::Active,
            commission_rate: commission_rate.min(MAX_SHARE_BPS),
            total_delegated: Amount::zero(),
            slashes_count: 0,
            jailed_before_epoch: 0,
            changed_at_epoch: epoch,
            claimed_at_epoch: epoch,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, ValidatorStatus::Active)
    }

    pub fn is_jailed(&self) -> bool {
        matches!(self.status, ValidatorStatus::Jailed)
    }
}

/// Frozen per-epoch inputs for that epoch's fee split.
///
/// Rewards deposited during an epoch accumulate here; the delegated total and
/// commission rate are the values in effect when the epoch started, so later
/// stake changes cannot retroactively shift an epoch's split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorSnapshot {
    /// Rewards deposited during this epoch
    pub total_rewards: Amount,
    /// Delegated stake in effect for this epoch
    pub total_delegated: Amount,
    /// Commission rate in effect for this epoch (basis points)
    pub commission_rate: u16,
}

impl ValidatorSnapshot {
    pub fn new(total_delegated: Amount, commission_rate: u16) -> Self {
        Self {
            total_rewards: Amount::zero(),
            total_delegated,
            commission_rate,
        }
    }

    /// Copy of this snapshot for a later epoch; rewards belong to a single
    /// epoch and are not carried.
    pub fn carry_forward(&self) -> Self {
        Self {
            total_rewards: Amount::zero(),
            total_delegated: self.total_delegated.clone(),
            commission_rate: self.commission_rate,
        }
    }

    /// The owner's cut of this epoch's rewards. With no delegated stake the
    /// whole amount falls to the owner.
    pub fn validator_share(&self) -> Amount {
        if self.total_delegated.is_zero() {
            return self.total_rewards.clone();
        }
        self.total_rewards
            .mul_div_floor(
                &Amount::from_u64(self.commission_rate as u64),
                &Amount::from_u64(MAX_SHARE_BPS as u64),
            )
            .unwrap_or_else(Amount::zero)
    }

    /// The portion split pro-rata among delegators.
    pub fn delegator_pool(&self) -> Amount {
        self.total_rewards
            .checked_sub(&self.validator_share())
            .unwrap_or_else(Amount::zero)
    }
}

/// Owns validator records and their per-epoch snapshots.
///
/// Snapshots outlive the validator record itself: removing a validator keeps
/// its snapshot history so committed-epoch claims remain resolvable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidatorRegistry {
    validators: HashMap<Address, Validator>,
    /// Insertion order, for deterministic iteration
    order: Vec<Address>,
    snapshots: HashMap<Address, BTreeMap<EpochNumber, ValidatorSnapshot>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, account: &Address) -> bool {
        self.validators.contains_key(account)
    }

    pub fn get(&self, account: &Address) -> Option<&Validator> {
        self.validators.get(account)
    }

    pub fn get_mut(&mut self, account: &Address) -> Option<&mut Validator> {
        self.validators.get_mut(account)
    }

    pub fn require(&self, account: &Address) -> StakingResult<&Validator> {
        self.validators
            .get(account)
            .ok_or_else(|| StakingError::NotFound(format!("validator {}", account.to_hex())))
    }

    pub fn require_mut(&mut self, account: &Address) -> StakingResult<&mut Validator> {
        self.validators
            .get_mut(account)
            .ok_or_else(|| StakingError::NotFound(format!("validator {}", account.to_hex())))
    }

    /// Register a new validator and seed its snapshot history.
    pub fn insert(&mut self, validator: Validator, epoch: EpochNumber) -> StakingResult<()> {
        if self.validators.contains_key(&validator.account) {
            return Err(StakingError::InvalidState(format!(
                "validator {} already exists",
                validator.account.to_hex()
            )));
        }
        let account = validator.account;
        let seed = ValidatorSnapshot::new(Amount::zero(), validator.commission_rate);
        self.snapshots.entry(account).or_default().insert(epoch, seed);
        self.order.push(account);
        self.validators.insert(account, validator);
        Ok(())
    }

    /// Remove the live record. Snapshot history is retained.
    pub fn remove(&mut self, account: &Address) -> StakingResult<Validator> {
        let validator = self
            .validators
            .remove(account)
            .ok_or_else(|| StakingError::NotFound(format!("validator {}", account.to_hex())))?;
        self.order.retain(|a| a != account);
        Ok(validator)
    }

    /// Validators in insertion order
    pub fn iter_ordered(&self) -> impl Iterator<Item = &Validator> {
        self.order.iter().filter_map(|a| self.validators.get(a))
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Current delegated stake, zero for unknown validators
    pub fn stake_of(&self, account: &Address) -> Amount {
        self.validators
            .get(account)
            .map(|v| v.total_delegated.clone())
            .unwrap_or_else(Amount::zero)
    }

    pub fn snapshot_book(&self, account: &Address) -> Option<&BTreeMap<EpochNumber, ValidatorSnapshot>> {
        self.snapshots.get(account)
    }

    /// Snapshot for the given epoch, created by carrying the nearest earlier
    /// snapshot forward when missing.
    pub(crate) fn touch_snapshot(
        &mut self,
        account: &Address,
        epoch: EpochNumber,
    ) -> &mut ValidatorSnapshot {
        let commission = self
            .validators
            .get(account)
            .map(|v| v.commission_rate)
            .unwrap_or(0);
        let book = self.snapshots.entry(*account).or_default();
        let base = book
            .range(..=epoch)
            .next_back()
            .map(|(_, snap)| snap.carry_forward());
        book.entry(epoch)
            .or_insert_with(|| base.unwrap_or_else(|| ValidatorSnapshot::new(Amount::zero(), commission)))
    }

    /// Add delegated stake, effective from `effective_epoch`.
    pub(crate) fn increase_stake(
        &mut self,
        account: &Address,
        amount: &Amount,
        effective_epoch: EpochNumber,
    ) -> StakingResult<()> {
        {
            let snapshot = self.touch_snapshot(account, effective_epoch);
            snapshot.total_delegated = snapshot
                .total_delegated
                .checked_add(amount)
                .ok_or_else(|| StakingError::InvalidState("stake overflow".into()))?;
        }
        let validator = self.require_mut(account)?;
        validator.total_delegated = validator
            .total_delegated
            .checked_add(amount)
            .ok_or_else(|| StakingError::InvalidState("stake overflow".into()))?;
        validator.changed_at_epoch = effective_epoch;
        Ok(())
    }

    /// Apply one misbehavior report: bump the counter and let the policy
    /// decide between counting, forfeiting the epoch's rewards, and jailing.
    pub(crate) fn apply_slash(
        &mut self,
        account: &Address,
        policy: &SlashingPolicy,
        epoch: EpochNumber,
    ) -> StakingResult<SlashOutcome> {
        self.require(account)?;
        self.touch_snapshot(account, epoch);
        let validator = self
            .validators
            .get_mut(account)
            .ok_or_else(|| StakingError::NotFound(format!("validator {}", account.to_hex())))?;
        let snapshot = self
            .snapshots
            .get_mut(account)
            .and_then(|book| book.get_mut(&epoch))
            .ok_or_else(|| StakingError::InvalidState("missing epoch snapshot".into()))?;
        Ok(policy.apply(validator, &mut snapshot.total_rewards, epoch))
    }

    /// Remove delegated stake, effective from `effective_epoch`.
    pub(crate) fn decrease_stake(
        &mut self,
        account: &Address,
        amount: &Amount,
        effective_epoch: EpochNumber,
    ) -> StakingResult<()> {
        {
            let snapshot = self.touch_snapshot(account, effective_epoch);
            snapshot.total_delegated = snapshot
                .total_delegated
                .checked_sub(amount)
                .ok_or_else(|| StakingError::InvalidState("stake underflow".into()))?;
        }
        let validator = self.require_mut(account)?;
        validator.total_delegated = validator
            .total_delegated
            .checked_sub(amount)
            .ok_or_else(|| StakingError::InvalidState("stake underflow".into()))?;
        validator.changed_at_epoch = effective_epoch;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    #[test]
    fn test_validator_creation() {
        let validator = Validator::new(addr(1), addr(2), 500, 3);
        assert!(validator.is_active());
        assert_eq!(validator.commission_rate, 500);
        assert_eq!(validator.claimed_at_epoch, 3);
        assert!(validator.total_delegated.is_zero());
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut registry = ValidatorRegistry::new();
        registry.insert(Validator::new(addr(1), addr(1), 0, 0), 0).unwrap();
        assert!(registry.insert(Validator::new(addr(1), addr(1), 0, 0), 0).is_err());
    }

    #[test]
    fn test_remove_keeps_snapshots() {
        let mut registry = ValidatorRegistry::new();
        registry.insert(Validator::new(addr(1), addr(1), 0, 0), 0).unwrap();
        registry.increase_stake(&addr(1), &Amount::from_u64(100), 1).unwrap();
        registry.remove(&addr(1)).unwrap();

        assert!(!registry.contains(&addr(1)));
        let book = registry.snapshot_book(&addr(1)).unwrap();
        assert_eq!(book.get(&1).unwrap().total_delegated, Amount::from_u64(100));
    }

    #[test]
    fn test_touch_snapshot_carries_forward() {
        let mut registry = ValidatorRegistry::new();
        registry.insert(Validator::new(addr(1), addr(1), 700, 0), 0).unwrap();
        registry.increase_stake(&addr(1), &Amount::from_u64(500), 1).unwrap();

        // epochs 2..4 untouched; touching 5 copies the epoch-1 state
        let snapshot = registry.touch_snapshot(&addr(1), 5);
        assert_eq!(snapshot.total_delegated, Amount::from_u64(500));
        assert_eq!(snapshot.commission_rate, 700);
        assert!(snapshot.total_rewards.is_zero());
    }

    #[test]
    fn test_snapshot_share_split() {
        let mut snapshot = ValidatorSnapshot::new(Amount::from_u64(1000), 1000); // 10%
        snapshot.total_rewards = Amount::from_u64(200);
        assert_eq!(snapshot.validator_share(), Amount::from_u64(20));
        assert_eq!(snapshot.delegator_pool(), Amount::from_u64(180));
    }

    #[test]
    fn test_snapshot_share_without_delegators() {
        let mut snapshot = ValidatorSnapshot::new(Amount::zero(), 1000);
        snapshot.total_rewards = Amount::from_u64(200);
        // nobody to split with, owner takes all
        assert_eq!(snapshot.validator_share(), Amount::from_u64(200));
        assert!(snapshot.delegator_pool().is_zero());
    }

    #[test]
    fn test_iteration_order_is_stable() {
        let mut registry = ValidatorRegistry::new();
        for byte in [5u8, 3, 9, 1] {
            registry.insert(Validator::new(addr(byte), addr(byte), 0, 0), 0).unwrap();
        }
        let order: Vec<Address> = registry.iter_ordered().map(|v| v.account).collect();
        assert_eq!(order, vec![addr(5), addr(3), addr(9), addr(1)]);
    }
}
