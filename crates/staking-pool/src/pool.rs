// staking-pool/src/pool.rs

use crate::{PoolError, PoolResult};
use chain_core::{Address, Amount, EpochNumber};
use serde::{Deserialize, Serialize};
use staking::ValidatorDirectory;
use std::collections::HashMap;

/// Precision for the externally reported redemption ratio (18 decimals)
const RATIO_PRECISION: u64 = 1_000_000_000_000_000_000;

/// Per-validator pool totals. `total_pooled / total_shares` is the redemption
/// ratio; reward deposits raise it, stake/unstake leave it unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidatorPool {
    pub total_shares: Amount,
    pub total_pooled: Amount,
}

impl ValidatorPool {
    /// Shares minted for a deposit at the current ratio (1:1 when empty)
    fn shares_for_deposit(&self, amount: &Amount) -> Amount {
        if self.total_shares.is_zero() || self.total_pooled.is_zero() {
            return amount.clone();
        }
        amount
            .mul_div_floor(&self.total_shares, &self.total_pooled)
            .unwrap_or_else(Amount::zero)
    }

    /// Shares burned to withdraw `amount`. Rounded up so the ratio of the
    /// remaining shares never decreases.
    fn shares_for_withdrawal(&self, amount: &Amount) -> Amount {
        amount
            .mul_div_ceil(&self.total_shares, &self.total_pooled)
            .unwrap_or_else(Amount::zero)
    }

    /// Redemption value of `shares` at the current ratio, floor-rounded
    fn amount_for_shares(&self, shares: &Amount) -> Amount {
        if self.total_shares.is_zero() {
            return Amount::zero();
        }
        shares
            .mul_div_floor(&self.total_pooled, &self.total_shares)
            .unwrap_or_else(Amount::zero)
    }
}

/// A staker's position: a share claim plus any principal waiting out the
/// unstake lock.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolShare {
    pub shares: Amount,
    pub pending_unstake: Amount,
    pub unstake_blocked_before: EpochNumber,
}

/// Structured record of a completed pool state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolEvent {
    Staked {
        validator: Address,
        staker: Address,
        amount: Amount,
        shares: Amount,
    },
    RewardDeposited {
        validator: Address,
        amount: Amount,
    },
    Unstaked {
        validator: Address,
        staker: Address,
        amount: Amount,
        shares: Amount,
    },
    Claimed {
        validator: Address,
        staker: Address,
        amount: Amount,
    },
}

/// Share/ratio staking pool over the validator registry.
///
/// Validator existence and status are checked through the registry's
/// read-only directory surface; the pool never holds a reference to the
/// engine itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StakingPool {
    undelegate_period: u64,
    pools: HashMap<Address, ValidatorPool>,
    stakes: HashMap<(Address, Address), PoolShare>,
    events: Vec<PoolEvent>,
}

impl StakingPool {
    pub fn new(undelegate_period: u64) -> Self {
        Self {
            undelegate_period,
            ..Self::default()
        }
    }

    /// Structured events emitted since the last drain
    pub fn drain_events(&mut self) -> Vec<PoolEvent> {
        std::mem::take(&mut self.events)
    }

    /// Mint shares for `staker` at the current ratio.
    pub fn stake<D: ValidatorDirectory>(
        &mut self,
        directory: &D,
        validator: Address,
        staker: Address,
        amount: Amount,
    ) -> PoolResult<()> {
        if !directory.is_validator(&validator) {
            return Err(PoolError::NotFound(format!(
                "validator {}",
                validator.to_hex()
            )));
        }
        if !directory.is_validator_active(&validator) {
            return Err(PoolError::InvalidState(format!(
                "validator {} is not active",
                validator.to_hex()
            )));
        }
        if amount.is_zero() {
            return Err(PoolError::InvalidAmount("amount must be positive".into()));
        }
        let pool = self.pools.entry(validator).or_default();
        let shares = pool.shares_for_deposit(&amount);
        pool.total_shares = pool.total_shares.clone() + shares.clone();
        pool.total_pooled = pool.total_pooled.clone() + amount.clone();
        let position = self.stakes.entry((validator, staker)).or_default();
        position.shares = position.shares.clone() + shares.clone();
        self.events.push(PoolEvent::Staked {
            validator,
            staker,
            amount,
            shares,
        });
        Ok(())
    }

    /// Credit rewards to a validator's pool without minting shares: every
    /// outstanding share gains redemption value.
    pub fn deposit_reward<D: ValidatorDirectory>(
        &mut self,
        directory: &D,
        validator: Address,
        amount: Amount,
    ) -> PoolResult<()> {
        if !directory.is_validator(&validator) {
            return Err(PoolError::NotFound(format!(
                "validator {}",
                validator.to_hex()
            )));
        }
        if amount.is_zero() {
            return Err(PoolError::InvalidAmount("amount must be positive".into()));
        }
        let pool = self
            .pools
            .get_mut(&validator)
            .filter(|p| !p.total_shares.is_zero())
            .ok_or_else(|| {
                PoolError::InvalidState(format!(
                    "pool for validator {} has no shares outstanding",
                    validator.to_hex()
                ))
            })?;
        pool.total_pooled = pool.total_pooled.clone() + amount.clone();
        tracing::debug!(
            "pool for {} compounded {} across {} shares",
            validator.to_hex(),
            amount,
            pool.total_shares
        );
        self.events
            .push(PoolEvent::RewardDeposited { validator, amount });
        Ok(())
    }

    /// Burn shares worth `amount`; the principal matures after the undelegate
    /// period and is paid by `claim`.
    pub fn unstake<D: ValidatorDirectory>(
        &mut self,
        directory: &D,
        validator: Address,
        staker: Address,
        amount: Amount,
    ) -> PoolResult<()> {
        if amount.is_zero() {
            return Err(PoolError::InvalidAmount("amount must be positive".into()));
        }
        let pool = self.pools.get_mut(&validator).ok_or_else(|| {
            PoolError::NotFound(format!("pool for validator {}", validator.to_hex()))
        })?;
        let position = self
            .stakes
            .get_mut(&(validator, staker))
            .ok_or_else(|| PoolError::InsufficientBalance {
                requested: amount.clone(),
                available: Amount::zero(),
            })?;
        let available = pool.amount_for_shares(&position.shares);
        if amount > available {
            return Err(PoolError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        let shares = pool.shares_for_withdrawal(&amount);
        position.shares = position
            .shares
            .checked_sub(&shares)
            .ok_or_else(|| PoolError::InsufficientBalance {
                requested: shares.clone(),
                available: position.shares.clone(),
            })?;
        pool.total_shares = pool
            .total_shares
            .checked_sub(&shares)
            .ok_or_else(|| PoolError::InvalidState("share underflow".into()))?;
        pool.total_pooled = pool
            .total_pooled
            .checked_sub(&amount)
            .ok_or_else(|| PoolError::InvalidState("pool underflow".into()))?;
        position.pending_unstake = position.pending_unstake.clone() + amount.clone();
        // a fresh request re-arms the lock for the whole pending amount
        position.unstake_blocked_before = directory.current_epoch() + self.undelegate_period + 1;
        self.events.push(PoolEvent::Unstaked {
            validator,
            staker,
            amount,
            shares,
        });
        Ok(())
    }

    /// Pay out matured unstaked principal.
    pub fn claim<D: ValidatorDirectory>(
        &mut self,
        directory: &D,
        validator: Address,
        staker: Address,
    ) -> PoolResult<Amount> {
        let epoch = directory.current_epoch();
        let position = self
            .stakes
            .get_mut(&(validator, staker))
            .ok_or_else(|| PoolError::NotFound(format!("stake of {}", staker.to_hex())))?;
        if position.pending_unstake.is_zero() || epoch < position.unstake_blocked_before {
            return Err(PoolError::InvalidState(
                "no matured unstake to claim".into(),
            ));
        }
        position.unstake_blocked_before = 0;
        let amount = std::mem::take(&mut position.pending_unstake);
        self.events.push(PoolEvent::Claimed {
            validator,
            staker,
            amount: amount.clone(),
        });
        Ok(amount)
    }

    /// Current redemption value of a staker's shares, floor-rounded
    pub fn get_staked_amount(&self, validator: &Address, staker: &Address) -> Amount {
        let Some(pool) = self.pools.get(validator) else {
            return Amount::zero();
        };
        self.stakes
            .get(&(*validator, *staker))
            .map(|position| pool.amount_for_shares(&position.shares))
            .unwrap_or_else(Amount::zero)
    }

    /// Redemption ratio scaled by 10^18; identity when the pool is empty
    pub fn get_ratio(&self, validator: &Address) -> Amount {
        let precision = Amount::from_u64(RATIO_PRECISION);
        match self.pools.get(validator) {
            Some(pool) if !pool.total_shares.is_zero() => pool
                .total_pooled
                .mul_div_floor(&precision, &pool.total_shares)
                .unwrap_or(precision),
            _ => precision,
        }
    }

    pub fn get_validator_pool(&self, validator: &Address) -> Option<&ValidatorPool> {
        self.pools.get(validator)
    }

    pub fn get_pool_share(&self, validator: &Address, staker: &Address) -> Option<&PoolShare> {
        self.stakes.get(&(*validator, *staker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn addr(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    /// Directory stub for pool-only tests
    struct FakeDirectory {
        validators: HashSet<Address>,
        jailed: HashSet<Address>,
        epoch: EpochNumber,
    }

    impl FakeDirectory {
        fn with_validator(account: Address) -> Self {
            let mut validators = HashSet::new();
            validators.insert(account);
            Self {
                validators,
                jailed: HashSet::new(),
                epoch: 0,
            }
        }
    }

    impl ValidatorDirectory for FakeDirectory {
        fn is_validator(&self, account: &Address) -> bool {
            self.validators.contains(account)
        }

        fn is_validator_active(&self, account: &Address) -> bool {
            self.validators.contains(account) && !self.jailed.contains(account)
        }

        fn current_epoch(&self) -> EpochNumber {
            self.epoch
        }
    }

    #[test]
    fn test_stake_mints_one_to_one_when_empty() {
        let mut pool = StakingPool::new(0);
        let dir = FakeDirectory::with_validator(addr(1));
        pool.stake(&dir, addr(1), addr(10), Amount::from_u64(1000)).unwrap();

        assert_eq!(
            pool.get_staked_amount(&addr(1), &addr(10)),
            Amount::from_u64(1000)
        );
        assert_eq!(
            pool.get_ratio(&addr(1)),
            Amount::from_u64(RATIO_PRECISION)
        );
    }

    #[test]
    fn test_stake_rejects_unknown_and_jailed_validators() {
        let mut pool = StakingPool::new(0);
        let mut dir = FakeDirectory::with_validator(addr(1));
        assert!(matches!(
            pool.stake(&dir, addr(2), addr(10), Amount::from_u64(100)),
            Err(PoolError::NotFound(_))
        ));
        dir.jailed.insert(addr(1));
        assert!(matches!(
            pool.stake(&dir, addr(1), addr(10), Amount::from_u64(100)),
            Err(PoolError::InvalidState(_))
        ));
    }

    #[test]
    fn test_rewards_compound_into_ratio() {
        let mut pool = StakingPool::new(0);
        let dir = FakeDirectory::with_validator(addr(1));
        pool.stake(&dir, addr(1), addr(10), Amount::from_u64(1000)).unwrap();

        let ratio_before = pool.get_ratio(&addr(1));
        pool.deposit_reward(&dir, addr(1), Amount::from_u64(10)).unwrap();
        let ratio_after = pool.get_ratio(&addr(1));

        assert!(ratio_after > ratio_before);
        assert_eq!(
            pool.get_staked_amount(&addr(1), &addr(10)),
            Amount::from_u64(1010)
        );
    }

    #[test]
    fn test_rewards_split_by_shares() {
        let mut pool = StakingPool::new(0);
        let dir = FakeDirectory::with_validator(addr(1));
        pool.stake(&dir, addr(1), addr(10), Amount::from_u64(3000)).unwrap();
        pool.stake(&dir, addr(1), addr(11), Amount::from_u64(1000)).unwrap();
        pool.deposit_reward(&dir, addr(1), Amount::from_u64(400)).unwrap();

        assert_eq!(
            pool.get_staked_amount(&addr(1), &addr(10)),
            Amount::from_u64(3300)
        );
        assert_eq!(
            pool.get_staked_amount(&addr(1), &addr(11)),
            Amount::from_u64(1100)
        );
    }

    #[test]
    fn test_late_staker_pays_the_higher_ratio() {
        let mut pool = StakingPool::new(0);
        let dir = FakeDirectory::with_validator(addr(1));
        pool.stake(&dir, addr(1), addr(10), Amount::from_u64(1000)).unwrap();
        pool.deposit_reward(&dir, addr(1), Amount::from_u64(1000)).unwrap();

        // ratio is now 2: the same deposit buys half the shares
        pool.stake(&dir, addr(1), addr(11), Amount::from_u64(1000)).unwrap();
        let early = pool.get_pool_share(&addr(1), &addr(10)).unwrap();
        let late = pool.get_pool_share(&addr(1), &addr(11)).unwrap();
        assert_eq!(early.shares, Amount::from_u64(1000));
        assert_eq!(late.shares, Amount::from_u64(500));
        assert_eq!(
            pool.get_staked_amount(&addr(1), &addr(11)),
            Amount::from_u64(1000)
        );
    }

    #[test]
    fn test_deposit_into_empty_pool_fails() {
        let mut pool = StakingPool::new(0);
        let dir = FakeDirectory::with_validator(addr(1));
        assert!(matches!(
            pool.deposit_reward(&dir, addr(1), Amount::from_u64(100)),
            Err(PoolError::InvalidState(_))
        ));
    }

    #[test]
    fn test_unstake_locks_and_claims_after_period() {
        let mut pool = StakingPool::new(2);
        let mut dir = FakeDirectory::with_validator(addr(1));
        pool.stake(&dir, addr(1), addr(10), Amount::from_u64(1000)).unwrap();
        pool.unstake(&dir, addr(1), addr(10), Amount::from_u64(400)).unwrap();

        assert_eq!(
            pool.get_staked_amount(&addr(1), &addr(10)),
            Amount::from_u64(600)
        );
        assert!(matches!(
            pool.claim(&dir, addr(1), addr(10)),
            Err(PoolError::InvalidState(_))
        ));
        dir.epoch = 3;
        let paid = pool.claim(&dir, addr(1), addr(10)).unwrap();
        assert_eq!(paid, Amount::from_u64(400));
        assert!(matches!(
            pool.claim(&dir, addr(1), addr(10)),
            Err(PoolError::InvalidState(_))
        ));
    }

    #[test]
    fn test_unstake_more_than_balance_fails() {
        let mut pool = StakingPool::new(0);
        let dir = FakeDirectory::with_validator(addr(1));
        pool.stake(&dir, addr(1), addr(10), Amount::from_u64(1000)).unwrap();
        assert!(matches!(
            pool.unstake(&dir, addr(1), addr(10), Amount::from_u64(1500)),
            Err(PoolError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_unstake_keeps_ratio_for_remaining_stakers() {
        let mut pool = StakingPool::new(0);
        let mut dir = FakeDirectory::with_validator(addr(1));
        pool.stake(&dir, addr(1), addr(10), Amount::from_u64(1000)).unwrap();
        pool.stake(&dir, addr(1), addr(11), Amount::from_u64(1000)).unwrap();
        pool.deposit_reward(&dir, addr(1), Amount::from_u64(500)).unwrap();

        let before = pool.get_staked_amount(&addr(1), &addr(11));
        let full = pool.get_staked_amount(&addr(1), &addr(10));
        pool.unstake(&dir, addr(1), addr(10), full).unwrap();
        dir.epoch = 1;
        pool.claim(&dir, addr(1), addr(10)).unwrap();

        // the bystander's redeemable balance is unchanged (within rounding)
        let after = pool.get_staked_amount(&addr(1), &addr(11));
        assert!(after >= before.checked_sub(&Amount::from_u64(1)).unwrap());
        assert!(after <= pool.get_validator_pool(&addr(1)).unwrap().total_pooled);
    }

    #[test]
    fn test_ratio_never_decreases_across_flows() {
        let mut pool = StakingPool::new(0);
        let dir = FakeDirectory::with_validator(addr(1));
        pool.stake(&dir, addr(1), addr(10), Amount::from_u64(777)).unwrap();

        let mut last_ratio = pool.get_ratio(&addr(1));
        let flows: [(bool, u64); 6] = [
            (true, 331),
            (false, 100),
            (true, 57),
            (false, 404),
            (true, 1),
            (false, 250),
        ];
        for (is_reward, value) in flows {
            if is_reward {
                pool.deposit_reward(&dir, addr(1), Amount::from_u64(value)).unwrap();
            } else {
                pool.unstake(&dir, addr(1), addr(10), Amount::from_u64(value)).unwrap();
            }
            let ratio = pool.get_ratio(&addr(1));
            assert!(ratio >= last_ratio, "ratio regressed");
            last_ratio = ratio;
        }
    }
}
