// staking/src/params.rs

use crate::{StakingError, StakingResult};
use chain_core::Amount;
use serde::{Deserialize, Serialize};

/// Commission rates and reward shares are expressed in basis points.
pub const MAX_SHARE_BPS: u16 = 10_000;

/// Consensus-economics parameters, fixed at genesis and changed only through
/// the governance collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainParams {
    /// Size of the stake-ordered active validator set
    pub active_validators_length: u32,
    /// Blocks per epoch
    pub epoch_block_interval: u64,
    /// Misbehavior reports before the validator forfeits the epoch's rewards
    pub misdemeanor_threshold: u32,
    /// Misbehavior reports before the validator is jailed
    pub felony_threshold: u32,
    /// Epochs a jailed validator must wait before release
    pub validator_jail_epoch_length: u64,
    /// Epochs before undelegated funds become claimable
    pub undelegate_period: u64,
    /// Minimum delegation amount (smallest units)
    pub min_staking_amount: Amount,
    /// Delegated amounts must be an exact multiple of this unit
    pub min_staking_unit: Amount,
    /// Upper bound for validator commission rates (basis points)
    pub max_commission_rate: u16,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            active_validators_length: 25,
            epoch_block_interval: 1200,
            misdemeanor_threshold: 50,
            felony_threshold: 150,
            validator_jail_epoch_length: 7,
            undelegate_period: 6,
            min_staking_amount: Amount::from_tokens(1),
            min_staking_unit: Amount::from_u64(10_000_000_000),
            max_commission_rate: MAX_SHARE_BPS,
        }
    }
}

impl ChainParams {
    pub fn validate(&self) -> StakingResult<()> {
        if self.epoch_block_interval == 0 {
            return Err(StakingError::InvalidState(
                "epoch block interval must be positive".into(),
            ));
        }
        if self.active_validators_length == 0 {
            return Err(StakingError::InvalidState(
                "active validators length must be positive".into(),
            ));
        }
        if self.felony_threshold <= self.misdemeanor_threshold {
            return Err(StakingError::InvalidState(
                "felony threshold must exceed misdemeanor threshold".into(),
            ));
        }
        if self.max_commission_rate > MAX_SHARE_BPS {
            return Err(StakingError::BadDistribution(format!(
                "max commission rate {} exceeds {} bps",
                self.max_commission_rate, MAX_SHARE_BPS
            )));
        }
        if self.min_staking_unit.is_zero() {
            return Err(StakingError::InvalidAmount(
                "minimum staking unit must be positive".into(),
            ));
        }
        if self.min_staking_amount.is_zero()
            || !self.min_staking_amount.is_multiple_of(&self.min_staking_unit)
        {
            return Err(StakingError::InvalidAmount(
                "minimum staking amount must be a positive multiple of the staking unit".into(),
            ));
        }
        Ok(())
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let params: ChainParams = toml::from_str(&contents)?;
        params.validate()?;
        Ok(params)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
