// staking/src/slashing.rs

use crate::params::ChainParams;
use crate::validator::{Validator, ValidatorStatus};
use crate::{StakingError, StakingResult};
use chain_core::{Amount, EpochNumber};
use serde::{Deserialize, Serialize};

/// Effect of a single misbehavior report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlashOutcome {
    /// Counted, no threshold crossed
    Counted { slashes_count: u32 },
    /// Misdemeanor threshold crossed, current-epoch rewards forfeited
    RewardsForfeited { amount: Amount },
    /// Felony threshold crossed, validator jailed
    Jailed { until_epoch: EpochNumber },
}

/// Threshold policy for misbehavior reports.
///
/// Counters accumulate between jail releases. Crossing the misdemeanor
/// threshold forfeits the epoch's pending rewards; reaching the felony
/// threshold jails the validator for a configured number of epochs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SlashingPolicy {
    misdemeanor_threshold: u32,
    felony_threshold: u32,
    jail_epoch_length: u64,
}

impl SlashingPolicy {
    pub fn new(misdemeanor_threshold: u32, felony_threshold: u32, jail_epoch_length: u64) -> Self {
        Self {
            misdemeanor_threshold,
            felony_threshold,
            jail_epoch_length,
        }
    }

    pub fn from_params(params: &ChainParams) -> Self {
        Self::new(
            params.misdemeanor_threshold,
            params.felony_threshold,
            params.validator_jail_epoch_length,
        )
    }

    /// Apply one misbehavior report. `epoch_rewards` is the validator's
    /// accumulated reward pool for the current epoch; a misdemeanor empties it.
    pub fn apply(
        &self,
        validator: &mut Validator,
        epoch_rewards: &mut Amount,
        current_epoch: EpochNumber,
    ) -> SlashOutcome {
        validator.slashes_count += 1;

        if validator.slashes_count >= self.felony_threshold && validator.is_active() {
            validator.status = ValidatorStatus::Jailed;
            validator.jailed_before_epoch = current_epoch + self.jail_epoch_length;
            return SlashOutcome::Jailed {
                until_epoch: validator.jailed_before_epoch,
            };
        }

        if validator.slashes_count == self.misdemeanor_threshold {
            let amount = std::mem::take(epoch_rewards);
            return SlashOutcome::RewardsForfeited { amount };
        }

        SlashOutcome::Counted {
            slashes_count: validator.slashes_count,
        }
    }

    /// Release a jailed validator once its jail period has elapsed.
    pub fn release(
        &self,
        validator: &mut Validator,
        current_epoch: EpochNumber,
    ) -> StakingResult<()> {
        if !validator.is_jailed() {
            return Err(StakingError::InvalidState(format!(
                "validator {} is not in jail",
                validator.account.to_hex()
            )));
        }
        if current_epoch < validator.jailed_before_epoch {
            return Err(StakingError::InvalidState(format!(
                "validator {} is still in jail until epoch {}",
                validator.account.to_hex(),
                validator.jailed_before_epoch
            )));
        }
        validator.status = ValidatorStatus::Active;
        validator.slashes_count = 0;
        validator.jailed_before_epoch = 0;
        Ok(())
    }
}
