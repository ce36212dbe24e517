// staking/src/events.rs

use chain_core::{Address, Amount, EpochNumber};
use serde::{Deserialize, Serialize};

/// Structured record of a completed state change, for downstream indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StakingEvent {
    ValidatorAdded {
        validator: Address,
    },
    ValidatorRemoved {
        validator: Address,
    },
    ValidatorOwnerChanged {
        validator: Address,
        owner: Address,
    },
    CommissionRateChanged {
        validator: Address,
        rate_bps: u16,
        epoch: EpochNumber,
    },
    Delegated {
        validator: Address,
        delegator: Address,
        amount: Amount,
        epoch: EpochNumber,
    },
    Undelegated {
        validator: Address,
        delegator: Address,
        amount: Amount,
        epoch: EpochNumber,
    },
    Deposited {
        validator: Address,
        amount: Amount,
        epoch: EpochNumber,
    },
    ValidatorFeeClaimed {
        validator: Address,
        owner: Address,
        amount: Amount,
        epoch: EpochNumber,
    },
    DelegatorFeeClaimed {
        validator: Address,
        delegator: Address,
        amount: Amount,
        epoch: EpochNumber,
    },
    Redelegated {
        validator: Address,
        delegator: Address,
        amount: Amount,
        dust: Amount,
        epoch: EpochNumber,
    },
    Slashed {
        validator: Address,
        slashes_count: u32,
        epoch: EpochNumber,
    },
    Jailed {
        validator: Address,
        until_epoch: EpochNumber,
    },
    Released {
        validator: Address,
        epoch: EpochNumber,
    },
}
