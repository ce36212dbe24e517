// staking/src/lib.rs

//! Proof-of-Staked-Authority (PoSA) Validator Economics
//!
//! This crate implements the validator economics core:
//! - Validator registry with owner/commission management
//! - Stake-ordered active set, updated on every stake change
//! - Epoch-checkpointed delegation ledger with pull-based reward claims
//! - Misbehavior slashing with reward forfeiture and jailing

pub mod active_set;
pub mod engine;
pub mod events;
pub mod ledger;
pub mod params;
pub mod slashing;
pub mod validator;

pub use active_set::ActiveSet;
pub use engine::{Staking, ValidatorDirectory};
pub use events::StakingEvent;
pub use ledger::{DelegationLedger, DelegationView, ValidatorDelegation};
pub use params::ChainParams;
pub use slashing::{SlashOutcome, SlashingPolicy};
pub use validator::{Validator, ValidatorRegistry, ValidatorSnapshot, ValidatorStatus};

use chain_core::Amount;

/// Result type for staking operations
pub type StakingResult<T> = Result<T, StakingError>;

/// Errors that can occur during staking operations
#[derive(Debug, thiserror::Error)]
pub enum StakingError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Amount, available: Amount },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Bad distribution: {0}")]
    BadDistribution(String),

    #[error("Core error: {0}")]
    CoreError(#[from] chain_core::CoreError),
}
