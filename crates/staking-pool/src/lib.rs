// staking-pool/src/lib.rs

//! Auto-Compounding Staking Pool
//!
//! An alternative staking front-end over the same validator registry. Stakers
//! hold shares instead of principal; reward deposits raise the pool's
//! redemption ratio, so balances grow without explicit claims.

pub mod pool;

pub use pool::{PoolEvent, PoolShare, StakingPool, ValidatorPool};

use chain_core::Amount;

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors that can occur in pool operations
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Amount, available: Amount },

    #[error("Invalid state: {0}")]
    InvalidState(String),
}
