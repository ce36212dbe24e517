// chain-core/src/lib.rs

//! Core primitives shared across the staking workspace
//!
//! This crate provides:
//! - Token amounts in the smallest denomination (arbitrary precision)
//! - Account addresses
//! - Epoch derivation from block height

pub mod address;
pub mod epoch;
pub mod types;

pub use address::Address;
pub use epoch::EpochClock;
pub use types::*;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core primitives
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid epoch interval: {0}")]
    InvalidEpochInterval(String),
}
