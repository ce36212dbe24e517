// chain-core/src/types.rs

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// Block number/height
pub type BlockNumber = u64;

/// Epoch index derived from block height
pub type EpochNumber = u64;

/// Token amount (using BigUint for arbitrary precision)
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount(BigUint);

impl Amount {
    pub fn new(value: BigUint) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    pub fn from_u64(value: u64) -> Self {
        Self(BigUint::from(value))
    }

    /// Whole tokens, 1 token = 10^18 base units (similar to ETH/wei)
    pub fn from_tokens(tokens: u64) -> Self {
        Self(BigUint::from(tokens) * BigUint::from(10u64).pow(18))
    }

    pub fn inner(&self) -> &BigUint {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(&self, other: &Amount) -> Option<Amount> {
        Some(Amount(&self.0 + &other.0))
    }

    pub fn checked_sub(&self, other: &Amount) -> Option<Amount> {
        if self.0 < other.0 {
            None
        } else {
            Some(Amount(&self.0 - &other.0))
        }
    }

    /// Floor of `self * mul / div`. Returns `None` when `div` is zero.
    pub fn mul_div_floor(&self, mul: &Amount, div: &Amount) -> Option<Amount> {
        if div.is_zero() {
            return None;
        }
        Some(Amount(&self.0 * &mul.0 / &div.0))
    }

    /// Ceiling of `self * mul / div`. Returns `None` when `div` is zero.
    pub fn mul_div_ceil(&self, mul: &Amount, div: &Amount) -> Option<Amount> {
        if div.is_zero() {
            return None;
        }
        let product = &self.0 * &mul.0;
        let quotient = &product / &div.0;
        if &quotient * &div.0 == product {
            Some(Amount(quotient))
        } else {
            Some(Amount(quotient + BigUint::from(1u64)))
        }
    }

    /// Whether the amount is an exact multiple of `unit` (zero units count).
    pub fn is_multiple_of(&self, unit: &Amount) -> bool {
        if unit.is_zero() {
            return false;
        }
        (&self.0 % &unit.0).is_zero()
    }

    /// Largest multiple of `unit` not exceeding the amount.
    pub fn floor_to_multiple(&self, unit: &Amount) -> Amount {
        if unit.is_zero() {
            return Amount::zero();
        }
        Amount(&self.0 - (&self.0 % &unit.0))
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, other: Amount) -> Amount {
        Amount(&self.0 + &other.0)
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, other: Amount) -> Amount {
        Amount(&self.0 - &other.0)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validator stake amount
pub type StakeAmount = Amount;
