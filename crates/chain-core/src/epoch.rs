// chain-core/src/epoch.rs

use crate::types::{BlockNumber, EpochNumber};
use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Derives epoch indices from raw block heights.
///
/// The epoch is never stored anywhere; every caller recomputes it from the
/// current height so there is no cached value to go stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochClock {
    epoch_block_interval: u64,
}

impl EpochClock {
    pub fn new(epoch_block_interval: u64) -> CoreResult<Self> {
        if epoch_block_interval == 0 {
            return Err(CoreError::InvalidEpochInterval(
                "epoch block interval must be positive".into(),
            ));
        }
        Ok(Self {
            epoch_block_interval,
        })
    }

    pub fn interval(&self) -> u64 {
        self.epoch_block_interval
    }

    /// Epoch containing the given height
    pub fn epoch_at(&self, height: BlockNumber) -> EpochNumber {
        height / self.epoch_block_interval
    }

    /// First block of the given epoch
    pub fn first_block_of(&self, epoch: EpochNumber) -> BlockNumber {
        epoch * self.epoch_block_interval
    }

    /// Whether advancing from `prev_height` to `height` crosses an epoch boundary
    pub fn crosses_boundary(&self, prev_height: BlockNumber, height: BlockNumber) -> bool {
        self.epoch_at(prev_height) != self.epoch_at(height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_interval_rejected() {
        assert!(EpochClock::new(0).is_err());
    }

    #[test]
    fn test_epoch_derivation() {
        let clock = EpochClock::new(100).unwrap();
        assert_eq!(clock.epoch_at(0), 0);
        assert_eq!(clock.epoch_at(99), 0);
        assert_eq!(clock.epoch_at(100), 1);
        assert_eq!(clock.epoch_at(250), 2);
        assert_eq!(clock.first_block_of(2), 200);
    }

    #[test]
    fn test_boundary_detection() {
        let clock = EpochClock::new(50).unwrap();
        assert!(!clock.crosses_boundary(10, 49));
        assert!(clock.crosses_boundary(49, 50));
        assert!(clock.crosses_boundary(0, 150));
    }
}
