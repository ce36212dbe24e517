// staking/src/active_set.rs

use chain_core::{Address, Amount};
use serde::{Deserialize, Serialize};

/// Fixed-capacity validator subset ordered descending by delegated stake.
///
/// The array is kept sorted synchronously on every stake change rather than
/// being rebuilt at epoch boundaries, so reads always reflect the latest
/// committed stake. Ties keep their existing order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSet {
    capacity: usize,
    entries: Vec<Address>,
}

impl ActiveSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_member(&self, account: &Address) -> bool {
        self.entries.contains(account)
    }

    /// Members in stake order, highest first
    pub fn as_slice(&self) -> &[Address] {
        &self.entries
    }

    pub fn remove(&mut self, account: &Address) -> bool {
        match self.entries.iter().position(|a| a == account) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Re-evaluate membership and rank after a stake change.
    ///
    /// Members are bubbled locally to their new rank; a non-member displaces
    /// the current minimum only when its stake is strictly greater.
    pub fn on_stake_changed<F>(&mut self, account: Address, stake_of: F)
    where
        F: Fn(&Address) -> Amount,
    {
        if let Some(idx) = self.entries.iter().position(|a| a == &account) {
            self.resort(idx, &stake_of);
            return;
        }
        if self.entries.len() < self.capacity {
            self.insert_ranked(account, &stake_of);
            return;
        }
        if self.capacity == 0 {
            return;
        }
        let min_stake = stake_of(&self.entries[self.entries.len() - 1]);
        if stake_of(&account) > min_stake {
            self.entries.pop();
            self.insert_ranked(account, &stake_of);
        }
    }

    /// Insert at rank; equal stakes land after existing members.
    fn insert_ranked<F>(&mut self, account: Address, stake_of: &F)
    where
        F: Fn(&Address) -> Amount,
    {
        let stake = stake_of(&account);
        let idx = self
            .entries
            .iter()
            .position(|a| stake_of(a) < stake)
            .unwrap_or(self.entries.len());
        self.entries.insert(idx, account);
    }

    /// Bubble the member at `idx` toward its correct rank, O(K) worst case.
    fn resort<F>(&mut self, idx: usize, stake_of: &F)
    where
        F: Fn(&Address) -> Amount,
    {
        let mut i = idx;
        while i > 0 && stake_of(&self.entries[i]) > stake_of(&self.entries[i - 1]) {
            self.entries.swap(i, i - 1);
            i -= 1;
        }
        while i + 1 < self.entries.len() && stake_of(&self.entries[i]) < stake_of(&self.entries[i + 1])
        {
            self.entries.swap(i, i + 1);
            i += 1;
        }
    }
}
