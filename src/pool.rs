//! Pool state: the reserve balance and the circulating token supply.
//!
//! Pricing reads it through [`PoolState::backing`], which counts outstanding loans as
//! backing because borrowed reserve is still owed to the pool.

use crate::error::MathError;
use crate::pricing::{add, sub};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    pub reserve_balance: u64,
    pub circulating_supply: u64,
}

impl PoolState {
    pub fn new(reserve_balance: u64, circulating_supply: u64) -> Self {
        Self {
            reserve_balance,
            circulating_supply,
        }
    }

    pub fn backing(&self, total_borrowed: u64) -> Result<u64, MathError> {
        add(self.reserve_balance, total_borrowed)
    }

    /// Spot price in reserve units per token, `None` before any supply exists.
    pub fn spot_price(&self, total_borrowed: u64) -> Option<Decimal> {
        if self.circulating_supply == 0 {
            return None;
        }
        let backing = self.backing(total_borrowed).ok()?;
        Decimal::from(backing).checked_div(Decimal::from(self.circulating_supply))
    }

    /// Pool after applying signed reserve and supply deltas, computed without mutating.
    pub fn adjusted(&self, delta: PoolDelta) -> Result<PoolState, MathError> {
        let reserve_balance = sub(add(self.reserve_balance, delta.reserve_in)?, delta.reserve_out)?;
        let circulating_supply = sub(add(self.circulating_supply, delta.minted)?, delta.burned)?;
        Ok(PoolState {
            reserve_balance,
            circulating_supply,
        })
    }
}

/// Movements an operation applies to the pool in one commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolDelta {
    pub reserve_in: u64,
    pub reserve_out: u64,
    pub minted: u64,
    pub burned: u64,
}
