// 8.0.2: receipts returned by protocol operations. amounts in reserve units unless the field
// name says tokens.

use crate::loan::LoanView;
use crate::scheduler::SweepOutcome;
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartReceipt {
    pub reserve: u64,
    pub minted_tokens: u64,
    pub burned_tokens: u64,
    // tokens credited to the caller
    pub credited_tokens: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyReceipt {
    pub tokens: u64,
    pub fee_tokens: u64,
    pub protocol_cut: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellReceipt {
    pub payout: u64,
    pub fee: u64,
    pub protocol_cut: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowReceipt {
    pub loan: LoanView,
    pub fee: u64,
    pub protocol_cut: u64,
    // reserve paid to the borrower
    pub received: u64,
    // tokens locked by this call
    pub collateral_locked: u64,
    // supplied tokens above what the loan needed, handed back
    pub collateral_change: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeverageReceipt {
    pub loan: LoanView,
    // mint fee, interest and overcollateralization together
    pub total_fee: u64,
    pub protocol_cut: u64,
    pub refund: u64,
    pub collateral_minted: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseReceipt {
    pub loan: LoanView,
    pub collateral_released: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashCloseReceipt {
    pub loan: LoanView,
    pub collateral_burned: u64,
    pub collateral_value: u64,
    pub fee: u64,
    pub protocol_cut: u64,
    pub payout: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendReceipt {
    pub loan: LoanView,
    pub fee: u64,
    pub protocol_cut: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralReceipt {
    pub loan: LoanView,
    pub released: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationReceipt {
    pub loan: LoanView,
    pub collateral_burned: u64,
    pub already_swept: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub from: Timestamp,
    pub to: Timestamp,
    pub borrowed: u64,
    pub collateral: u64,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.borrowed == 0 && self.collateral == 0
    }
}

impl From<&SweepOutcome> for SweepReport {
    fn from(outcome: &SweepOutcome) -> Self {
        Self {
            from: outcome.from,
            to: outcome.to,
            borrowed: outcome.expired.borrowed,
            collateral: outcome.expired.collateral,
        }
    }
}
