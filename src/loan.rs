//! Loan records and the collateral handle they own.
//!
//! Collateral is an owned, non-`Clone` value. It enters a loan when the loan opens or grows
//! and leaves exactly once, either released to the borrower or forfeited to the pool.

use crate::error::MathError;
use crate::pricing::{add, sub};
use crate::types::{AccountId, Timestamp, SECONDS_PER_DAY};
use serde::{Deserialize, Serialize};

/// Tokens locked behind a loan.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "collateral must be released or forfeited"]
pub struct Collateral(u64);

impl Collateral {
    pub(crate) fn lock(amount: u64) -> Self {
        Self(amount)
    }

    pub fn amount(&self) -> u64 {
        self.0
    }

    pub(crate) fn merge(&mut self, other: Collateral) -> Result<(), MathError> {
        self.0 = add(self.0, other.0)?;
        Ok(())
    }

    pub(crate) fn split(&mut self, amount: u64) -> Result<Collateral, MathError> {
        self.0 = sub(self.0, amount)?;
        Ok(Collateral(amount))
    }

    /// Hand the tokens back to the borrower.
    pub(crate) fn release(self) -> u64 {
        self.0
    }

    /// Give the tokens up to the pool, where they are burned.
    pub(crate) fn forfeit(self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
pub struct Loan {
    pub borrower: AccountId,
    pub(crate) collateral: Collateral,
    pub borrowed: u64,
    pub end_date: Timestamp,
    pub duration_days: u64,
}

impl Loan {
    pub(crate) fn new(
        borrower: AccountId,
        collateral: Collateral,
        borrowed: u64,
        end_date: Timestamp,
        duration_days: u64,
    ) -> Self {
        Self {
            borrower,
            collateral,
            borrowed,
            end_date,
            duration_days,
        }
    }

    pub fn collateral(&self) -> u64 {
        self.collateral.amount()
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.end_date < now
    }

    /// Whole days between `now` and the end date, rounded down.
    pub fn remaining_days(&self, now: Timestamp) -> u64 {
        self.end_date.as_secs().saturating_sub(now.as_secs()) / SECONDS_PER_DAY
    }

    pub fn view(&self) -> LoanView {
        LoanView {
            borrower: self.borrower,
            collateral: self.collateral(),
            borrowed: self.borrowed,
            end_date: self.end_date,
            duration_days: self.duration_days,
        }
    }
}

/// Read-only snapshot of a loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanView {
    pub borrower: AccountId,
    pub collateral: u64,
    pub borrowed: u64,
    pub end_date: Timestamp,
    pub duration_days: u64,
}

impl LoanView {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.end_date < now
    }
}
