//! Loan ledger: per-borrower loans, running totals, and the liquidation buckets.
//!
//! Every transition that touches a loan updates the totals and the loan's bucket in the same
//! call, so no caller can move one without the other. Each method checks and computes
//! everything it needs before writing anything; an `Err` leaves the ledger untouched.
//!
//! A loan whose bucket the sweep has already collected is stale. It has been liquidated in
//! aggregate and only its record lingers until [`LoanLedger::prune_swept`] runs, the borrower
//! opens again or someone calls [`LoanLedger::liquidate`] on it.

use crate::error::{FundsError, LedgerResult, MathError, StateError, ValidationError};
use crate::loan::{Collateral, Loan, LoanView};
use crate::pricing::{add, interest_fee, mul_div, sub};
use crate::scheduler::{Bucket, LiquidationScheduler, SweepOutcome};
use crate::types::{AccountId, Timestamp, SECONDS_PER_DAY};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Loans may run for at most this many whole days from now.
pub const MAX_LOAN_DAYS: u64 = 365;
/// Closing fee charged on flash close, percent of collateral value.
pub const FLASH_CLOSE_FEE_PCT: u64 = 1;
/// Minimum collateral value kept after removing collateral, percent of borrowed.
pub const REMOVAL_COVERAGE_PCT: u64 = 99;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosedLoan {
    pub loan: LoanView,
    pub collateral_released: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashClosed {
    pub loan: LoanView,
    pub collateral_burned: u64,
    pub collateral_value: u64,
    pub closing_fee: u64,
    pub surplus: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Liquidated {
    pub loan: LoanView,
    pub collateral_forfeited: u64,
    /// The sweep had already written this loan off; only the record was dropped.
    pub already_swept: bool,
}

#[derive(Debug)]
pub struct LoanLedger {
    loans: HashMap<AccountId, Loan>,
    /// Borrowers by loan end date.
    ending: BTreeMap<Timestamp, BTreeSet<AccountId>>,
    total_borrowed: u64,
    total_collateral: u64,
    scheduler: LiquidationScheduler,
}

impl LoanLedger {
    pub fn new(genesis: Timestamp) -> Result<Self, MathError> {
        Ok(Self {
            loans: HashMap::new(),
            ending: BTreeMap::new(),
            total_borrowed: 0,
            total_collateral: 0,
            scheduler: LiquidationScheduler::new(genesis)?,
        })
    }

    pub fn total_borrowed(&self) -> u64 {
        self.total_borrowed
    }

    pub fn total_collateral(&self) -> u64 {
        self.total_collateral
    }

    pub fn last_liquidation_date(&self) -> Timestamp {
        self.scheduler.watermark()
    }

    pub fn scheduler(&self) -> &LiquidationScheduler {
        &self.scheduler
    }

    pub fn loan(&self, borrower: AccountId) -> Option<&Loan> {
        self.loans.get(&borrower)
    }

    pub fn is_stale(&self, loan: &Loan) -> bool {
        self.scheduler.is_swept(loan.end_date)
    }

    /// Snapshot of the borrower's loan, `None` once a sweep has written it off.
    pub fn loan_view(&self, borrower: AccountId) -> Option<LoanView> {
        self.loans
            .get(&borrower)
            .filter(|loan| !self.is_stale(loan))
            .map(Loan::view)
    }

    /// Loans not yet written off by a sweep.
    pub fn live_loans(&self) -> impl Iterator<Item = &Loan> {
        self.loans.values().filter(|loan| !self.is_stale(loan))
    }

    /// Totals, buckets and live loans all agree.
    pub fn is_consistent(&self) -> bool {
        let Ok(buckets) = self.scheduler.totals() else {
            return false;
        };
        let live = self.live_loans().try_fold(Bucket::default(), |acc, loan| {
            acc.plus(Bucket::new(loan.borrowed, loan.collateral()))
        });
        let totals = Bucket::new(self.total_borrowed, self.total_collateral);
        buckets == totals && live == Ok(totals)
    }

    /// The borrower's loan, if it can still be operated on at `now`.
    pub fn active_loan(&self, borrower: AccountId, now: Timestamp) -> LedgerResult<&Loan> {
        let loan = self
            .loans
            .get(&borrower)
            .ok_or(StateError::NoLoan(borrower))?;
        if loan.is_expired(now) || self.is_stale(loan) {
            return Err(StateError::LoanExpired {
                borrower,
                end_date: loan.end_date,
            }
            .into());
        }
        Ok(loan)
    }

    /// Fails when the borrower already holds a loan that has not been written off.
    pub fn ensure_can_open(&self, borrower: AccountId) -> LedgerResult<()> {
        match self.loans.get(&borrower) {
            Some(loan) if !self.is_stale(loan) => Err(StateError::LoanAlreadyOpen(borrower).into()),
            _ => Ok(()),
        }
    }

    fn totals_plus(&self, delta: Bucket) -> Result<Bucket, MathError> {
        Bucket::new(self.total_borrowed, self.total_collateral).plus(delta)
    }

    fn totals_minus(&self, delta: Bucket) -> Result<Bucket, MathError> {
        Bucket::new(self.total_borrowed, self.total_collateral).minus(delta)
    }

    fn set_totals(&mut self, totals: Bucket) {
        self.total_borrowed = totals.borrowed;
        self.total_collateral = totals.collateral;
    }

    fn index(&mut self, end_date: Timestamp, borrower: AccountId) {
        self.ending.entry(end_date).or_default().insert(borrower);
    }

    fn unindex(&mut self, end_date: Timestamp, borrower: AccountId) {
        if let Some(borrowers) = self.ending.get_mut(&end_date) {
            borrowers.remove(&borrower);
            if borrowers.is_empty() {
                self.ending.remove(&end_date);
            }
        }
    }

    /// Drop a record that a sweep already wrote off.
    fn drop_stale(&mut self, borrower: AccountId) -> Option<Loan> {
        let loan = self.loans.remove(&borrower)?;
        self.unindex(loan.end_date, borrower);
        Some(loan)
    }

    /// `NONE -> OPEN`. A stale record for the borrower is replaced.
    pub(crate) fn open(
        &mut self,
        borrower: AccountId,
        collateral: Collateral,
        borrowed: u64,
        end_date: Timestamp,
        duration_days: u64,
    ) -> LedgerResult<LoanView> {
        self.ensure_can_open(borrower)?;
        let entry = Bucket::new(borrowed, collateral.amount());
        let totals = self.totals_plus(entry)?;
        self.scheduler.add(end_date, entry)?;
        self.set_totals(totals);

        if let Some(stale) = self.drop_stale(borrower) {
            // written off by an earlier sweep; its tokens were burned there
            let _ = stale.collateral.forfeit();
        }
        let loan = Loan::new(borrower, collateral, borrowed, end_date, duration_days);
        let view = loan.view();
        self.index(end_date, borrower);
        self.loans.insert(borrower, loan);
        Ok(view)
    }

    /// `OPEN -> OPEN`, growing both sides of the loan in place.
    pub(crate) fn increase(
        &mut self,
        borrower: AccountId,
        now: Timestamp,
        extra_borrowed: u64,
        extra_collateral: Collateral,
    ) -> LedgerResult<LoanView> {
        let loan = self.active_loan(borrower, now)?;
        let old = Bucket::new(loan.borrowed, loan.collateral());
        let delta = Bucket::new(extra_borrowed, extra_collateral.amount());
        let new = old.plus(delta)?;
        let end_date = loan.end_date;
        let totals = self.totals_plus(delta)?;

        self.scheduler.reschedule(end_date, old, end_date, new)?;
        self.set_totals(totals);
        let loan = self.loan_mut(borrower)?;
        loan.borrowed = new.borrowed;
        loan.collateral.merge(extra_collateral)?;
        Ok(loan.view())
    }

    /// `OPEN -> OPEN`. Paying off the whole amount goes through [`LoanLedger::close`].
    pub(crate) fn partial_repay(
        &mut self,
        borrower: AccountId,
        now: Timestamp,
        amount: u64,
    ) -> LedgerResult<LoanView> {
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        let loan = self.active_loan(borrower, now)?;
        if amount >= loan.borrowed {
            return Err(ValidationError::RepayNotPartial {
                amount,
                borrowed: loan.borrowed,
            }
            .into());
        }
        let delta = Bucket::new(amount, 0);
        let end_date = loan.end_date;
        let borrowed = loan.borrowed - amount;
        let totals = self.totals_minus(delta)?;

        self.scheduler.sub(end_date, delta)?;
        self.set_totals(totals);
        let loan = self.loan_mut(borrower)?;
        loan.borrowed = borrowed;
        Ok(loan.view())
    }

    /// `OPEN -> NONE` against an exact repayment. All collateral goes back to the borrower.
    pub(crate) fn close(
        &mut self,
        borrower: AccountId,
        now: Timestamp,
        repayment: u64,
    ) -> LedgerResult<ClosedLoan> {
        let loan = self.active_loan(borrower, now)?;
        if repayment != loan.borrowed {
            return Err(ValidationError::CloseAmountMismatch {
                provided: repayment,
                borrowed: loan.borrowed,
            }
            .into());
        }
        let loan = self.remove_live(borrower)?;
        let view = loan.view();
        Ok(ClosedLoan {
            loan: view,
            collateral_released: loan.collateral.release(),
        })
    }

    /// Required closing numbers for a flash close, given the collateral's reserve value.
    pub fn flash_close_terms(
        &self,
        borrower: AccountId,
        now: Timestamp,
        collateral_value: u64,
    ) -> LedgerResult<FlashClosed> {
        let loan = self.active_loan(borrower, now)?;
        // the rounding unit of the fee stays with the pool
        let after_fee = mul_div(collateral_value, 100 - FLASH_CLOSE_FEE_PCT, 100)?;
        let closing_fee = sub(collateral_value, after_fee)?;
        if after_fee < loan.borrowed {
            return Err(FundsError::Undercollateralized {
                value: after_fee,
                borrowed: loan.borrowed,
            }
            .into());
        }
        Ok(FlashClosed {
            loan: loan.view(),
            collateral_burned: loan.collateral(),
            collateral_value,
            closing_fee,
            surplus: after_fee - loan.borrowed,
        })
    }

    /// `OPEN -> NONE`, settling the debt out of the collateral itself, which is burned.
    pub(crate) fn flash_close(
        &mut self,
        borrower: AccountId,
        now: Timestamp,
        collateral_value: u64,
    ) -> LedgerResult<FlashClosed> {
        let terms = self.flash_close_terms(borrower, now, collateral_value)?;
        let loan = self.remove_live(borrower)?;
        let burned = loan.collateral.forfeit();
        debug_assert_eq!(burned, terms.collateral_burned);
        Ok(terms)
    }

    /// `OPEN -> OPEN`, pushing the end date out by `extra_days` against an exact fee.
    pub(crate) fn extend(
        &mut self,
        borrower: AccountId,
        now: Timestamp,
        extra_days: u64,
        fee_paid: u64,
    ) -> LedgerResult<LoanView> {
        let loan = self.active_loan(borrower, now)?;
        let expected = interest_fee(loan.borrowed, extra_days)?;
        if fee_paid != expected {
            return Err(ValidationError::FeeMismatch {
                expected,
                provided: fee_paid,
            }
            .into());
        }
        let extra_secs = extra_days.checked_mul(SECONDS_PER_DAY).ok_or(MathError::Overflow)?;
        let new_end = Timestamp(add(loan.end_date.as_secs(), extra_secs)?);
        let remaining = (new_end.as_secs() - now.as_secs()) / SECONDS_PER_DAY;
        if remaining > MAX_LOAN_DAYS {
            return Err(ValidationError::DurationTooLong {
                days: remaining,
                max: MAX_LOAN_DAYS,
            }
            .into());
        }
        let entry = Bucket::new(loan.borrowed, loan.collateral());
        let old_end = loan.end_date;
        let duration_days = add(loan.duration_days, extra_days)?;

        self.scheduler.reschedule(old_end, entry, new_end, entry)?;
        self.unindex(old_end, borrower);
        self.index(new_end, borrower);
        let loan = self.loan_mut(borrower)?;
        loan.end_date = new_end;
        loan.duration_days = duration_days;
        Ok(loan.view())
    }

    /// `OPEN -> OPEN`, handing back collateral the loan does not need.
    ///
    /// `value_of` prices a token amount in reserve units. What stays behind must still be
    /// worth at least the borrowed amount after a 1% haircut.
    pub(crate) fn remove_collateral(
        &mut self,
        borrower: AccountId,
        now: Timestamp,
        amount: u64,
        value_of: impl FnOnce(u64) -> Result<u64, MathError>,
    ) -> LedgerResult<(LoanView, u64)> {
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        let loan = self.active_loan(borrower, now)?;
        let held = loan.collateral();
        if amount > held {
            return Err(ValidationError::CollateralExceedsHeld {
                requested: amount,
                held,
            }
            .into());
        }
        let covered = mul_div(value_of(held - amount)?, REMOVAL_COVERAGE_PCT, 100)?;
        if loan.borrowed > covered {
            return Err(FundsError::Undercollateralized {
                value: covered,
                borrowed: loan.borrowed,
            }
            .into());
        }
        let delta = Bucket::new(0, amount);
        let end_date = loan.end_date;
        let totals = self.totals_minus(delta)?;

        self.scheduler.sub(end_date, delta)?;
        self.set_totals(totals);
        let loan = self.loan_mut(borrower)?;
        let removed = loan.collateral.split(amount)?;
        Ok((loan.view(), removed.release()))
    }

    /// `OPEN -> NONE` for a loan past its end date. No repayment; collateral is forfeited.
    ///
    /// Touches only this borrower's bucket, never walks the calendar. If a sweep already
    /// collected the bucket only the record is dropped.
    pub(crate) fn liquidate(&mut self, borrower: AccountId, now: Timestamp) -> LedgerResult<Liquidated> {
        let loan = self
            .loans
            .get(&borrower)
            .ok_or(StateError::NoLoan(borrower))?;
        if !loan.is_expired(now) {
            return Err(StateError::LoanNotExpired {
                borrower,
                end_date: loan.end_date,
            }
            .into());
        }

        if self.is_stale(loan) {
            let loan = self.drop_stale(borrower).ok_or(StateError::NoLoan(borrower))?;
            let view = loan.view();
            return Ok(Liquidated {
                loan: view,
                collateral_forfeited: loan.collateral.forfeit(),
                already_swept: true,
            });
        }

        let loan = self.remove_live(borrower)?;
        let view = loan.view();
        Ok(Liquidated {
            loan: view,
            collateral_forfeited: loan.collateral.forfeit(),
            already_swept: false,
        })
    }

    /// Collect every bucket before `now` and write it off the totals.
    pub(crate) fn sweep(&mut self, now: Timestamp) -> Result<SweepOutcome, MathError> {
        let pending = self.scheduler.pending(now)?;
        let totals = self.totals_minus(pending)?;
        let outcome = self.scheduler.sweep(now)?;
        debug_assert_eq!(outcome.expired, pending);
        self.set_totals(totals);
        Ok(outcome)
    }

    /// Drop every record a sweep has written off. Walks only the swept end dates.
    ///
    /// Not undoable, so it runs once the sweep is committed. Returns how many records went.
    pub(crate) fn prune_swept(&mut self) -> usize {
        let live = self.ending.split_off(&self.scheduler.watermark());
        let swept = std::mem::replace(&mut self.ending, live);
        let mut pruned = 0;
        for borrower in swept.into_values().flatten() {
            if let Some(loan) = self.loans.remove(&borrower) {
                let _ = loan.collateral.forfeit();
                pruned += 1;
            }
        }
        pruned
    }

    /// Reverse a sweep that the surrounding operation did not commit.
    pub(crate) fn undo_sweep(&mut self, outcome: SweepOutcome) {
        self.total_borrowed = self.total_borrowed.saturating_add(outcome.expired.borrowed);
        self.total_collateral = self.total_collateral.saturating_add(outcome.expired.collateral);
        self.scheduler.undo(outcome);
    }

    /// Totals after a sweep at `now`, without sweeping.
    pub fn projected_totals(&self, now: Timestamp) -> Result<Bucket, MathError> {
        self.totals_minus(self.scheduler.pending(now)?)
    }

    fn loan_mut(&mut self, borrower: AccountId) -> LedgerResult<&mut Loan> {
        Ok(self
            .loans
            .get_mut(&borrower)
            .ok_or(StateError::NoLoan(borrower))?)
    }

    /// Drop a live loan, taking it out of its bucket and the totals.
    fn remove_live(&mut self, borrower: AccountId) -> LedgerResult<Loan> {
        let loan = self
            .loans
            .get(&borrower)
            .ok_or(StateError::NoLoan(borrower))?;
        let entry = Bucket::new(loan.borrowed, loan.collateral());
        let end_date = loan.end_date;
        let totals = self.totals_minus(entry)?;

        self.scheduler.sub(end_date, entry)?;
        self.set_totals(totals);
        self.unindex(end_date, borrower);
        Ok(self
            .loans
            .remove(&borrower)
            .ok_or(StateError::NoLoan(borrower))?)
    }
}
