//! Borrowing against held tokens and every loan transition after opening.
//!
//! Collateral is sized against the backing and supply seen after the leading sweep. Each body
//! prices the whole transition and checks the spot price before the ledger is touched, so a
//! ledger call is the first write and the pool update that follows cannot fail.

use super::core::{Pending, Protocol, Services};
use super::results::{BorrowReceipt, CloseReceipt, CollateralReceipt, ExtendReceipt, FlashCloseReceipt};
use crate::error::{FundsError, LedgerResult, MathError, ValidationError};
use crate::events::{
    CloseReason, EventPayload, LoanChange, LoanClosedEvent, LoanKind, LoanOpenedEvent,
    LoanUpdatedEvent,
};
use crate::ledger::MAX_LOAN_DAYS;
use crate::loan::{Collateral, LoanView};
use crate::pool::PoolDelta;
use crate::pricing::{
    add, base_to_quote, interest_fee, midnight, mul_div, mul_u128, quote_to_base_no_trade,
    quote_to_base_no_trade_ceil, sub,
};
use crate::router::{route, Destination};
use crate::settlement::{Settlement, Source};
use crate::types::{AccountId, Timestamp, SECONDS_PER_DAY};
use tracing::debug;

/// Share of the requested amount actually recorded as borrowed, percent.
pub const BORROW_RATIO_PCT: u64 = 99;
/// Collateral value must reach this share of the borrowed amount at sizing, percent.
pub const COLLATERAL_FLOOR_PCT: u64 = 101;

pub(super) fn ensure_duration(days: u64) -> LedgerResult<()> {
    if days > MAX_LOAN_DAYS {
        return Err(ValidationError::DurationTooLong {
            days,
            max: MAX_LOAN_DAYS,
        }
        .into());
    }
    Ok(())
}

/// End date of a loan of `days` days opened at `now`: the day boundary after `now + days`.
pub(super) fn loan_end(now: Timestamp, days: u64) -> Result<Timestamp, MathError> {
    let span = days.checked_mul(SECONDS_PER_DAY).ok_or(MathError::Overflow)?;
    midnight(Timestamp(add(now.as_secs(), span)?))
}

impl Protocol {
    /// Value of `collateral` at `(backing, supply)` must cover `borrowed` with margin.
    pub(super) fn ensure_collateral_floor(
        collateral: u64,
        backing: u64,
        supply: u64,
        borrowed: u64,
    ) -> LedgerResult<()> {
        let value = base_to_quote(collateral, backing, supply)?;
        if mul_u128(value, 100) < mul_u128(borrowed, COLLATERAL_FLOOR_PCT) {
            return Err(FundsError::Undercollateralized { value, borrowed }.into());
        }
        Ok(())
    }

    fn ensure_reserve_covers(&self, withdrawn: u64) -> LedgerResult<()> {
        if withdrawn > self.pool.reserve_balance {
            return Err(FundsError::ReserveExhausted {
                requested: withdrawn,
                available: self.pool.reserve_balance,
            }
            .into());
        }
        Ok(())
    }

    /// Stage the settlement for reserve lent out: protocol cut, then the borrower's share.
    fn stage_disbursement(
        &self,
        pending: &mut Pending,
        borrower: AccountId,
        received: u64,
        cut: u64,
    ) -> LedgerResult<()> {
        let withdrawn = add(received, cut)?;
        let routing = route(
            &[withdrawn],
            &[(Destination::Fee, cut), (Destination::Payout, received)],
        )?;
        pending.settle(Settlement::plan(
            borrower,
            vec![Source::Withdrawal { amount: withdrawn }],
            &routing,
            self.fees.fee_recipient(),
        ));
        Ok(())
    }

    /// Lock tokens and borrow `amount_out` reserve for `days` days.
    ///
    /// Interest is taken up front. Collateral above what the loan needs is handed back.
    pub fn borrow(
        &mut self,
        services: &mut Services<'_>,
        borrower: AccountId,
        collateral_in: u64,
        amount_out: u64,
        days: u64,
    ) -> LedgerResult<BorrowReceipt> {
        self.transact(services, "borrow", |p, pending| {
            p.ensure_started()?;
            p.ensure_min_trade(amount_out)?;
            ensure_duration(days)?;
            p.ledger.ensure_can_open(borrower)?;

            let backing = p.backing()?;
            let supply = p.pool.circulating_supply;
            let fee = interest_fee(amount_out, days)?;
            let required = quote_to_base_no_trade_ceil(amount_out, backing, supply)?;
            if collateral_in < required {
                return Err(FundsError::CollateralShortfall {
                    required,
                    provided: collateral_in,
                }
                .into());
            }

            let borrowed = mul_div(amount_out, BORROW_RATIO_PCT, 100)?;
            Self::ensure_collateral_floor(required, backing, supply, borrowed)?;
            if borrowed <= fee {
                return Err(ValidationError::ZeroOutput.into());
            }
            let received = borrowed - fee;
            let cut = p.protocol_cut(fee)?;
            let withdrawn = add(received, cut)?;
            p.ensure_reserve_covers(withdrawn)?;

            let next = p.pool.adjusted(PoolDelta {
                reserve_out: withdrawn,
                ..PoolDelta::default()
            })?;
            p.ensure_price_holds(next, add(p.ledger.total_borrowed(), borrowed)?)?;
            let end_date = loan_end(pending.now, days)?;

            let loan = p
                .ledger
                .open(borrower, Collateral::lock(required), borrowed, end_date, days)?;
            p.pool = next;

            p.stage_disbursement(pending, borrower, received, cut)?;
            pending.emit(EventPayload::LoanOpened(LoanOpenedEvent {
                loan,
                kind: LoanKind::Borrow,
                fee,
            }));
            p.snapshot(pending)?;
            debug!(%borrower, borrowed, collateral = required, end = %end_date, "borrow");

            Ok(BorrowReceipt {
                loan,
                fee,
                protocol_cut: cut,
                received,
                collateral_locked: required,
                collateral_change: collateral_in - required,
            })
        })
    }

    /// Borrow `extra_out` more against an open loan, keeping its end date.
    ///
    /// Headroom already in the loan's collateral counts toward the new requirement; only
    /// the shortfall is taken from `extra_in`.
    pub fn borrow_more(
        &mut self,
        services: &mut Services<'_>,
        borrower: AccountId,
        extra_in: u64,
        extra_out: u64,
    ) -> LedgerResult<BorrowReceipt> {
        self.transact(services, "borrow_more", |p, pending| {
            p.ensure_started()?;
            p.ensure_min_trade(extra_out)?;

            let loan = p.ledger.active_loan(borrower, pending.now)?;
            let days = loan
                .end_date
                .as_secs()
                .saturating_sub(midnight(pending.now)?.as_secs())
                / SECONDS_PER_DAY;

            let backing = p.backing()?;
            let supply = p.pool.circulating_supply;
            let fee = interest_fee(extra_out, days)?;
            let required = quote_to_base_no_trade_ceil(extra_out, backing, supply)?;
            let borrowed_tokens = quote_to_base_no_trade(loan.borrowed, backing, supply)?;
            let headroom = mul_div(loan.collateral(), BORROW_RATIO_PCT, 100)?
                .saturating_sub(borrowed_tokens);
            let need = required.saturating_sub(headroom);
            if extra_in < need {
                return Err(FundsError::CollateralShortfall {
                    required: need,
                    provided: extra_in,
                }
                .into());
            }

            let new_borrow = mul_div(extra_out, BORROW_RATIO_PCT, 100)?;
            if new_borrow <= fee {
                return Err(ValidationError::ZeroOutput.into());
            }
            let received = new_borrow - fee;
            let cut = p.protocol_cut(fee)?;
            let withdrawn = add(received, cut)?;
            p.ensure_reserve_covers(withdrawn)?;

            let next = p.pool.adjusted(PoolDelta {
                reserve_out: withdrawn,
                ..PoolDelta::default()
            })?;
            p.ensure_price_holds(next, add(p.ledger.total_borrowed(), new_borrow)?)?;

            let loan = p
                .ledger
                .increase(borrower, pending.now, new_borrow, Collateral::lock(need))?;
            p.pool = next;

            p.stage_disbursement(pending, borrower, received, cut)?;
            pending.emit(EventPayload::LoanUpdated(LoanUpdatedEvent {
                loan,
                change: LoanChange::BorrowedMore,
            }));
            p.snapshot(pending)?;
            debug!(%borrower, new_borrow, collateral_added = need, "borrow_more");

            Ok(BorrowReceipt {
                loan,
                fee,
                protocol_cut: cut,
                received,
                collateral_locked: need,
                collateral_change: extra_in - need,
            })
        })
    }

    /// Pay down part of a loan. The whole payment goes to the pool.
    pub fn repay(
        &mut self,
        services: &mut Services<'_>,
        borrower: AccountId,
        payment: u64,
    ) -> LedgerResult<LoanView> {
        self.transact(services, "repay", |p, pending| {
            p.ensure_started()?;
            let next = p.pool.adjusted(PoolDelta {
                reserve_in: payment,
                ..PoolDelta::default()
            })?;
            p.ensure_price_holds(next, p.ledger.total_borrowed().saturating_sub(payment))?;

            let loan = p.ledger.partial_repay(borrower, pending.now, payment)?;
            p.pool = next;

            p.stage_repayment(pending, borrower, payment)?;
            pending.emit(EventPayload::LoanUpdated(LoanUpdatedEvent {
                loan,
                change: LoanChange::Repaid,
            }));
            p.snapshot(pending)?;
            debug!(%borrower, payment, remaining = loan.borrowed, "repay");
            Ok(loan)
        })
    }

    /// Repay the loan in full and take the collateral back.
    pub fn close(
        &mut self,
        services: &mut Services<'_>,
        borrower: AccountId,
        payment: u64,
    ) -> LedgerResult<CloseReceipt> {
        self.transact(services, "close", |p, pending| {
            p.ensure_started()?;
            let next = p.pool.adjusted(PoolDelta {
                reserve_in: payment,
                ..PoolDelta::default()
            })?;
            p.ensure_price_holds(next, p.ledger.total_borrowed().saturating_sub(payment))?;

            let closed = p.ledger.close(borrower, pending.now, payment)?;
            p.pool = next;

            p.stage_repayment(pending, borrower, payment)?;
            pending.emit(EventPayload::LoanClosed(LoanClosedEvent {
                loan: closed.loan,
                reason: CloseReason::Repaid,
            }));
            p.snapshot(pending)?;
            debug!(%borrower, payment, released = closed.collateral_released, "close");

            Ok(CloseReceipt {
                loan: closed.loan,
                collateral_released: closed.collateral_released,
            })
        })
    }

    fn stage_repayment(&self, pending: &mut Pending, borrower: AccountId, payment: u64) -> LedgerResult<()> {
        let routing = route(&[payment], &[])?;
        pending.settle(Settlement::plan(
            borrower,
            vec![Source::Payment { amount: payment }],
            &routing,
            self.fees.fee_recipient(),
        ));
        Ok(())
    }

    /// Close the loan out of its own collateral.
    ///
    /// The collateral is valued at spot and burned; a 1% closing fee comes off that value,
    /// the debt is settled from the rest and whatever remains is paid to the borrower.
    pub fn flash_close(
        &mut self,
        services: &mut Services<'_>,
        borrower: AccountId,
    ) -> LedgerResult<FlashCloseReceipt> {
        self.transact(services, "flash_close", |p, pending| {
            p.ensure_started()?;
            let loan = p.ledger.active_loan(borrower, pending.now)?;
            let value = base_to_quote(loan.collateral(), p.backing()?, p.pool.circulating_supply)?;
            let terms = p.ledger.flash_close_terms(borrower, pending.now, value)?;

            let cut = p.protocol_cut(terms.closing_fee)?;
            let withdrawn = add(terms.surplus, cut)?;
            p.ensure_reserve_covers(withdrawn)?;
            let next = p.pool.adjusted(PoolDelta {
                reserve_out: withdrawn,
                burned: terms.collateral_burned,
                ..PoolDelta::default()
            })?;
            p.ensure_price_holds(next, sub(p.ledger.total_borrowed(), terms.loan.borrowed)?)?;

            let closed = p.ledger.flash_close(borrower, pending.now, value)?;
            p.pool = next;

            p.stage_disbursement(pending, borrower, closed.surplus, cut)?;
            pending.emit(EventPayload::LoanClosed(LoanClosedEvent {
                loan: closed.loan,
                reason: CloseReason::FlashClosed,
            }));
            p.snapshot(pending)?;
            debug!(%borrower, burned = closed.collateral_burned, payout = closed.surplus, "flash_close");

            Ok(FlashCloseReceipt {
                loan: closed.loan,
                collateral_burned: closed.collateral_burned,
                collateral_value: closed.collateral_value,
                fee: closed.closing_fee,
                protocol_cut: cut,
                payout: closed.surplus,
            })
        })
    }

    /// Push the end date out by `days` days. `payment` must be exactly the interest due.
    pub fn extend(
        &mut self,
        services: &mut Services<'_>,
        borrower: AccountId,
        payment: u64,
        days: u64,
    ) -> LedgerResult<ExtendReceipt> {
        self.transact(services, "extend", |p, pending| {
            p.ensure_started()?;
            if days == 0 {
                return Err(ValidationError::ZeroAmount.into());
            }
            ensure_duration(days)?;

            let cut = p.protocol_cut(payment)?;
            let routing = route(&[payment], &[(Destination::Fee, cut)])?;
            let next = p.pool.adjusted(PoolDelta {
                reserve_in: routing.total_to(Destination::Pool),
                ..PoolDelta::default()
            })?;
            p.ensure_price_holds(next, p.ledger.total_borrowed())?;

            let loan = p.ledger.extend(borrower, pending.now, days, payment)?;
            p.pool = next;

            pending.settle(Settlement::plan(
                borrower,
                vec![Source::Payment { amount: payment }],
                &routing,
                p.fees.fee_recipient(),
            ));
            pending.emit(EventPayload::LoanUpdated(LoanUpdatedEvent {
                loan,
                change: LoanChange::Extended,
            }));
            p.snapshot(pending)?;
            debug!(%borrower, days, end = %loan.end_date, "extend");

            Ok(ExtendReceipt {
                loan,
                fee: payment,
                protocol_cut: cut,
            })
        })
    }

    /// Take back collateral the loan does not need.
    pub fn remove_collateral(
        &mut self,
        services: &mut Services<'_>,
        borrower: AccountId,
        amount: u64,
    ) -> LedgerResult<CollateralReceipt> {
        self.transact(services, "remove_collateral", |p, pending| {
            p.ensure_started()?;
            let backing = p.backing()?;
            let supply = p.pool.circulating_supply;

            let (loan, released) = p.ledger.remove_collateral(borrower, pending.now, amount, |tokens| {
                base_to_quote(tokens, backing, supply)
            })?;

            pending.emit(EventPayload::LoanUpdated(LoanUpdatedEvent {
                loan,
                change: LoanChange::CollateralRemoved,
            }));
            p.snapshot(pending)?;
            debug!(%borrower, released, remaining = loan.collateral, "remove_collateral");
            Ok(CollateralReceipt { loan, released })
        })
    }

    /// The borrower's loan, `None` if there is none or a sweep has written it off.
    pub fn loan_of(&self, borrower: AccountId) -> Option<LoanView> {
        self.ledger.loan_view(borrower)
    }
}
