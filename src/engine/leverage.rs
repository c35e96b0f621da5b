//! Leveraged minting: pay only the fees, receive a full position locked as loan collateral.

use super::core::{Protocol, Services};
use super::lending::{ensure_duration, loan_end, BORROW_RATIO_PCT};
use super::results::LeverageReceipt;
use crate::error::{FundsError, LedgerResult, ValidationError};
use crate::events::{EventPayload, LoanKind, LoanOpenedEvent};
use crate::loan::Collateral;
use crate::pool::PoolDelta;
use crate::pricing::{add, leverage_fee, mul_div, quote_to_base_leverage, sub};
use crate::router::{route, Destination};
use crate::settlement::{Settlement, Source};
use crate::types::AccountId;
use tracing::debug;

struct LeverageTerms {
    // mint fee plus interest
    fee: u64,
    // notional left after the fee, the value the minted collateral is worth
    position: u64,
    cut: u64,
    borrowed: u64,
    overcollateral: u64,
}

impl LeverageTerms {
    // what the caller has to pay in
    fn total_fee(&self) -> LedgerResult<u64> {
        Ok(add(self.fee, self.overcollateral)?)
    }

    // backing that leaves the pricing side before the collateral is minted
    fn priced_out(&self) -> LedgerResult<u64> {
        Ok(add(self.cut, self.overcollateral)?)
    }
}

impl Protocol {
    fn leverage_terms(&self, amount: u64, days: u64) -> LedgerResult<LeverageTerms> {
        let fee = leverage_fee(amount, days, self.fees.leverage_fee_bp())?;
        if fee >= amount {
            return Err(ValidationError::ZeroOutput.into());
        }
        let position = amount - fee;
        Ok(LeverageTerms {
            fee,
            position,
            cut: self.protocol_cut(fee)?,
            borrowed: mul_div(position, BORROW_RATIO_PCT, 100)?,
            overcollateral: position / 100,
        })
    }

    /// Reserve a caller must pay to open a leveraged position of `amount` for `days` days.
    pub fn leverage_fee(&self, amount: u64, days: u64) -> LedgerResult<u64> {
        ensure_duration(days)?;
        self.leverage_terms(amount, days)?.total_fee()
    }

    /// Open a leveraged position of notional `amount` for `days` days.
    ///
    /// The caller pays the mint fee, interest and a 1% overcollateralization; anything paid
    /// above that is refunded. Tokens worth the position are minted straight into a new loan
    /// that borrows 99% of it.
    pub fn leverage(
        &mut self,
        services: &mut Services<'_>,
        borrower: AccountId,
        payment: u64,
        amount: u64,
        days: u64,
    ) -> LedgerResult<LeverageReceipt> {
        self.transact(services, "leverage", |p, pending| {
            p.ensure_started()?;
            p.ensure_min_trade(amount)?;
            ensure_duration(days)?;
            p.ledger.ensure_can_open(borrower)?;

            let terms = p.leverage_terms(amount, days)?;
            let total_fee = terms.total_fee()?;
            if payment < total_fee {
                return Err(FundsError::PaymentShortfall {
                    required: total_fee,
                    provided: payment,
                }
                .into());
            }
            let refund = payment - total_fee;

            let backing = add(p.backing()?, total_fee)?;
            let supply = p.pool.circulating_supply;
            let collateral = quote_to_base_leverage(terms.position, terms.priced_out()?, backing, supply)?;
            Self::ensure_collateral_floor(
                collateral,
                sub(backing, terms.priced_out()?)?,
                supply,
                terms.borrowed,
            )?;

            let routing = route(
                &[payment],
                &[(Destination::Fee, terms.cut), (Destination::Payout, refund)],
            )?;
            let next = p.pool.adjusted(PoolDelta {
                reserve_in: routing.total_to(Destination::Pool),
                minted: collateral,
                ..PoolDelta::default()
            })?;
            p.ensure_price_holds(next, add(p.ledger.total_borrowed(), terms.borrowed)?)?;
            let end_date = loan_end(pending.now, days)?;

            let loan = p.ledger.open(
                borrower,
                Collateral::lock(collateral),
                terms.borrowed,
                end_date,
                days,
            )?;
            p.pool = next;

            pending.settle(Settlement::plan(
                borrower,
                vec![Source::Payment { amount: payment }],
                &routing,
                p.fees.fee_recipient(),
            ));
            pending.emit(EventPayload::LoanOpened(LoanOpenedEvent {
                loan,
                kind: LoanKind::Leverage,
                fee: total_fee,
            }));
            p.snapshot(pending)?;
            debug!(%borrower, amount, collateral, borrowed = terms.borrowed, "leverage");

            Ok(LeverageReceipt {
                loan,
                total_fee,
                protocol_cut: terms.cut,
                refund,
                collateral_minted: collateral,
            })
        })
    }
}
