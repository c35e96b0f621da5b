//! Buying and selling against the curve, plus read-only quotes.

use super::core::{Protocol, Services};
use super::results::{BuyReceipt, SellReceipt};
use crate::clock::Clock;
use crate::error::{FundsError, LedgerResult, ValidationError};
use crate::events::{EventPayload, TradeEvent};
use crate::pool::{PoolDelta, PoolState};
use crate::pricing::{add, base_to_quote, bps_of, mul_div, quote_to_base, sub};
use crate::router::{route, Destination};
use crate::settlement::{Settlement, Source};
use crate::types::{AccountId, BPS_DENOMINATOR};
use rust_decimal::Decimal;
use tracing::debug;

struct BuyTerms {
    gross: u64,
    tokens: u64,
    fee: u64,
    cut: u64,
}

struct SellTerms {
    payout: u64,
    fee: u64,
    cut: u64,
}

impl Protocol {
    fn buy_terms(&self, pool: PoolState, borrowed: u64, payment: u64) -> LedgerResult<BuyTerms> {
        let backing = pool.backing(borrowed)?;
        let buy_fee = self.fees.buy_fee_bp();
        // the deposit counts as already in the pool when it is priced
        let gross = quote_to_base(payment, add(backing, payment)?, pool.circulating_supply)?;
        let tokens = mul_div(gross, buy_fee.complement().value() as u64, BPS_DENOMINATOR)?;
        let fee = bps_of(payment, buy_fee)?;
        Ok(BuyTerms {
            gross,
            tokens,
            fee,
            cut: self.protocol_cut(fee)?,
        })
    }

    fn sell_terms(&self, pool: PoolState, borrowed: u64, tokens: u64) -> LedgerResult<SellTerms> {
        if tokens >= pool.circulating_supply {
            return Err(ValidationError::DrainsSupply.into());
        }
        let gross = base_to_quote(tokens, pool.backing(borrowed)?, pool.circulating_supply)?;
        let fee = bps_of(gross, self.fees.sell_fee_bp())?;
        Ok(SellTerms {
            payout: sub(gross, fee)?,
            fee,
            cut: self.protocol_cut(fee)?,
        })
    }

    /// Pay `payment` reserve in, receive freshly minted tokens less the buy fee.
    pub fn buy(
        &mut self,
        services: &mut Services<'_>,
        buyer: AccountId,
        payment: u64,
    ) -> LedgerResult<BuyReceipt> {
        self.transact(services, "buy", |p, pending| {
            p.ensure_started()?;
            p.ensure_min_trade(payment)?;

            let terms = p.buy_terms(p.pool, p.ledger.total_borrowed(), payment)?;
            if terms.tokens == 0 {
                return Err(ValidationError::ZeroOutput.into());
            }

            let routing = route(&[payment], &[(Destination::Fee, terms.cut)])?;
            let next = p.pool.adjusted(PoolDelta {
                reserve_in: routing.total_to(Destination::Pool),
                minted: terms.tokens,
                ..PoolDelta::default()
            })?;
            p.ensure_price_holds(next, p.ledger.total_borrowed())?;

            p.pool = next;
            pending.settle(Settlement::plan(
                buyer,
                vec![Source::Payment { amount: payment }],
                &routing,
                p.fees.fee_recipient(),
            ));
            pending.emit(EventPayload::Bought(TradeEvent {
                account_id: buyer,
                reserve_amount: payment,
                tokens: terms.tokens,
                fee: terms.fee,
                protocol_cut: terms.cut,
            }));
            p.snapshot(pending)?;
            debug!(%buyer, payment, tokens = terms.tokens, fee = terms.fee, "buy");

            Ok(BuyReceipt {
                tokens: terms.tokens,
                fee_tokens: terms.gross - terms.tokens,
                protocol_cut: terms.cut,
            })
        })
    }

    /// Burn `tokens` and receive their reserve value less the sell fee.
    pub fn sell(
        &mut self,
        services: &mut Services<'_>,
        seller: AccountId,
        tokens: u64,
    ) -> LedgerResult<SellReceipt> {
        self.transact(services, "sell", |p, pending| {
            p.ensure_started()?;
            p.ensure_min_trade(tokens)?;

            let terms = p.sell_terms(p.pool, p.ledger.total_borrowed(), tokens)?;
            if terms.payout == 0 {
                return Err(ValidationError::ZeroOutput.into());
            }
            let withdrawn = add(terms.payout, terms.cut)?;
            if withdrawn > p.pool.reserve_balance {
                return Err(FundsError::ReserveExhausted {
                    requested: withdrawn,
                    available: p.pool.reserve_balance,
                }
                .into());
            }

            let routing = route(
                &[withdrawn],
                &[(Destination::Fee, terms.cut), (Destination::Payout, terms.payout)],
            )?;
            let next = p.pool.adjusted(PoolDelta {
                reserve_out: withdrawn,
                burned: tokens,
                ..PoolDelta::default()
            })?;
            p.ensure_price_holds(next, p.ledger.total_borrowed())?;

            p.pool = next;
            pending.settle(Settlement::plan(
                seller,
                vec![Source::Withdrawal { amount: withdrawn }],
                &routing,
                p.fees.fee_recipient(),
            ));
            pending.emit(EventPayload::Sold(TradeEvent {
                account_id: seller,
                reserve_amount: terms.payout,
                tokens,
                fee: terms.fee,
                protocol_cut: terms.cut,
            }));
            p.snapshot(pending)?;
            debug!(%seller, tokens, payout = terms.payout, fee = terms.fee, "sell");

            Ok(SellReceipt {
                payout: terms.payout,
                fee: terms.fee,
                protocol_cut: terms.cut,
            })
        })
    }

    /// Tokens a buy of `payment` would receive right now, counting any sweep still due.
    pub fn quote_buy(&self, clock: &dyn Clock, payment: u64) -> LedgerResult<u64> {
        self.ensure_started()?;
        let (pool, borrowed) = self.projected(clock.now())?;
        Ok(self.buy_terms(pool, borrowed, payment)?.tokens)
    }

    /// Reserve a sale of `tokens` would pay out right now, counting any sweep still due.
    pub fn quote_sell(&self, clock: &dyn Clock, tokens: u64) -> LedgerResult<u64> {
        self.ensure_started()?;
        let (pool, borrowed) = self.projected(clock.now())?;
        Ok(self.sell_terms(pool, borrowed, tokens)?.payout)
    }

    /// Spot price as the next operation would see it. `None` before start.
    pub fn current_price(&self, clock: &dyn Clock) -> Option<Decimal> {
        let (pool, borrowed) = self.projected(clock.now()).ok()?;
        pool.spot_price(borrowed)
    }
}
