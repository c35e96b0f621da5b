//! Credential-gated operations: starting the protocol and changing fees.

use super::core::{Protocol, Services};
use super::results::StartReceipt;
use crate::auth::Credential;
use crate::config::FeeConfig;
use crate::error::{LedgerResult, StateError, ValidationError};
use crate::events::{EventPayload, FeeRecipientUpdatedEvent, FeesUpdatedEvent, StartedEvent};
use crate::pool::PoolState;
use crate::pricing::{mul_div, quote_to_base};
use crate::router::route;
use crate::settlement::{Settlement, Source};
use crate::types::{AccountId, Bps};
use tracing::info;

/// Share of the bootstrap mint burned at start, percent.
pub const BOOTSTRAP_BURN_PCT: u64 = 1;

impl Protocol {
    /// Seed the pool with exactly the configured bootstrap reserve.
    ///
    /// The whole deposit becomes the reserve. It mints at the bootstrap rate, 1% of the mint
    /// is burned and the rest goes to the caller.
    pub fn start(
        &mut self,
        services: &mut Services<'_>,
        credential: &Credential,
        payment: u64,
    ) -> LedgerResult<StartReceipt> {
        Self::authorize(services, credential)?;
        self.transact(services, "start", |p, pending| {
            if p.fees.is_started() {
                return Err(StateError::AlreadyStarted.into());
            }
            if payment != p.config.bootstrap_reserve {
                return Err(ValidationError::BootstrapAmount {
                    expected: p.config.bootstrap_reserve,
                    provided: payment,
                }
                .into());
            }

            let minted = quote_to_base(payment, 0, 0)?;
            let burned = mul_div(minted, BOOTSTRAP_BURN_PCT, 100)?;
            let credited = minted - burned;
            let routing = route(&[payment], &[])?;

            p.pool = PoolState::new(payment, credited);
            p.fees.mark_started();

            pending.settle(Settlement::plan(
                credential.holder,
                vec![Source::Payment { amount: payment }],
                &routing,
                p.fees.fee_recipient(),
            ));
            pending.emit(EventPayload::Started(StartedEvent {
                admin: credential.holder,
                reserve: payment,
                minted,
                burned,
            }));
            p.snapshot(pending)?;
            info!(admin = %credential.holder, reserve = payment, supply = credited, "protocol started");

            Ok(StartReceipt {
                reserve: payment,
                minted_tokens: minted,
                burned_tokens: burned,
                credited_tokens: credited,
            })
        })
    }

    pub fn set_buy_fee(
        &mut self,
        services: &mut Services<'_>,
        credential: &Credential,
        fee: Bps,
    ) -> LedgerResult<()> {
        self.update_fees(services, credential, "set_buy_fee", |fees| fees.set_buy_fee(fee))
    }

    pub fn set_sell_fee(
        &mut self,
        services: &mut Services<'_>,
        credential: &Credential,
        fee: Bps,
    ) -> LedgerResult<()> {
        self.update_fees(services, credential, "set_sell_fee", |fees| fees.set_sell_fee(fee))
    }

    pub fn set_leverage_fee(
        &mut self,
        services: &mut Services<'_>,
        credential: &Credential,
        fee: Bps,
    ) -> LedgerResult<()> {
        self.update_fees(services, credential, "set_leverage_fee", |fees| {
            fees.set_leverage_fee(fee)
        })
    }

    pub fn set_fee_recipient(
        &mut self,
        services: &mut Services<'_>,
        credential: &Credential,
        recipient: AccountId,
    ) -> LedgerResult<()> {
        Self::authorize(services, credential)?;
        self.transact(services, "set_fee_recipient", |p, pending| {
            p.fees.set_fee_recipient(recipient);
            pending.emit(EventPayload::FeeRecipientUpdated(FeeRecipientUpdatedEvent {
                recipient,
            }));
            info!(%recipient, "fee recipient updated");
            Ok(())
        })
    }

    fn update_fees(
        &mut self,
        services: &mut Services<'_>,
        credential: &Credential,
        op: &'static str,
        apply: impl FnOnce(&mut FeeConfig) -> Result<(), ValidationError>,
    ) -> LedgerResult<()> {
        Self::authorize(services, credential)?;
        self.transact(services, op, |p, pending| {
            apply(&mut p.fees)?;
            let fees = &p.fees;
            pending.emit(EventPayload::FeesUpdated(FeesUpdatedEvent {
                buy_fee_bp: fees.buy_fee_bp(),
                sell_fee_bp: fees.sell_fee_bp(),
                leverage_fee_bp: fees.leverage_fee_bp(),
            }));
            info!(
                buy = %fees.buy_fee_bp(),
                sell = %fees.sell_fee_bp(),
                leverage = %fees.leverage_fee_bp(),
                "fees updated"
            );
            Ok(())
        })
    }
}
