// 8.0 engine/core.rs: the protocol. owns pool state, the loan ledger and live fees.
// 8.1 every public operation runs through `transact`: read the clock, sweep expired buckets,
// run the body, then either commit (settle value, flush events) or roll the sweep back.

use super::results::SweepReport;
use crate::auth::{Authorizer, Credential};
use crate::clock::Clock;
use crate::config::{ConfigError, FeeConfig, ProtocolConfig};
use crate::error::{LedgerResult, StateError, ValidationError};
use crate::events::{
    AggregatesChangedEvent, Event, EventId, EventPayload, EventSink, LiquidationSweptEvent,
    PriceUpdatedEvent,
};
use crate::ledger::LoanLedger;
use crate::pool::PoolState;
use crate::pricing::{bps_of, price_not_decreased, sub};
use crate::scheduler::SweepOutcome;
use crate::settlement::{Settlement, ValueTransfer};
use crate::types::Timestamp;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

/// Collaborators an operation needs, borrowed for the length of one call.
pub struct Services<'a> {
    pub clock: &'a dyn Clock,
    pub vault: &'a mut dyn ValueTransfer,
    pub events: &'a mut dyn EventSink,
    pub authorizer: &'a dyn Authorizer,
}

/** 8.2: main protocol struct. all ledger state lives here */
#[derive(Debug)]
pub struct Protocol {
    pub(super) config: ProtocolConfig,
    pub(super) fees: FeeConfig,
    pub(super) pool: PoolState,
    pub(super) ledger: LoanLedger,
    pub(super) next_event_id: u64,
}

// Work an operation has staged but not yet handed to collaborators
#[derive(Debug)]
pub(super) struct Pending {
    pub(super) now: Timestamp,
    sweep: Option<SweepOutcome>,
    events: Vec<EventPayload>,
    settlements: Vec<Settlement>,
}

impl Pending {
    fn new(now: Timestamp) -> Self {
        Self {
            now,
            sweep: None,
            events: Vec::new(),
            settlements: Vec::new(),
        }
    }

    pub(super) fn emit(&mut self, payload: EventPayload) {
        self.events.push(payload);
    }

    pub(super) fn settle(&mut self, settlement: Settlement) {
        if !settlement.is_empty() {
            self.settlements.push(settlement);
        }
    }

    pub(super) fn swept(&self) -> Option<&SweepOutcome> {
        self.sweep.as_ref().filter(|s| !s.is_empty())
    }
}

impl Protocol {
    /// Fresh, not-yet-started protocol. The sweep watermark starts at the first day boundary
    /// after `genesis`.
    pub fn new(config: ProtocolConfig, genesis: Timestamp) -> Result<Self, ConfigError> {
        config.validate()?;
        let ledger = LoanLedger::new(genesis).map_err(|_| ConfigError::InvalidLimits {
            reason: format!("genesis {genesis} has no following day boundary"),
        })?;
        Ok(Self {
            fees: FeeConfig::from_config(&config),
            config,
            pool: PoolState::default(),
            ledger,
            next_event_id: 1,
        })
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn fees(&self) -> &FeeConfig {
        &self.fees
    }

    pub fn pool(&self) -> PoolState {
        self.pool
    }

    pub fn ledger(&self) -> &LoanLedger {
        &self.ledger
    }

    pub fn is_started(&self) -> bool {
        self.fees.is_started()
    }

    /// Reserve plus everything currently lent out.
    pub fn backing(&self) -> LedgerResult<u64> {
        Ok(self.pool.backing(self.ledger.total_borrowed())?)
    }

    /// Spot price as of the last committed operation, ignoring any sweep still due.
    pub fn spot_price(&self) -> Option<Decimal> {
        self.pool.spot_price(self.ledger.total_borrowed())
    }

    pub(super) fn ensure_started(&self) -> LedgerResult<()> {
        if self.fees.is_started() {
            Ok(())
        } else {
            Err(StateError::NotStarted.into())
        }
    }

    pub(super) fn ensure_min_trade(&self, amount: u64) -> LedgerResult<()> {
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        if amount < self.config.min_trade {
            return Err(ValidationError::BelowMinimum {
                amount,
                minimum: self.config.min_trade,
            }
            .into());
        }
        Ok(())
    }

    pub(super) fn authorize(services: &Services<'_>, credential: &Credential) -> LedgerResult<()> {
        if services.authorizer.verify(credential) {
            return Ok(());
        }
        warn!(holder = %credential.holder, "credential rejected");
        Err(ValidationError::Unauthorized.into())
    }

    /// Fee recipient's cut of a fee. The rest of the fee stays in the pool.
    pub(super) fn protocol_cut(&self, fee: u64) -> LedgerResult<u64> {
        Ok(bps_of(fee, self.config.protocol_share_bp)?)
    }

    /// Reject a transition that would lower the spot price.
    pub(super) fn ensure_price_holds(&self, next_pool: PoolState, next_borrowed: u64) -> LedgerResult<()> {
        let prev = (self.backing()?, self.pool.circulating_supply);
        let next = (next_pool.backing(next_borrowed)?, next_pool.circulating_supply);
        if price_not_decreased(prev, next) {
            Ok(())
        } else {
            Err(StateError::PriceDecreased.into())
        }
    }

    /// Pool and total borrowed as the next operation would see them after its sweep.
    pub(super) fn projected(&self, now: Timestamp) -> LedgerResult<(PoolState, u64)> {
        let due = self.ledger.scheduler().pending(now)?;
        let totals = self.ledger.projected_totals(now)?;
        let pool = PoolState::new(
            self.pool.reserve_balance,
            sub(self.pool.circulating_supply, due.collateral)?,
        );
        Ok((pool, totals.borrowed))
    }

    /// Stage price and aggregate snapshots of the state just committed.
    pub(super) fn snapshot(&self, pending: &mut Pending) -> LedgerResult<()> {
        pending.emit(EventPayload::PriceUpdated(PriceUpdatedEvent {
            backing: self.backing()?,
            supply: self.pool.circulating_supply,
            price: self.spot_price(),
        }));
        pending.emit(EventPayload::AggregatesChanged(AggregatesChangedEvent {
            total_borrowed: self.ledger.total_borrowed(),
            total_collateral: self.ledger.total_collateral(),
        }));
        Ok(())
    }

    pub(super) fn transact<R>(
        &mut self,
        services: &mut Services<'_>,
        op: &'static str,
        body: impl FnOnce(&mut Self, &mut Pending) -> LedgerResult<R>,
    ) -> LedgerResult<R> {
        self.run(services, op, true, body)
    }

    /// Same as [`Protocol::transact`] without the leading sweep.
    pub(super) fn transact_unswept<R>(
        &mut self,
        services: &mut Services<'_>,
        op: &'static str,
        body: impl FnOnce(&mut Self, &mut Pending) -> LedgerResult<R>,
    ) -> LedgerResult<R> {
        self.run(services, op, false, body)
    }

    fn run<R>(
        &mut self,
        services: &mut Services<'_>,
        op: &'static str,
        sweep: bool,
        body: impl FnOnce(&mut Self, &mut Pending) -> LedgerResult<R>,
    ) -> LedgerResult<R> {
        let mut pending = Pending::new(services.clock.now());

        let result = if sweep {
            self.sweep(&mut pending).and_then(|()| body(self, &mut pending))
        } else {
            body(self, &mut pending)
        };

        match result {
            Ok(value) => {
                self.commit(services, op, pending);
                Ok(value)
            }
            Err(err) => {
                if let Some(outcome) = pending.sweep.take() {
                    self.undo_sweep(outcome);
                }
                warn!(op, category = err.category(), error = %err, "operation rejected");
                Err(err)
            }
        }
    }

    /// Collect every bucket before `now`, write it off and burn its collateral.
    fn sweep(&mut self, pending: &mut Pending) -> LedgerResult<()> {
        let due = self.ledger.scheduler().pending(pending.now)?;
        let supply = sub(self.pool.circulating_supply, due.collateral)?;
        let outcome = self.ledger.sweep(pending.now)?;
        self.pool.circulating_supply = supply;

        if !outcome.is_empty() {
            pending.emit(EventPayload::LiquidationSwept(LiquidationSweptEvent {
                from: outcome.from,
                to: outcome.to,
                borrowed: outcome.expired.borrowed,
                collateral: outcome.expired.collateral,
            }));
        }
        pending.sweep = Some(outcome);
        Ok(())
    }

    fn undo_sweep(&mut self, outcome: SweepOutcome) {
        self.pool.circulating_supply = self
            .pool
            .circulating_supply
            .saturating_add(outcome.expired.collateral);
        self.ledger.undo_sweep(outcome);
    }

    fn commit(&mut self, services: &mut Services<'_>, op: &'static str, pending: Pending) {
        if let Some(outcome) = pending.swept() {
            let pruned = self.ledger.prune_swept();
            info!(
                from = %outcome.from,
                to = %outcome.to,
                borrowed = outcome.expired.borrowed,
                collateral = outcome.expired.collateral,
                pruned,
                "liquidation sweep"
            );
        }

        for settlement in pending.settlements {
            if let Err(err) = settlement.execute(&mut *services.vault) {
                error!(op, error = %err, "settlement incomplete");
            }
        }

        for payload in pending.events {
            let event = Event::new(EventId(self.next_event_id), pending.now, payload);
            self.next_event_id += 1;
            debug!(id = event.id.0, kind = event.payload.kind(), "event");
            services.events.emit(event);
        }
    }

    pub(super) fn report(pending: &Pending) -> SweepReport {
        pending
            .sweep
            .as_ref()
            .map(SweepReport::from)
            .unwrap_or_default()
    }
}
