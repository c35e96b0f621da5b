// 11.0: every committed state change produces events. the EventPayload enum lists them all.
// operations buffer payloads while they run and only hand them to the sink after commit, so a
// rejected operation never shows up here.

use crate::loan::LoanView;
use crate::types::{AccountId, Bps, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    // Lifecycle
    Started(StartedEvent),

    // Trade events
    Bought(TradeEvent),
    Sold(TradeEvent),

    // Loan events
    LoanOpened(LoanOpenedEvent),
    LoanUpdated(LoanUpdatedEvent),
    LoanClosed(LoanClosedEvent),
    LiquidationSwept(LiquidationSweptEvent),

    // Market data events
    PriceUpdated(PriceUpdatedEvent),
    AggregatesChanged(AggregatesChangedEvent),

    // Admin events
    FeesUpdated(FeesUpdatedEvent),
    FeeRecipientUpdated(FeeRecipientUpdatedEvent),
}

impl EventPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::Started(_) => "started",
            EventPayload::Bought(_) => "bought",
            EventPayload::Sold(_) => "sold",
            EventPayload::LoanOpened(_) => "loan_opened",
            EventPayload::LoanUpdated(_) => "loan_updated",
            EventPayload::LoanClosed(_) => "loan_closed",
            EventPayload::LiquidationSwept(_) => "liquidation_swept",
            EventPayload::PriceUpdated(_) => "price_updated",
            EventPayload::AggregatesChanged(_) => "aggregates_changed",
            EventPayload::FeesUpdated(_) => "fees_updated",
            EventPayload::FeeRecipientUpdated(_) => "fee_recipient_updated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedEvent {
    pub admin: AccountId,
    pub reserve: u64,
    pub minted: u64,
    pub burned: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub account_id: AccountId,
    // reserve paid in on a buy, paid out on a sell
    pub reserve_amount: u64,
    // tokens minted on a buy, burned on a sell
    pub tokens: u64,
    pub fee: u64,
    pub protocol_cut: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanKind {
    Borrow,
    Leverage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanOpenedEvent {
    pub loan: LoanView,
    pub kind: LoanKind,
    pub fee: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanChange {
    BorrowedMore,
    Repaid,
    Extended,
    CollateralRemoved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanUpdatedEvent {
    pub loan: LoanView,
    pub change: LoanChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    Repaid,
    FlashClosed,
    Liquidated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanClosedEvent {
    pub loan: LoanView,
    pub reason: CloseReason,
}

// one record per non-empty sweep, covering days [from, to)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationSweptEvent {
    pub from: Timestamp,
    pub to: Timestamp,
    pub borrowed: u64,
    pub collateral: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdatedEvent {
    pub backing: u64,
    pub supply: u64,
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatesChangedEvent {
    pub total_borrowed: u64,
    pub total_collateral: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeesUpdatedEvent {
    pub buy_fee_bp: Bps,
    pub sell_fee_bp: Bps,
    pub leverage_fee_bp: Bps,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRecipientUpdatedEvent {
    pub recipient: AccountId,
}

/// Receives committed events. Best-effort: a sink cannot reject an event.
pub trait EventSink {
    fn emit(&mut self, event: Event);
}

/// Keeps the most recent `capacity` events in memory.
#[derive(Debug)]
pub struct EventCollector {
    events: VecDeque<Event>,
    capacity: usize,
    dropped: u64,
}

impl EventCollector {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last(&self) -> Option<&Event> {
        self.events.back()
    }

    /// Events evicted to stay under capacity.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn count_of(&self, kind: &str) -> usize {
        self.events.iter().filter(|e| e.payload.kind() == kind).count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Default for EventCollector {
    fn default() -> Self {
        Self::new(100_000)
    }
}

impl EventSink for EventCollector {
    fn emit(&mut self, event: Event) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
    }
}
