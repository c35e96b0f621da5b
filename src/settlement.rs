// 9.1 settlement.rs: turns a routing plan into value-transfer legs and executes them.
// the in-memory vault stands in for whatever actually custodies the reserve asset.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::router::{Destination, Routing};
use crate::types::AccountId;

/// An amount of the reserve asset in flight between a source and a destination.
///
/// Not `Clone` and must be consumed: every `Value` taken from somewhere is put somewhere.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "value must be deposited or paid out"]
pub struct Value(u64);

impl Value {
    pub fn new(amount: u64) -> Self {
        Self(amount)
    }

    pub fn amount(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Take `amount` off this value, `None` if it does not hold that much.
    pub fn split_off(&mut self, amount: u64) -> Option<Value> {
        self.0 = self.0.checked_sub(amount)?;
        Some(Value(amount))
    }

    pub fn into_amount(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettlementError {
    #[error("pool holds {available}, withdrawal needs {requested}")]
    PoolShortfall { requested: u64, available: u64 },

    #[error("leg of {leg} exceeds the {remaining} left in fragment {fragment}")]
    UnfundedLeg {
        fragment: usize,
        leg: u64,
        remaining: u64,
    },
}

/// Moves reserve value between callers and the pool. Transfers are exact: a withdrawal the
/// pool cannot cover fails whole and moves nothing.
pub trait ValueTransfer {
    /// Take a payment fragment from `from`.
    fn collect(&mut self, from: AccountId, amount: u64) -> Value;
    /// Take `amount` out of the pool reserve.
    fn withdraw(&mut self, amount: u64) -> Result<Value, SettlementError>;
    /// Put value into the pool reserve.
    fn deposit(&mut self, value: Value);
    /// Hand value to an account.
    fn pay(&mut self, to: AccountId, value: Value);
}

// Where each fragment of a settlement comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Source {
    // paid in by the caller
    Payment { amount: u64 },
    // drawn from the pool reserve
    Withdrawal { amount: u64 },
}

impl Source {
    pub fn amount(&self) -> u64 {
        match self {
            Source::Payment { amount } | Source::Withdrawal { amount } => *amount,
        }
    }
}

// One movement: a piece of a source fragment headed to one destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leg {
    pub fragment: usize,
    pub destination: Destination,
    // receiving account, None when the destination is the pool
    pub account: Option<AccountId>,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub payer: AccountId,
    pub sources: Vec<Source>,
    pub legs: Vec<Leg>,
}

impl Settlement {
    /// Bind a routing to concrete accounts. Payouts go back to `payer`, fees to `fee_recipient`.
    pub fn plan(
        payer: AccountId,
        sources: Vec<Source>,
        routing: &Routing,
        fee_recipient: AccountId,
    ) -> Self {
        let legs = routing
            .allocations
            .iter()
            .map(|a| Leg {
                fragment: a.fragment,
                destination: a.destination,
                account: match a.destination {
                    Destination::Fee => Some(fee_recipient),
                    Destination::Payout => Some(payer),
                    Destination::Pool => None,
                },
                amount: a.amount,
            })
            .collect();

        Self {
            payer,
            sources,
            legs,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    pub fn total_to(&self, destination: Destination) -> u64 {
        self.legs
            .iter()
            .filter(|l| l.destination == destination)
            .map(|l| l.amount)
            .sum()
    }

    // (deposited into, withdrawn from) the pool reserve once this settlement runs
    pub fn pool_delta(&self) -> (u64, u64) {
        let withdrawn = self
            .sources
            .iter()
            .filter(|s| matches!(s, Source::Withdrawal { .. }))
            .map(Source::amount)
            .sum();
        (self.total_to(Destination::Pool), withdrawn)
    }

    /// Draw each source once and hand its pieces out in routing order.
    ///
    /// Stops at the first source or leg that cannot be funded. Sources already drawn stay
    /// settled and an unfunded remainder goes back to the pool.
    pub fn execute(self, transfer: &mut dyn ValueTransfer) -> Result<(), SettlementError> {
        let mut legs = self.legs.into_iter().peekable();
        for (index, source) in self.sources.into_iter().enumerate() {
            let mut value = match source {
                Source::Payment { amount } => transfer.collect(self.payer, amount),
                Source::Withdrawal { amount } => transfer.withdraw(amount)?,
            };

            while let Some(leg) = legs.next_if(|l| l.fragment == index) {
                let Some(piece) = value.split_off(leg.amount) else {
                    let remaining = value.amount();
                    transfer.deposit(value);
                    return Err(SettlementError::UnfundedLeg {
                        fragment: index,
                        leg: leg.amount,
                        remaining,
                    });
                };
                match leg.account {
                    Some(account) => transfer.pay(account, piece),
                    None => transfer.deposit(piece),
                }
            }

            // routing conserves every fragment, so this is always empty
            debug_assert!(value.is_zero());
            if !value.is_zero() {
                transfer.deposit(value);
            }
        }
        Ok(())
    }
}

// In-memory custody. tracks the pool and what every account paid in and received.
#[derive(Debug, Default, Clone)]
pub struct InMemoryVault {
    pool: u64,
    paid_in: HashMap<AccountId, u64>,
    received: HashMap<AccountId, u64>,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pool(&self) -> u64 {
        self.pool
    }

    pub fn paid_in(&self, account: AccountId) -> u64 {
        self.paid_in.get(&account).copied().unwrap_or(0)
    }

    pub fn received(&self, account: AccountId) -> u64 {
        self.received.get(&account).copied().unwrap_or(0)
    }

    // received minus paid in
    pub fn net_of(&self, account: AccountId) -> i128 {
        self.received(account) as i128 - self.paid_in(account) as i128
    }
}

impl ValueTransfer for InMemoryVault {
    fn collect(&mut self, from: AccountId, amount: u64) -> Value {
        *self.paid_in.entry(from).or_insert(0) += amount;
        Value::new(amount)
    }

    fn withdraw(&mut self, amount: u64) -> Result<Value, SettlementError> {
        self.pool = self
            .pool
            .checked_sub(amount)
            .ok_or(SettlementError::PoolShortfall {
                requested: amount,
                available: self.pool,
            })?;
        Ok(Value::new(amount))
    }

    fn deposit(&mut self, value: Value) {
        self.pool += value.into_amount();
    }

    fn pay(&mut self, to: AccountId, value: Value) {
        *self.received.entry(to).or_insert(0) += value.into_amount();
    }
}
