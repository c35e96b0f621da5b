//! Multi-fragment fee routing.
//!
//! A payment arrives as an ordered list of fragments. The router walks them once, filling
//! each named destination in order and splitting a fragment only where it straddles a
//! destination boundary. Whatever is left once every destination is full goes to the pool.
//! The output is a plan of allocations; nothing moves until a settlement executes it.

use crate::error::{FundsError, LedgerError, MathError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Destination {
    /// Protocol cut, paid to the fee recipient.
    Fee,
    /// Paid back to the caller.
    Payout,
    /// Stays in (or goes into) the pool reserve.
    Pool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub fragment: usize,
    pub destination: Destination,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("destinations need {required}, fragments only carry {available}")]
    Shortfall { required: u64, available: u64 },

    #[error("routing totals overflow")]
    Overflow,
}

impl From<RouteError> for LedgerError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::Shortfall {
                required,
                available,
            } => FundsError::PaymentShortfall {
                required,
                provided: available,
            }
            .into(),
            RouteError::Overflow => MathError::Overflow.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Routing {
    pub allocations: Vec<Allocation>,
}

impl Routing {
    pub fn total_to(&self, destination: Destination) -> u64 {
        self.allocations
            .iter()
            .filter(|a| a.destination == destination)
            .map(|a| a.amount)
            .sum()
    }

    pub fn total(&self) -> u64 {
        self.allocations.iter().map(|a| a.amount).sum()
    }

    /// Allocations drawn from one fragment, in routing order.
    pub fn pieces_of(&self, fragment: usize) -> impl Iterator<Item = &Allocation> {
        self.allocations.iter().filter(move |a| a.fragment == fragment)
    }
}

pub fn checked_total(amounts: impl IntoIterator<Item = u64>) -> Result<u64, RouteError> {
    amounts
        .into_iter()
        .try_fold(0u64, |acc, x| acc.checked_add(x))
        .ok_or(RouteError::Overflow)
}

/// Plan how `fragments` cover `destinations`.
///
/// Each destination receives exactly its amount or the whole call fails. Zero-amount
/// fragments and destinations are skipped.
pub fn route(fragments: &[u64], destinations: &[(Destination, u64)]) -> Result<Routing, RouteError> {
    let available = checked_total(fragments.iter().copied())?;
    let required = checked_total(destinations.iter().map(|(_, amount)| *amount))?;
    if required > available {
        return Err(RouteError::Shortfall {
            required,
            available,
        });
    }

    let mut allocations = Vec::with_capacity(fragments.len() + destinations.len());
    let mut pending = destinations.iter().copied().filter(|(_, amount)| *amount > 0);
    let mut current = pending.next();

    for (index, &fragment) in fragments.iter().enumerate() {
        let mut left = fragment;
        while left > 0 {
            let Some((destination, need)) = current.as_mut() else {
                allocations.push(Allocation {
                    fragment: index,
                    destination: Destination::Pool,
                    amount: left,
                });
                break;
            };

            let take = left.min(*need);
            allocations.push(Allocation {
                fragment: index,
                destination: *destination,
                amount: take,
            });
            left -= take;
            *need -= take;
            if *need == 0 {
                current = pending.next();
            }
        }
    }

    Ok(Routing { allocations })
}
