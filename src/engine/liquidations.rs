//! Forced liquidation of expired loans.

use super::core::{Protocol, Services};
use super::results::{LiquidationReceipt, SweepReport};
use crate::error::{LedgerResult, StateError};
use crate::events::{CloseReason, EventPayload, LoanClosedEvent};
use crate::pool::PoolDelta;
use crate::types::AccountId;
use tracing::debug;

impl Protocol {
    /// Run the sweep on its own. Nothing due is a no-op, not an error.
    pub fn liquidate_sweep(&mut self, services: &mut Services<'_>) -> LedgerResult<SweepReport> {
        self.transact(services, "liquidate_sweep", |p, pending| {
            if pending.swept().is_some() {
                p.snapshot(pending)?;
            }
            Ok(Self::report(pending))
        })
    }

    /// Liquidate one named borrower whose loan is past its end date.
    ///
    /// Only that loan's bucket is touched; the calendar is not walked. Once a committed sweep
    /// has covered the loan its record is gone and this reports `NoLoan`.
    pub fn liquidate_one(
        &mut self,
        services: &mut Services<'_>,
        borrower: AccountId,
    ) -> LedgerResult<LiquidationReceipt> {
        self.transact_unswept(services, "liquidate_one", |p, pending| {
            let loan = p
                .ledger
                .loan(borrower)
                .ok_or(StateError::NoLoan(borrower))?;
            let already_swept = p.ledger.is_stale(loan);
            let next = if already_swept {
                p.pool
            } else {
                p.pool.adjusted(PoolDelta {
                    burned: loan.collateral(),
                    ..PoolDelta::default()
                })?
            };

            let liquidated = p.ledger.liquidate(borrower, pending.now)?;
            p.pool = next;

            pending.emit(EventPayload::LoanClosed(LoanClosedEvent {
                loan: liquidated.loan,
                reason: CloseReason::Liquidated,
            }));
            if !already_swept {
                p.snapshot(pending)?;
            }
            debug!(
                %borrower,
                collateral = liquidated.collateral_forfeited,
                already_swept,
                "liquidate_one"
            );

            Ok(LiquidationReceipt {
                loan: liquidated.loan,
                collateral_burned: liquidated.collateral_forfeited,
                already_swept: liquidated.already_swept,
            })
        })
    }
}
