//! Lifecycle tests
//!
//! Walk the protocol through start, trading, every loan transition and liquidation,
//! checking receipts, ledger state and the error each misuse produces.

use curve_ledger::*;

const ADMIN: AccountId = AccountId(1);
const ALICE: AccountId = AccountId(2);
const BOB: AccountId = AccountId(3);

fn genesis() -> Timestamp {
    Timestamp::from_secs(20_000 * SECONDS_PER_DAY + 3_600)
}

fn admin() -> Credential {
    Credential::new(ADMIN, "admin-token")
}

fn unstarted() -> (Protocol, InMemoryEnv) {
    let config = ProtocolConfig::default();
    let env = InMemoryEnv::new(&config, genesis(), admin());
    let protocol = Protocol::new(config, genesis()).unwrap();
    (protocol, env)
}

fn started() -> (Protocol, InMemoryEnv) {
    let (mut protocol, mut env) = unstarted();
    protocol
        .start(&mut env.services(), &admin(), 1_000_000)
        .unwrap();
    (protocol, env)
}

/// Bob buys with 200,000 and borrows 100,000 for `days` days.
fn with_loan(days: u64) -> (Protocol, InMemoryEnv, BorrowReceipt) {
    let (mut protocol, mut env) = started();
    let tokens = protocol.buy(&mut env.services(), BOB, 200_000).unwrap().tokens;
    let receipt = protocol
        .borrow(&mut env.services(), BOB, tokens, 100_000, days)
        .unwrap();
    (protocol, env, receipt)
}

mod start_tests {
    use super::*;

    #[test]
    fn start_mints_and_burns_bootstrap_supply() {
        let (mut protocol, mut env) = unstarted();
        let receipt = protocol
            .start(&mut env.services(), &admin(), 1_000_000)
            .unwrap();

        assert_eq!(receipt.minted_tokens, 1_000_000_000_000);
        assert_eq!(receipt.burned_tokens, 10_000_000_000);
        assert_eq!(receipt.credited_tokens, 990_000_000_000);

        let pool = protocol.pool();
        assert_eq!(pool.reserve_balance, 1_000_000);
        assert_eq!(pool.circulating_supply, 990_000_000_000);
        assert!(protocol.is_started());
        assert_eq!(env.vault.pool(), 1_000_000);
        assert_eq!(env.events.count_of("started"), 1);
    }

    #[test]
    fn start_only_once() {
        let (mut protocol, mut env) = started();
        let err = protocol
            .start(&mut env.services(), &admin(), 1_000_000)
            .unwrap_err();
        assert_eq!(err, LedgerError::State(StateError::AlreadyStarted));
        assert_eq!(env.vault.pool(), 1_000_000);
    }

    #[test]
    fn start_needs_exact_bootstrap() {
        let (mut protocol, mut env) = unstarted();
        let err = protocol
            .start(&mut env.services(), &admin(), 999_999)
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::BootstrapAmount {
                expected: 1_000_000,
                provided: 999_999
            })
        ));
        assert!(!protocol.is_started());
    }

    #[test]
    fn start_rejects_foreign_credential() {
        let (mut protocol, mut env) = unstarted();
        let intruder = Credential::new(ALICE, "admin-token");
        let err = protocol
            .start(&mut env.services(), &intruder, 1_000_000)
            .unwrap_err();
        assert_eq!(err, LedgerError::Validation(ValidationError::Unauthorized));
        assert!(env.events.is_empty());
    }

    #[test]
    fn nothing_trades_before_start() {
        let (mut protocol, mut env) = unstarted();
        let not_started = LedgerError::State(StateError::NotStarted);

        assert_eq!(protocol.buy(&mut env.services(), ALICE, 10_000).unwrap_err(), not_started);
        assert_eq!(protocol.sell(&mut env.services(), ALICE, 10_000).unwrap_err(), not_started);
        assert_eq!(
            protocol.borrow(&mut env.services(), ALICE, 10_000, 10_000, 5).unwrap_err(),
            not_started
        );
        assert_eq!(
            protocol.leverage(&mut env.services(), ALICE, 10_000, 100_000, 5).unwrap_err(),
            not_started
        );
        assert_eq!(protocol.quote_buy(&env.clock, 10_000).unwrap_err(), not_started);
        assert_eq!(protocol.current_price(&env.clock), None);
    }
}

mod trading_tests {
    use super::*;

    #[test]
    fn buy_mints_at_curve_price_less_fee() {
        let (mut protocol, mut env) = started();
        let quoted = protocol.quote_buy(&env.clock, 100_000).unwrap();
        let receipt = protocol.buy(&mut env.services(), ALICE, 100_000).unwrap();

        // 100_000 * 990e9 / 1e6 gross, 2.5% kept as fee
        assert_eq!(receipt.tokens, 96_525_000_000);
        assert_eq!(receipt.fee_tokens, 2_475_000_000);
        assert_eq!(receipt.tokens, quoted);
        // 30% of the 2_500 fee
        assert_eq!(receipt.protocol_cut, 750);

        let pool = protocol.pool();
        assert_eq!(pool.reserve_balance, 1_099_250);
        assert_eq!(pool.circulating_supply, 990_000_000_000 + 96_525_000_000);
        assert_eq!(env.vault.received(AccountId(0)), 750);
        assert_eq!(env.vault.paid_in(ALICE), 100_000);
    }

    #[test]
    fn sell_pays_out_less_fee() {
        let (mut protocol, mut env) = started();
        let tokens = protocol.buy(&mut env.services(), ALICE, 100_000).unwrap().tokens;
        let quoted = protocol.quote_sell(&env.clock, tokens / 2).unwrap();
        let before = protocol.pool();

        let receipt = protocol.sell(&mut env.services(), ALICE, tokens / 2).unwrap();
        assert_eq!(receipt.payout, quoted);
        assert_eq!(env.vault.received(ALICE), receipt.payout);

        let after = protocol.pool();
        assert_eq!(
            after.reserve_balance,
            before.reserve_balance - receipt.payout - receipt.protocol_cut
        );
        assert_eq!(after.circulating_supply, before.circulating_supply - tokens / 2);
    }

    #[test]
    fn trade_limits() {
        let (mut protocol, mut env) = started();
        assert!(matches!(
            protocol.buy(&mut env.services(), ALICE, 999).unwrap_err(),
            LedgerError::Validation(ValidationError::BelowMinimum { amount: 999, minimum: 1_000 })
        ));
        assert_eq!(
            protocol.buy(&mut env.services(), ALICE, 0).unwrap_err(),
            LedgerError::Validation(ValidationError::ZeroAmount)
        );

        let supply = protocol.pool().circulating_supply;
        assert_eq!(
            protocol.sell(&mut env.services(), ALICE, supply).unwrap_err(),
            LedgerError::Validation(ValidationError::DrainsSupply)
        );
    }

    #[test]
    fn fee_setters_respect_bounds() {
        let (mut protocol, mut env) = started();

        let err = protocol
            .set_buy_fee(&mut env.services(), &admin(), Bps(79))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::FeeOutOfBounds { .. })
        ));
        assert!(protocol
            .set_sell_fee(&mut env.services(), &admin(), Bps(251))
            .is_err());

        protocol.set_buy_fee(&mut env.services(), &admin(), Bps(100)).unwrap();
        protocol.set_leverage_fee(&mut env.services(), &admin(), Bps(0)).unwrap();
        assert_eq!(protocol.fees().buy_fee_bp(), Bps(100));
        assert_eq!(protocol.fees().leverage_fee_bp(), Bps(0));
        assert_eq!(env.events.count_of("fees_updated"), 2);

        let outsider = Credential::new(BOB, "guess");
        assert_eq!(
            protocol
                .set_fee_recipient(&mut env.services(), &outsider, BOB)
                .unwrap_err(),
            LedgerError::Validation(ValidationError::Unauthorized)
        );
        protocol.set_fee_recipient(&mut env.services(), &admin(), BOB).unwrap();
        assert_eq!(protocol.fees().fee_recipient(), BOB);
    }
}

mod loan_tests {
    use super::*;

    #[test]
    fn borrow_locks_required_collateral() {
        let (protocol, env, receipt) = with_loan(30);

        // 30 days: 390 * 30 / 365 = 32, plus 10 base
        assert_eq!(receipt.fee, 420);
        assert_eq!(receipt.loan.borrowed, 99_000);
        assert_eq!(receipt.received, 99_000 - 420);
        assert_eq!(receipt.protocol_cut, 126);
        assert_eq!(receipt.collateral_locked, 98_710_888_611);
        assert_eq!(
            receipt.collateral_change,
            193_050_000_000 - 98_710_888_611
        );
        assert_eq!(
            receipt.loan.end_date,
            Timestamp::from_days(20_031)
        );

        let ledger = protocol.ledger();
        assert_eq!(ledger.total_borrowed(), 99_000);
        assert_eq!(ledger.total_collateral(), 98_710_888_611);
        assert_eq!(
            ledger.scheduler().bucket(Timestamp::from_days(20_031)),
            Bucket::new(99_000, 98_710_888_611)
        );
        assert!(ledger.is_consistent());
        assert_eq!(env.vault.pool(), protocol.pool().reserve_balance);
    }

    #[test]
    fn one_loan_per_borrower() {
        let (mut protocol, mut env, _) = with_loan(30);
        let err = protocol
            .borrow(&mut env.services(), BOB, 1_000_000_000_000, 10_000, 5)
            .unwrap_err();
        assert_eq!(err, LedgerError::State(StateError::LoanAlreadyOpen(BOB)));

        let err = protocol
            .leverage(&mut env.services(), BOB, 10_000, 100_000, 5)
            .unwrap_err();
        assert_eq!(err, LedgerError::State(StateError::LoanAlreadyOpen(BOB)));
    }

    #[test]
    fn borrow_rejects_short_collateral_and_long_duration() {
        let (mut protocol, mut env) = started();
        assert!(matches!(
            protocol.borrow(&mut env.services(), BOB, 1_000, 10_000, 5).unwrap_err(),
            LedgerError::InsufficientFunds(FundsError::CollateralShortfall { provided: 1_000, .. })
        ));
        assert!(matches!(
            protocol
                .borrow(&mut env.services(), BOB, 1_000_000_000_000, 10_000, 366)
                .unwrap_err(),
            LedgerError::Validation(ValidationError::DurationTooLong { days: 366, max: 365 })
        ));
        assert!(protocol.loan_of(BOB).is_none());
    }

    #[test]
    fn borrow_more_keeps_end_date() {
        let (mut protocol, mut env, opened) = with_loan(30);
        let receipt = protocol
            .borrow_more(&mut env.services(), BOB, 50_000_000_000, 10_000)
            .unwrap();

        assert_eq!(receipt.loan.borrowed, 99_000 + 9_900);
        assert_eq!(receipt.loan.end_date, opened.loan.end_date);
        assert_eq!(
            receipt.loan.collateral,
            opened.loan.collateral + receipt.collateral_locked
        );
        assert_eq!(receipt.collateral_change, 50_000_000_000 - receipt.collateral_locked);
        assert!(protocol.ledger().is_consistent());
    }

    #[test]
    fn repay_then_close() {
        let (mut protocol, mut env, opened) = with_loan(30);

        assert!(matches!(
            protocol.repay(&mut env.services(), BOB, 99_000).unwrap_err(),
            LedgerError::Validation(ValidationError::RepayNotPartial { .. })
        ));
        let loan = protocol.repay(&mut env.services(), BOB, 9_000).unwrap();
        assert_eq!(loan.borrowed, 90_000);
        assert_eq!(protocol.ledger().total_borrowed(), 90_000);

        assert!(matches!(
            protocol.close(&mut env.services(), BOB, 89_999).unwrap_err(),
            LedgerError::Validation(ValidationError::CloseAmountMismatch { .. })
        ));
        let closed = protocol.close(&mut env.services(), BOB, 90_000).unwrap();
        assert_eq!(closed.collateral_released, opened.collateral_locked);
        assert!(protocol.loan_of(BOB).is_none());
        assert_eq!(protocol.ledger().total_borrowed(), 0);
        assert_eq!(protocol.ledger().total_collateral(), 0);
        assert_eq!(protocol.ledger().scheduler().buckets().count(), 0);
        assert_eq!(env.vault.pool(), protocol.pool().reserve_balance);
    }

    #[test]
    fn remove_collateral_needs_price_headroom() {
        let (mut protocol, mut env, opened) = with_loan(30);
        let held = opened.collateral_locked;

        assert!(matches!(
            protocol
                .remove_collateral(&mut env.services(), BOB, held / 2)
                .unwrap_err(),
            LedgerError::InsufficientFunds(FundsError::Undercollateralized { .. })
        ));
        assert!(matches!(
            protocol
                .remove_collateral(&mut env.services(), BOB, held + 1)
                .unwrap_err(),
            LedgerError::Validation(ValidationError::CollateralExceedsHeld { .. })
        ));

        // retained buy fees lift the price under the collateral
        protocol.buy(&mut env.services(), ALICE, 500_000).unwrap();
        let receipt = protocol
            .remove_collateral(&mut env.services(), BOB, held / 1_000)
            .unwrap();
        assert_eq!(receipt.released, held / 1_000);
        assert_eq!(receipt.loan.collateral, held - held / 1_000);
        assert_eq!(protocol.ledger().total_collateral(), held - held / 1_000);
        assert!(protocol.ledger().is_consistent());
    }

    #[test]
    fn extend_moves_bucket() {
        let (mut protocol, mut env, opened) = with_loan(7);
        let old_end = opened.loan.end_date;

        let err = protocol.extend(&mut env.services(), BOB, 1, 14).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::FeeMismatch { provided: 1, .. })
        ));
        assert_eq!(
            protocol.extend(&mut env.services(), BOB, 0, 0).unwrap_err(),
            LedgerError::Validation(ValidationError::ZeroAmount)
        );

        let fee = pricing::interest_fee(99_000, 14).unwrap();
        let receipt = protocol.extend(&mut env.services(), BOB, fee, 14).unwrap();
        let new_end = Timestamp::from_secs(old_end.as_secs() + 14 * SECONDS_PER_DAY);
        assert_eq!(receipt.loan.end_date, new_end);
        assert_eq!(receipt.loan.duration_days, 21);

        let scheduler = protocol.ledger().scheduler();
        assert!(scheduler.bucket(old_end).is_empty());
        assert_eq!(scheduler.bucket(new_end).borrowed, 99_000);
        assert!(protocol.ledger().is_consistent());
    }

    #[test]
    fn extend_caps_remaining_duration() {
        let (mut protocol, mut env, _) = with_loan(7);
        let fee = pricing::interest_fee(99_000, 365).unwrap();
        assert!(matches!(
            protocol.extend(&mut env.services(), BOB, fee, 365).unwrap_err(),
            LedgerError::Validation(ValidationError::DurationTooLong { .. })
        ));
    }
}

mod leverage_tests {
    use super::*;

    #[test]
    fn leverage_mints_collateral_and_refunds_excess() {
        let (mut protocol, mut env) = started();
        let fee = protocol.leverage_fee(100_000, 10).unwrap();
        // 1% mint fee, 20 bp interest, then 1% of the 98_800 position
        assert_eq!(fee, 1_000 + 200 + 988);

        let receipt = protocol
            .leverage(&mut env.services(), ALICE, fee + 500, 100_000, 10)
            .unwrap();
        assert_eq!(receipt.total_fee, fee);
        assert_eq!(receipt.refund, 500);
        assert_eq!(receipt.protocol_cut, 360);
        assert_eq!(receipt.loan.borrowed, 97_812);
        assert_eq!(receipt.collateral_minted, 97_729_906_879);
        assert_eq!(receipt.loan.collateral, receipt.collateral_minted);

        assert_eq!(env.vault.received(ALICE), 500);
        assert_eq!(protocol.pool().reserve_balance, 1_000_000 + fee - 360);
        assert_eq!(
            protocol.pool().circulating_supply,
            990_000_000_000 + 97_729_906_879
        );
    }

    #[test]
    fn leverage_rejects_short_payment() {
        let (mut protocol, mut env) = started();
        let fee = protocol.leverage_fee(100_000, 10).unwrap();
        let err = protocol
            .leverage(&mut env.services(), ALICE, fee - 1, 100_000, 10)
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientFunds(FundsError::PaymentShortfall { .. })
        ));
        assert!(protocol.loan_of(ALICE).is_none());
    }

    #[test]
    fn flash_close_burns_collateral_and_pays_surplus() {
        let (mut protocol, mut env, opened) = with_loan(30);
        protocol.buy(&mut env.services(), ALICE, 500_000).unwrap();
        let supply = protocol.pool().circulating_supply;

        let receipt = protocol.flash_close(&mut env.services(), BOB).unwrap();
        assert_eq!(receipt.collateral_burned, opened.collateral_locked);
        assert_eq!(receipt.collateral_value, 100_543);
        // the borrower keeps floor(99%) of the value, the pool keeps the rounding unit
        assert_eq!(receipt.fee, 1_006);
        assert_eq!(receipt.payout, 537);

        assert!(protocol.loan_of(BOB).is_none());
        assert_eq!(protocol.pool().circulating_supply, supply - opened.collateral_locked);
        assert_eq!(protocol.ledger().total_borrowed(), 0);
        assert_eq!(env.vault.pool(), protocol.pool().reserve_balance);
    }
}

mod liquidation_tests {
    use super::*;

    #[test]
    fn sweep_writes_off_expired_loans() {
        let (mut protocol, mut env, opened) = with_loan(2);
        let supply = protocol.pool().circulating_supply;

        env.clock.advance_days(3);
        let report = protocol.liquidate_sweep(&mut env.services()).unwrap();
        assert_eq!(report.borrowed, 99_000);
        assert_eq!(report.collateral, opened.collateral_locked);
        assert_eq!(report.to, Timestamp::from_days(20_004));

        assert!(protocol.loan_of(BOB).is_none());
        assert_eq!(protocol.ledger().total_borrowed(), 0);
        assert_eq!(
            protocol.pool().circulating_supply,
            supply - opened.collateral_locked
        );
        assert_eq!(env.events.count_of("liquidation_swept"), 1);

        // nothing left to collect
        let again = protocol.liquidate_sweep(&mut env.services()).unwrap();
        assert!(again.is_empty());
        assert_eq!(env.events.count_of("liquidation_swept"), 1);
    }

    #[test]
    fn swept_borrower_can_borrow_again() {
        let (mut protocol, mut env, _) = with_loan(2);
        env.clock.advance_days(3);
        // the leading sweep of this call clears the old loan
        let receipt = protocol
            .borrow(&mut env.services(), BOB, 1_000_000_000_000, 10_000, 5)
            .unwrap();
        assert_eq!(receipt.loan.borrowed, 9_900);
        assert_eq!(protocol.ledger().total_borrowed(), 9_900);
        assert!(protocol.ledger().is_consistent());
    }

    #[test]
    fn expired_loan_cannot_be_touched() {
        let (mut protocol, mut env, opened) = with_loan(2);
        env.clock.advance_days(3);
        assert!(matches!(
            protocol.repay(&mut env.services(), BOB, 1_000).unwrap_err(),
            LedgerError::State(StateError::LoanExpired { .. })
        ));
        // the rejected repay rolled its sweep back
        assert_eq!(protocol.ledger().total_borrowed(), opened.loan.borrowed);
    }

    #[test]
    fn liquidate_one_before_sweep() {
        let (mut protocol, mut env, opened) = with_loan(2);
        assert!(matches!(
            protocol.liquidate_one(&mut env.services(), BOB).unwrap_err(),
            LedgerError::State(StateError::LoanNotExpired { .. })
        ));

        env.clock.advance_days(3);
        let supply = protocol.pool().circulating_supply;
        let receipt = protocol.liquidate_one(&mut env.services(), BOB).unwrap();
        assert!(!receipt.already_swept);
        assert_eq!(receipt.collateral_burned, opened.collateral_locked);
        assert_eq!(
            protocol.pool().circulating_supply,
            supply - opened.collateral_locked
        );
        assert_eq!(protocol.ledger().total_borrowed(), 0);
        assert!(protocol.ledger().is_consistent());

        // the bucket is already empty, so the sweep finds nothing
        let report = protocol.liquidate_sweep(&mut env.services()).unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn committed_sweep_prunes_records() {
        let (mut protocol, mut env, _) = with_loan(2);
        env.clock.advance_days(3);
        protocol.liquidate_sweep(&mut env.services()).unwrap();
        assert!(protocol.ledger().loan(BOB).is_none());
        let supply = protocol.pool().circulating_supply;

        assert_eq!(
            protocol.liquidate_one(&mut env.services(), BOB).unwrap_err(),
            LedgerError::State(StateError::NoLoan(BOB))
        );
        assert_eq!(protocol.pool().circulating_supply, supply);
    }

    #[test]
    fn rejected_operation_keeps_records() {
        let (mut protocol, mut env, _) = with_loan(2);
        env.clock.advance_days(3);
        // the rejected buy undoes its sweep, so nothing is pruned
        protocol.buy(&mut env.services(), ALICE, 0).unwrap_err();
        assert!(protocol.ledger().loan(BOB).is_some());
        assert!(protocol.ledger().is_consistent());
    }

    #[test]
    fn borrower_reopens_after_each_exit() {
        let (mut protocol, mut env, opened) = with_loan(30);

        protocol
            .close(&mut env.services(), BOB, opened.loan.borrowed)
            .unwrap();
        protocol
            .borrow(&mut env.services(), BOB, 1_000_000_000_000, 10_000, 5)
            .unwrap();
        assert!(protocol.loan_of(BOB).is_some());
        assert!(protocol.ledger().is_consistent());

        protocol.buy(&mut env.services(), ALICE, 500_000).unwrap();
        protocol.flash_close(&mut env.services(), BOB).unwrap();
        protocol
            .borrow(&mut env.services(), BOB, 1_000_000_000_000, 10_000, 2)
            .unwrap();
        assert!(protocol.loan_of(BOB).is_some());
        assert!(protocol.ledger().is_consistent());

        env.clock.advance_days(3);
        protocol.liquidate_one(&mut env.services(), BOB).unwrap();
        let receipt = protocol
            .borrow(&mut env.services(), BOB, 1_000_000_000_000, 10_000, 5)
            .unwrap();
        assert_eq!(protocol.loan_of(BOB), Some(receipt.loan));
        assert_eq!(protocol.ledger().total_borrowed(), receipt.loan.borrowed);
        assert!(protocol.ledger().is_consistent());
        assert_eq!(env.vault.pool(), protocol.pool().reserve_balance);
    }
}
