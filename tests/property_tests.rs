//! Property-based tests for the curve math and fee routing.
//!
//! These tests verify invariants hold under random inputs.

use curve_ledger::pricing::*;
use curve_ledger::*;
use proptest::prelude::*;

// Strategies for generating test data
fn reserve_strategy() -> impl Strategy<Value = u64> {
    2u64..1_000_000_000_000 // up to 1e12 reserve units
}

fn days_strategy() -> impl Strategy<Value = u64> {
    0u64..=365
}

proptest! {
    /// A deposit into a pool whose supply is at least its reserve always mints something.
    #[test]
    fn quote_to_base_positive(
        reserve in reserve_strategy(),
        extra_supply in 0u64..1_000_000_000_000,
        fraction in 1u64..=500,
    ) {
        let amount = (reserve * fraction / 1_000).max(1);
        prop_assume!(amount < reserve);
        let supply = reserve + extra_supply;

        let out = quote_to_base(amount, reserve, supply).unwrap();
        prop_assert!(out > 0, "zero tokens for {} into ({}, {})", amount, reserve, supply);
    }

    /// The rounded-up collateral quote is the floor quote or one more.
    #[test]
    fn no_trade_rounding_direction(
        amount in 1u64..1_000_000,
        reserve in 1_000_000u64..1_000_000_000_000,
        supply in 1u64..1_000_000_000_000_000,
    ) {
        let floor = quote_to_base_no_trade(amount, reserve, supply).unwrap();
        let ceil = quote_to_base_no_trade_ceil(amount, reserve, supply).unwrap();
        prop_assert!(ceil >= floor);
        prop_assert!(ceil - floor <= 1);
        // the ceiling never undervalues the reserve amount it stands for
        prop_assert!(base_to_quote(ceil, reserve, supply).unwrap() >= amount);
    }

    /// Selling the tokens a deposit is worth never pays back more than the deposit.
    #[test]
    fn spot_value_never_exceeds_deposit(
        amount in 1u64..1_000_000,
        reserve in 1_000_000u64..1_000_000_000_000,
        supply in 1u64..1_000_000_000_000_000,
    ) {
        let tokens = quote_to_base_no_trade(amount, reserve, supply).unwrap();
        prop_assert!(base_to_quote(tokens, reserve, supply).unwrap() <= amount);
    }

    /// Routing hands out every fragment exactly once and fills each destination exactly.
    #[test]
    fn router_conserves_fragments(
        fragments in proptest::collection::vec(0u64..1_000_000_000, 1..8),
        fee_share in 0u64..=100,
        payout_share in 0u64..=100,
    ) {
        let available: u64 = fragments.iter().sum();
        let fee = available * fee_share / 100;
        let payout = (available - fee) * payout_share / 100;

        let routing = route(&fragments, &[(Destination::Fee, fee), (Destination::Payout, payout)]).unwrap();
        prop_assert_eq!(routing.total(), available);
        prop_assert_eq!(routing.total_to(Destination::Fee), fee);
        prop_assert_eq!(routing.total_to(Destination::Payout), payout);
        prop_assert_eq!(routing.total_to(Destination::Pool), available - fee - payout);

        for (index, &fragment) in fragments.iter().enumerate() {
            let drawn: u64 = routing.pieces_of(index).map(|a| a.amount).sum();
            prop_assert_eq!(drawn, fragment);
        }
        prop_assert!(routing.allocations.iter().all(|a| a.amount > 0));
    }

    /// Asking for more than the fragments carry is refused outright.
    #[test]
    fn router_refuses_shortfall(
        fragments in proptest::collection::vec(0u64..1_000_000, 1..8),
        excess in 1u64..1_000,
    ) {
        let available: u64 = fragments.iter().sum();
        let result = route(&fragments, &[(Destination::Fee, available + excess)]);
        prop_assert_eq!(
            result,
            Err(RouteError::Shortfall { required: available + excess, available })
        );
    }

    /// Interest grows with duration and stays within the one-year rate.
    #[test]
    fn interest_fee_monotonic(
        amount in 0u64..1_000_000_000_000,
        days in 0u64..365,
    ) {
        let fee = interest_fee(amount, days).unwrap();
        let longer = interest_fee(amount, days + 1).unwrap();
        prop_assert!(longer >= fee);
        prop_assert!(fee <= amount * (INTEREST_APR_BP + INTEREST_BASE_BP) / BPS_DENOMINATOR);
        prop_assert!(fee >= amount * INTEREST_BASE_BP / BPS_DENOMINATOR);
    }

    /// Leverage costs at least the interest alone.
    #[test]
    fn leverage_fee_covers_interest(
        amount in 0u64..1_000_000_000_000,
        days in days_strategy(),
        bp in 0u16..=250,
    ) {
        let fee = leverage_fee(amount, days, Bps(bp)).unwrap();
        prop_assert!(fee >= interest_fee(amount, days).unwrap());
    }

    /// Day boundaries: aligned, strictly later, at most one day away.
    #[test]
    fn midnight_is_next_boundary(secs in 0u64..4_000_000_000) {
        let t = Timestamp::from_secs(secs);
        let m = midnight(t).unwrap();
        prop_assert!(m.is_day_aligned());
        prop_assert!(m > t);
        prop_assert!(m.as_secs() - secs <= SECONDS_PER_DAY);
    }

    /// Buys only ever raise the spot price.
    #[test]
    fn buys_raise_price(payments in proptest::collection::vec(1_000u64..10_000_000, 1..20)) {
        let config = ProtocolConfig::default();
        let genesis = Timestamp::from_days(20_000);
        let admin = Credential::new(AccountId(1), "admin-token");
        let mut env = InMemoryEnv::new(&config, genesis, admin.clone());
        let mut protocol = Protocol::new(config, genesis).unwrap();
        protocol.start(&mut env.services(), &admin, 1_000_000).unwrap();

        for payment in payments {
            let before = protocol.spot_price().unwrap();
            protocol.buy(&mut env.services(), AccountId(2), payment).unwrap();
            let after = protocol.spot_price().unwrap();
            prop_assert!(after >= before, "{} -> {}", before, after);
        }
    }
}

/// Fixed-input checks of the pricing constants
#[cfg(test)]
mod pricing_edge_cases {
    use super::*;

    #[test]
    fn empty_supply_bootstraps() {
        assert_eq!(quote_to_base(1_000_000, 1_000_000, 0).unwrap(), 1_000_000_000_000);
        assert_eq!(base_to_quote(1_000, 1_000_000, 0).unwrap(), 0);
    }

    #[test]
    fn degenerate_reserve_yields_nothing() {
        assert_eq!(quote_to_base(500, 500, 1_000).unwrap(), 0);
        assert_eq!(quote_to_base(600, 500, 1_000).unwrap(), 0);
    }

    #[test]
    fn interest_rate_truncates_before_applying() {
        // 390 * 30 / 365 = 32.05 -> 32, plus 10
        assert_eq!(interest_rate_bp(30).unwrap(), 42);
        assert_eq!(interest_rate_bp(365).unwrap(), 400);
        assert_eq!(interest_fee(1_000_000, 30).unwrap(), 4_200);
        assert_eq!(interest_fee(1_000_000, 0).unwrap(), 1_000);
    }

    #[test]
    fn overflow_is_reported() {
        assert_eq!(
            quote_to_base(u64::MAX, 0, 0).unwrap_err(),
            MathError::Overflow
        );
        assert_eq!(mul_div(u64::MAX, u64::MAX, 1).unwrap_err(), MathError::Overflow);
        assert_eq!(mul_div(1, 1, 0).unwrap_err(), MathError::DivisionByZero);
    }

    #[test]
    fn price_check_handles_empty_supply() {
        assert!(price_not_decreased((0, 0), (100, 10)));
        assert!(price_not_decreased((100, 10), (110, 11)));
        assert!(!price_not_decreased((100, 10), (109, 11)));
    }
}
