//! Bonding-curve ledger simulation.
//!
//! Walks the protocol through start, trading, borrowing, leverage, extension and an expiry
//! sweep, printing pool and ledger state along the way. Set `RUST_LOG=debug` to see every
//! committed transition.

use curve_ledger::*;
use tracing_subscriber::EnvFilter;

const ADMIN: AccountId = AccountId(1);
const ALICE: AccountId = AccountId(2);
const BOB: AccountId = AccountId(3);
const CAROL: AccountId = AccountId(4);

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Bonding-Curve Ledger Simulation");
    println!("One reserve asset, one token, loans bucketed by expiry day\n");

    scenario_1_start_and_trade();
    scenario_2_borrow_and_repay();
    scenario_3_leverage_and_flash_close();
    scenario_4_extension();
    scenario_5_expiry_sweep();

    println!("\nAll simulations completed successfully.");
}

fn setup() -> (Protocol, InMemoryEnv, Credential) {
    let config = ProtocolConfig::default();
    let genesis = Timestamp::from_secs(20_000 * SECONDS_PER_DAY + 3_600);
    let admin = Credential::new(ADMIN, "sim-admin");
    let mut env = InMemoryEnv::new(&config, genesis, admin.clone());
    let mut protocol = Protocol::new(config.clone(), genesis).unwrap();
    protocol
        .start(&mut env.services(), &admin, config.bootstrap_reserve)
        .unwrap();
    (protocol, env, admin)
}

fn print_state(protocol: &Protocol, env: &InMemoryEnv) {
    let pool = protocol.pool();
    let ledger = protocol.ledger();
    println!(
        "    reserve {}, supply {}, borrowed {}, collateral {}, price {}",
        pool.reserve_balance,
        pool.circulating_supply,
        ledger.total_borrowed(),
        ledger.total_collateral(),
        protocol
            .current_price(&env.clock)
            .map(|p| p.round_dp(12).to_string())
            .unwrap_or_else(|| "-".to_string())
    );
}

/// Bootstrap the pool, then buy and sell against the curve.
fn scenario_1_start_and_trade() {
    println!("Scenario 1: Start and Trade\n");

    let (mut protocol, mut env, _) = setup();
    let supply = protocol.pool().circulating_supply;
    println!("  Started with {} reserve, {} tokens after the 1% burn", protocol.pool().reserve_balance, supply);
    print_state(&protocol, &env);

    let quoted = protocol.quote_buy(&env.clock, 100_000).unwrap();
    let bought = protocol.buy(&mut env.services(), ALICE, 100_000).unwrap();
    println!("\n  Alice buys with 100,000 reserve: quoted {}, got {} tokens", quoted, bought.tokens);
    println!("  Protocol cut paid to the fee recipient: {}", bought.protocol_cut);
    print_state(&protocol, &env);

    let sold = protocol.sell(&mut env.services(), ALICE, bought.tokens / 2).unwrap();
    println!("\n  Alice sells half: payout {}, fee {}", sold.payout, sold.fee);
    print_state(&protocol, &env);
    println!("  Alice net reserve flow: {}\n", env.vault.net_of(ALICE));
}

/// Borrow against held tokens, repay part, then close.
fn scenario_2_borrow_and_repay() {
    println!("Scenario 2: Borrow and Repay\n");

    let (mut protocol, mut env, _) = setup();
    let tokens = protocol.buy(&mut env.services(), BOB, 200_000).unwrap().tokens;

    let receipt = protocol
        .borrow(&mut env.services(), BOB, tokens, 50_000, 30)
        .unwrap();
    println!(
        "  Bob borrows 50,000 for 30 days: received {}, interest {}, locked {} tokens, {} handed back",
        receipt.received, receipt.fee, receipt.collateral_locked, receipt.collateral_change
    );
    println!("  Loan ends {}", receipt.loan.end_date);
    print_state(&protocol, &env);

    let loan = protocol.repay(&mut env.services(), BOB, 10_000).unwrap();
    println!("\n  Bob repays 10,000, still owes {}", loan.borrowed);

    let closed = protocol.close(&mut env.services(), BOB, loan.borrowed).unwrap();
    println!("  Bob closes the loan and gets {} tokens back", closed.collateral_released);
    print_state(&protocol, &env);
    println!();
}

/// Open a leveraged position and unwind it out of its own collateral.
fn scenario_3_leverage_and_flash_close() {
    println!("Scenario 3: Leverage and Flash Close\n");

    let (mut protocol, mut env, _) = setup();
    let fee = protocol.leverage_fee(100_000, 10).unwrap();
    println!("  Carol's 100,000 position for 10 days costs {} up front", fee);

    let opened = protocol
        .leverage(&mut env.services(), CAROL, fee + 500, 100_000, 10)
        .unwrap();
    println!(
        "  Minted {} tokens as collateral, borrowed {}, refunded {}",
        opened.collateral_minted, opened.loan.borrowed, opened.refund
    );
    print_state(&protocol, &env);

    // retained buy fees lift the price under Carol's collateral
    protocol.buy(&mut env.services(), ALICE, 500_000).unwrap();
    println!("\n  Alice buys with 500,000 reserve");
    print_state(&protocol, &env);

    let closed = protocol.flash_close(&mut env.services(), CAROL).unwrap();
    println!(
        "\n  Flash close: collateral worth {}, closing fee {}, paid out {}",
        closed.collateral_value, closed.fee, closed.payout
    );
    print_state(&protocol, &env);
    println!();
}

/// Extend a loan and watch its bucket move.
fn scenario_4_extension() {
    println!("Scenario 4: Loan Extension\n");

    let (mut protocol, mut env, _) = setup();
    let tokens = protocol.buy(&mut env.services(), BOB, 200_000).unwrap().tokens;
    let loan = protocol
        .borrow(&mut env.services(), BOB, tokens, 100_000, 7)
        .unwrap()
        .loan;
    println!("  Bob's loan ends {}", loan.end_date);

    let fee = pricing::interest_fee(loan.borrowed, 14).unwrap();
    let extended = protocol.extend(&mut env.services(), BOB, fee, 14).unwrap();
    println!("  Paid {} to extend 14 days, now ends {}", fee, extended.loan.end_date);

    for (day, bucket) in protocol.ledger().scheduler().buckets() {
        println!("    bucket {}: borrowed {}, collateral {}", day, bucket.borrowed, bucket.collateral);
    }
    println!();
}

/// Let loans expire and sweep them in one pass.
fn scenario_5_expiry_sweep() {
    println!("Scenario 5: Expiry Sweep\n");

    let (mut protocol, mut env, _) = setup();
    for (who, days) in [(ALICE, 2), (BOB, 3), (CAROL, 30)] {
        let tokens = protocol.buy(&mut env.services(), who, 100_000).unwrap().tokens;
        protocol
            .borrow(&mut env.services(), who, tokens, 40_000, days)
            .unwrap();
    }
    println!("  Three loans open, ending in 2, 3 and 30 days");
    print_state(&protocol, &env);

    env.clock.advance_days(5);
    println!("\n  Five days later, price preview counts the due sweep:");
    print_state(&protocol, &env);

    let report = protocol.liquidate_sweep(&mut env.services()).unwrap();
    println!(
        "  Swept {} to {}: wrote off {} borrowed, burned {} collateral",
        report.from, report.to, report.borrowed, report.collateral
    );
    print_state(&protocol, &env);

    println!("  Alice's loan: {:?}", protocol.loan_of(ALICE).map(|l| l.borrowed));
    println!("  Carol's loan: {:?}", protocol.loan_of(CAROL).map(|l| l.borrowed));
    println!("  {} events recorded", env.events.len());
}
