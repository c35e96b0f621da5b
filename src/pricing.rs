//! Bonding-curve pricing.
//!
//! Pure functions over `(reserve, supply)` that size every exchange the ledger performs.
//! Intermediates are `u128` and every step is checked; an overflow aborts the caller's whole
//! operation. Rounding always favors the pool: token amounts handed out round down, token
//! amounts demanded as collateral round up.

use crate::error::MathError;
use crate::types::{Bps, Timestamp, BPS_DENOMINATOR, SECONDS_PER_DAY};

/// Tokens minted per reserve unit while the supply is still zero.
pub const BOOTSTRAP_SCALE: u64 = 1_000_000;

/// Annualized interest component, in basis points per 365 days.
pub const INTEREST_APR_BP: u64 = 390;
/// Flat interest component charged on every loan regardless of length.
pub const INTEREST_BASE_BP: u64 = 10;
pub const DAYS_PER_YEAR: u64 = 365;

pub(crate) fn to_u64(value: u128) -> Result<u64, MathError> {
    u64::try_from(value).map_err(|_| MathError::Overflow)
}

pub(crate) fn mul_u128(a: u64, b: u64) -> u128 {
    // u64 * u64 always fits in u128
    a as u128 * b as u128
}

pub(crate) fn add(a: u64, b: u64) -> Result<u64, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

pub(crate) fn sub(a: u64, b: u64) -> Result<u64, MathError> {
    a.checked_sub(b).ok_or(MathError::Underflow)
}

/// `a * b / d`, floored.
pub fn mul_div(a: u64, b: u64, d: u64) -> Result<u64, MathError> {
    if d == 0 {
        return Err(MathError::DivisionByZero);
    }
    to_u64(mul_u128(a, b) / d as u128)
}

/// `a * b / d`, rounded up.
pub fn mul_div_ceil(a: u64, b: u64, d: u64) -> Result<u64, MathError> {
    if d == 0 {
        return Err(MathError::DivisionByZero);
    }
    let numerator = mul_u128(a, b)
        .checked_add(d as u128 - 1)
        .ok_or(MathError::Overflow)?;
    to_u64(numerator / d as u128)
}

/// Reserve amount in, tokens out, with the deposit already counted in `reserve`.
///
/// An empty supply bootstraps at [`BOOTSTRAP_SCALE`] tokens per reserve unit. A pool whose
/// reserve does not exceed the deposit is degenerate and yields nothing.
pub fn quote_to_base(amount_in: u64, reserve: u64, supply: u64) -> Result<u64, MathError> {
    if supply == 0 {
        return amount_in.checked_mul(BOOTSTRAP_SCALE).ok_or(MathError::Overflow);
    }
    if reserve <= amount_in {
        return Ok(0);
    }
    mul_div(amount_in, supply, reserve - amount_in)
}

/// Tokens in, reserve amount out at spot.
pub fn base_to_quote(amount_in: u64, reserve: u64, supply: u64) -> Result<u64, MathError> {
    if supply == 0 {
        return Ok(0);
    }
    mul_div(amount_in, reserve, supply)
}

/// Token equivalent of a reserve amount without moving the pool. Rounds down.
pub fn quote_to_base_no_trade(amount_in: u64, reserve: u64, supply: u64) -> Result<u64, MathError> {
    mul_div(amount_in, supply, reserve)
}

/// Token equivalent of a reserve amount without moving the pool. Rounds up, so collateral
/// demanded this way is never short by a rounding unit.
pub fn quote_to_base_no_trade_ceil(
    amount_in: u64,
    reserve: u64,
    supply: u64,
) -> Result<u64, MathError> {
    mul_div_ceil(amount_in, supply, reserve)
}

/// Tokens minted for a leveraged position. The fee has already left the backing when the new
/// tokens are priced, so it is taken off `reserve` first. Rounds up.
pub fn quote_to_base_leverage(
    amount_in: u64,
    fee: u64,
    reserve: u64,
    supply: u64,
) -> Result<u64, MathError> {
    let backing = sub(reserve, fee)?;
    mul_div_ceil(amount_in, supply, backing)
}

/// Interest rate in basis points for a loan of `days` days.
pub fn interest_rate_bp(days: u64) -> Result<u64, MathError> {
    let scaled = INTEREST_APR_BP.checked_mul(days).ok_or(MathError::Overflow)?;
    add(scaled / DAYS_PER_YEAR, INTEREST_BASE_BP)
}

/// Interest charged up front on `amount` borrowed for `days` days.
///
/// The rate is truncated before it is applied. Folding both divisions into one changes the
/// result for most inputs.
pub fn interest_fee(amount: u64, days: u64) -> Result<u64, MathError> {
    let rate = interest_rate_bp(days)?;
    mul_div(amount, rate, BPS_DENOMINATOR)
}

/// `amount * bp / 10_000`, floored.
pub fn bps_of(amount: u64, bp: Bps) -> Result<u64, MathError> {
    mul_div(amount, bp.value() as u64, BPS_DENOMINATOR)
}

/// Mint fee plus interest for a leveraged position.
pub fn leverage_fee(amount: u64, days: u64, leverage_fee_bp: Bps) -> Result<u64, MathError> {
    add(bps_of(amount, leverage_fee_bp)?, interest_fee(amount, days)?)
}

/// Next day boundary strictly after `timestamp`.
///
/// A timestamp already on a boundary still advances a full day; loan end dates and bucket
/// keys rely on this.
pub fn midnight(timestamp: Timestamp) -> Result<Timestamp, MathError> {
    let secs = timestamp.as_secs();
    let floor = secs - secs % SECONDS_PER_DAY;
    add(floor, SECONDS_PER_DAY).map(Timestamp)
}

/// True when spot price `next.0 / next.1` is at least `prev.0 / prev.1`.
///
/// Pairs are `(backing, supply)`. An empty supply on either side has no price and passes.
pub fn price_not_decreased(prev: (u64, u64), next: (u64, u64)) -> bool {
    let (prev_backing, prev_supply) = prev;
    let (next_backing, next_supply) = next;
    if prev_supply == 0 || next_supply == 0 {
        return true;
    }
    mul_u128(next_backing, prev_supply) >= mul_u128(prev_backing, next_supply)
}
