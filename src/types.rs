// 1.0: all the primitives live here. identities, timestamps, basis points.
// each is a newtype so the compiler catches a day count passed where seconds belong.
// ledger amounts stay plain u64 (reserve units or token units), the field name says which.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SECONDS_PER_DAY: u64 = 86_400;
pub const BPS_DENOMINATOR: u64 = 10_000;

// borrowers, traders and the fee recipient all share one identity space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acct-{}", self.0)
    }
}

// 1.1: wall-clock seconds. loan end dates and bucket keys are always day-aligned ones.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp().max(0) as u64)
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Start of day `days` since the epoch, pinned at `u64::MAX` past the representable range.
    pub fn from_days(days: u64) -> Self {
        Self(days.saturating_mul(SECONDS_PER_DAY))
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn is_day_aligned(&self) -> bool {
        self.0 % SECONDS_PER_DAY == 0
    }

    /// Calendar date of this instant, for log lines and reports.
    pub fn date(&self) -> Option<NaiveDate> {
        DateTime::from_timestamp(i64::try_from(self.0).ok()?, 0).map(|dt| dt.date_naive())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.date() {
            Some(date) if self.is_day_aligned() => write!(f, "{date}"),
            _ => write!(f, "{}s", self.0),
        }
    }
}

// 1.2: basis points. 100 bp = 1%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bps(pub u16);

impl Bps {
    pub fn new(bp: u16) -> Self {
        Self(bp)
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    pub fn as_fraction(&self) -> Decimal {
        Decimal::new(self.0 as i64, 4)
    }

    /// Complement against 100%, e.g. a 250 bp fee keeps 9_750 bp for the trader.
    pub fn complement(&self) -> Bps {
        Bps((BPS_DENOMINATOR as u16).saturating_sub(self.0))
    }
}

impl fmt::Display for Bps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bp", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn bps_conversion() {
        assert_eq!(Bps::new(100).as_fraction(), dec!(0.01));
        assert_eq!(Bps::new(250).as_fraction(), dec!(0.025));
        assert_eq!(Bps::new(250).complement(), Bps::new(9_750));
    }

    #[test]
    fn timestamp_alignment_and_display() {
        let day = Timestamp::from_days(19_000);
        assert!(day.is_day_aligned());
        assert_eq!(day.to_string(), "2022-01-08");

        let mid = Timestamp::from_secs(19_000 * SECONDS_PER_DAY + 5);
        assert!(!mid.is_day_aligned());
        assert_eq!(mid.to_string(), format!("{}s", 19_000 * SECONDS_PER_DAY + 5));
    }
    #[test]
    fn far_future_days_saturate() {
        assert_eq!(Timestamp::from_days(u64::MAX), Timestamp(u64::MAX));
        assert_eq!(Timestamp::from_days(u64::MAX / SECONDS_PER_DAY + 1), Timestamp(u64::MAX));
    }
}
