//! Date-bucketed liquidation scheduler.
//!
//! Every open loan is mirrored into the bucket of the day it expires. A sweep walks the
//! watermark forward one day at a time and pops whole buckets, so expiring N loans costs
//! the number of days elapsed rather than N. The sweep hands back a [`SweepOutcome`] that
//! can be undone, which lets a failing operation discard the sweep that preceded it.

use crate::error::MathError;
use crate::pricing::{add, midnight, sub};
use crate::types::{Timestamp, SECONDS_PER_DAY};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate of every loan maturing on one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub borrowed: u64,
    pub collateral: u64,
}

impl Bucket {
    pub fn new(borrowed: u64, collateral: u64) -> Self {
        Self {
            borrowed,
            collateral,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.borrowed == 0 && self.collateral == 0
    }

    pub fn plus(&self, other: Bucket) -> Result<Bucket, MathError> {
        Ok(Bucket {
            borrowed: add(self.borrowed, other.borrowed)?,
            collateral: add(self.collateral, other.collateral)?,
        })
    }

    pub fn minus(&self, other: Bucket) -> Result<Bucket, MathError> {
        Ok(Bucket {
            borrowed: sub(self.borrowed, other.borrowed)?,
            collateral: sub(self.collateral, other.collateral)?,
        })
    }
}

/// Result of one sweep: the span covered and what expired in it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Watermark before the sweep.
    pub from: Timestamp,
    /// Watermark after the sweep.
    pub to: Timestamp,
    pub expired: Bucket,
    popped: Vec<(Timestamp, Bucket)>,
}

impl SweepOutcome {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty()
    }

    pub fn days(&self) -> u64 {
        (self.to.as_secs() - self.from.as_secs()) / SECONDS_PER_DAY
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationScheduler {
    buckets: BTreeMap<Timestamp, Bucket>,
    watermark: Timestamp,
}

impl LiquidationScheduler {
    /// Watermark starts at the first day boundary after `genesis`.
    pub fn new(genesis: Timestamp) -> Result<Self, MathError> {
        Ok(Self {
            buckets: BTreeMap::new(),
            watermark: midnight(genesis)?,
        })
    }

    /// Next day the sweep will process. Every day before it has been swept.
    pub fn watermark(&self) -> Timestamp {
        self.watermark
    }

    pub fn bucket(&self, day: Timestamp) -> Bucket {
        self.buckets.get(&day).copied().unwrap_or_default()
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&Timestamp, &Bucket)> {
        self.buckets.iter()
    }

    pub fn is_swept(&self, day: Timestamp) -> bool {
        day < self.watermark
    }

    /// Sum of every live bucket.
    pub fn totals(&self) -> Result<Bucket, MathError> {
        self.buckets
            .values()
            .try_fold(Bucket::default(), |acc, b| acc.plus(*b))
    }

    pub(crate) fn add(&mut self, day: Timestamp, amount: Bucket) -> Result<(), MathError> {
        debug_assert!(day.is_day_aligned());
        debug_assert!(!self.is_swept(day));
        let next = self.bucket(day).plus(amount)?;
        self.put(day, next);
        Ok(())
    }

    pub(crate) fn sub(&mut self, day: Timestamp, amount: Bucket) -> Result<(), MathError> {
        let next = self.bucket(day).minus(amount)?;
        self.put(day, next);
        Ok(())
    }

    /// Replace `old` in `from` with `new` in `to`. Nothing changes if either side fails.
    pub(crate) fn reschedule(
        &mut self,
        from: Timestamp,
        old: Bucket,
        to: Timestamp,
        new: Bucket,
    ) -> Result<(), MathError> {
        debug_assert!(!self.is_swept(to));
        let drained = self.bucket(from).minus(old)?;
        if from == to {
            let next = drained.plus(new)?;
            self.put(from, next);
        } else {
            let grown = self.bucket(to).plus(new)?;
            self.put(from, drained);
            self.put(to, grown);
        }
        Ok(())
    }

    fn put(&mut self, day: Timestamp, bucket: Bucket) {
        if bucket.is_empty() {
            self.buckets.remove(&day);
        } else {
            self.buckets.insert(day, bucket);
        }
    }

    /// Totals a sweep at `now` would collect, without collecting them.
    pub fn pending(&self, now: Timestamp) -> Result<Bucket, MathError> {
        if now <= self.watermark {
            return Ok(Bucket::default());
        }
        self.buckets
            .range(self.watermark..now)
            .try_fold(Bucket::default(), |acc, (_, b)| acc.plus(*b))
    }

    /// Pop every bucket strictly before `now` and advance the watermark past them.
    pub(crate) fn sweep(&mut self, now: Timestamp) -> Result<SweepOutcome, MathError> {
        let from = self.watermark;
        let mut day = from;
        let mut expired = Bucket::default();
        let mut due = Vec::new();
        while day < now {
            if let Some(bucket) = self.buckets.get(&day) {
                expired = expired.plus(*bucket)?;
                due.push(day);
            }
            day = add(day.as_secs(), SECONDS_PER_DAY).map(Timestamp)?;
        }

        let popped = due
            .into_iter()
            .filter_map(|d| self.buckets.remove(&d).map(|b| (d, b)))
            .collect();
        self.watermark = day;

        Ok(SweepOutcome {
            from,
            to: day,
            expired,
            popped,
        })
    }

    /// Put back everything `outcome` popped and rewind the watermark.
    pub(crate) fn undo(&mut self, outcome: SweepOutcome) {
        for (day, bucket) in outcome.popped {
            self.buckets.insert(day, bucket);
        }
        self.watermark = outcome.from;
    }
}
