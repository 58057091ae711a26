//! Daily search-call budget with optional quiet hours.
//!
//! One `RateBudget` exists per process; the engine keeps it behind a mutex so a
//! reservation is a single critical section. Slots are reserved before a search
//! is dispatched and released if the search is not actually made.

use std::fmt;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, Timelike, Utc};

use crate::config::ConfigError;

/// Local hours `[start, end)` during which no searches run. Wraps past midnight
/// when `start > end`; `start == end` is an empty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    start: u32,
    end: u32,
}

impl QuietHours {
    pub fn new(start: u32, end: u32) -> Result<Self, ConfigError> {
        if start > 23 || end > 23 {
            return Err(ConfigError::InvalidQuietHours { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, hour: u32) -> bool {
        if self.start <= self.end {
            hour >= self.start && hour < self.end
        } else {
            hour >= self.start || hour < self.end
        }
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }
}

/// What the budget would grant right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStatus {
    Available(u32),
    Exhausted,
    QuietHours,
}

impl fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetStatus::Available(n) => write!(f, "{} calls available", n),
            BudgetStatus::Exhausted => f.write_str("daily limit reached"),
            BudgetStatus::QuietHours => f.write_str("quiet hours"),
        }
    }
}

/// Which clock decides the "day" and the quiet window.
#[derive(Debug, Clone, Copy)]
enum Zone {
    Local,
    Fixed(FixedOffset),
}

impl Zone {
    fn local(self, now: DateTime<Utc>) -> NaiveDateTime {
        match self {
            Zone::Local => now.with_timezone(&Local).naive_local(),
            Zone::Fixed(offset) => now.with_timezone(&offset).naive_local(),
        }
    }
}

/// Calls used today against the daily ceiling.
#[derive(Debug, Clone)]
pub struct RateBudget {
    ceiling: u32,
    day: NaiveDate,
    used: u32,
    quiet: Option<QuietHours>,
    zone: Zone,
}

impl RateBudget {
    /// Fresh budget for the local day containing `now`.
    pub fn new(ceiling: u32, quiet: Option<QuietHours>, now: DateTime<Utc>) -> Self {
        Self::with_zone(ceiling, quiet, Zone::Local, now)
    }

    /// Budget whose day boundary is midnight at a fixed UTC offset.
    pub fn with_offset(
        ceiling: u32,
        quiet: Option<QuietHours>,
        offset: FixedOffset,
        now: DateTime<Utc>,
    ) -> Self {
        Self::with_zone(ceiling, quiet, Zone::Fixed(offset), now)
    }

    fn with_zone(ceiling: u32, quiet: Option<QuietHours>, zone: Zone, now: DateTime<Utc>) -> Self {
        Self {
            ceiling: ceiling.max(1),
            day: zone.local(now).date(),
            used: 0,
            quiet,
            zone,
        }
    }

    /// Restore persisted usage. A stale day is discarded; `used` is clamped to the ceiling.
    pub fn restore(&mut self, day: NaiveDate, used: u32, now: DateTime<Utc>) {
        self.day = day;
        self.used = used.min(self.ceiling);
        self.roll(now);
    }

    /// Reset usage if the local day has advanced. Returns true on rollover.
    pub fn roll(&mut self, now: DateTime<Utc>) -> bool {
        let today = self.zone.local(now).date();
        if today > self.day {
            tracing::info!(
                "daily budget rollover: {} calls used on {}",
                self.used,
                self.day
            );
            self.day = today;
            self.used = 0;
            true
        } else {
            false
        }
    }

    pub fn in_quiet_hours(&self, now: DateTime<Utc>) -> bool {
        self.quiet
            .is_some_and(|q| q.contains(self.zone.local(now).hour()))
    }

    pub fn status(&mut self, now: DateTime<Utc>) -> BudgetStatus {
        self.roll(now);
        if self.in_quiet_hours(now) {
            BudgetStatus::QuietHours
        } else if self.remaining() == 0 {
            BudgetStatus::Exhausted
        } else {
            BudgetStatus::Available(self.remaining())
        }
    }

    /// Reserve up to `requested` calls. Returns the number granted
    /// (`min(requested, ceiling - used)`, or 0 in quiet hours). Unspent slots
    /// must be handed back with `release`.
    pub fn reserve(&mut self, requested: u32, now: DateTime<Utc>) -> u32 {
        match self.status(now) {
            BudgetStatus::Available(n) => {
                let take = requested.min(n);
                self.used += take;
                take
            }
            BudgetStatus::Exhausted | BudgetStatus::QuietHours => 0,
        }
    }

    /// Return `n` reserved-but-unspent calls to today's budget.
    pub fn release(&mut self, n: u32) {
        self.used = self.used.saturating_sub(n);
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn remaining(&self) -> u32 {
        self.ceiling.saturating_sub(self.used)
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, h, m, 0).unwrap()
    }

    fn budget(ceiling: u32, quiet: Option<QuietHours>) -> RateBudget {
        RateBudget::with_offset(ceiling, quiet, FixedOffset::east_opt(0).unwrap(), utc(8, 0))
    }

    #[test]
    fn reserve_and_release() {
        let mut b = budget(10, None);
        assert_eq!(b.reserve(4, utc(9, 0)), 4);
        assert_eq!(b.reserve(10, utc(9, 1)), 6);
        assert_eq!(b.used(), 10);
        assert_eq!(b.reserve(1, utc(9, 2)), 0);
        assert_eq!(b.status(utc(9, 2)), BudgetStatus::Exhausted);
        b.release(3);
        assert_eq!(b.status(utc(9, 3)), BudgetStatus::Available(3));
        b.release(100);
        assert_eq!(b.used(), 0);
    }

    #[test]
    fn resets_once_per_local_day() {
        let mut b = budget(5, None);
        assert_eq!(b.reserve(5, utc(23, 0)), 5);
        assert!(!b.roll(utc(23, 59)));
        assert!(b.roll(utc(23, 59) + Duration::minutes(2)));
        assert_eq!(b.used(), 0);
        assert!(!b.roll(utc(23, 59) + Duration::hours(3)));
    }

    #[test]
    fn day_boundary_follows_offset() {
        // UTC+02:00: 22:30 UTC is already the next local day.
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let mut b = RateBudget::with_offset(5, None, offset, utc(12, 0));
        b.reserve(5, utc(12, 0));
        assert!(b.roll(utc(22, 30)));
    }

    #[test]
    fn quiet_hours_grant_nothing() {
        let quiet = QuietHours::new(2, 7).unwrap();
        let mut b = budget(100, Some(quiet));
        assert_eq!(b.status(utc(3, 0)), BudgetStatus::QuietHours);
        assert_eq!(b.reserve(10, utc(3, 0)), 0);
        assert_eq!(b.reserve(10, utc(7, 0)), 10);
    }

    #[test]
    fn quiet_hours_wrap_past_midnight() {
        let q = QuietHours::new(22, 6).unwrap();
        assert!(q.contains(23));
        assert!(q.contains(0));
        assert!(q.contains(5));
        assert!(!q.contains(6));
        assert!(!q.contains(21));
        assert!(!QuietHours::new(4, 4).unwrap().contains(4));
        assert!(QuietHours::new(24, 1).is_err());
    }

    #[test]
    fn restore_clamps_and_discards_stale_days() {
        let mut b = budget(10, None);
        b.restore(utc(8, 0).date_naive(), 50, utc(9, 0));
        assert_eq!(b.used(), 10);
        b.restore(utc(8, 0).date_naive() - Duration::days(1), 7, utc(9, 0));
        assert_eq!(b.used(), 0);
    }
}
