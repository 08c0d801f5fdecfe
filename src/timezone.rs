//! Trading-day and trading-hours arithmetic, anchored to a configured IANA
//! timezone and a daily close hour (spec §4.A).
//!
//! Grounded on `original_source/core/timezone_handler.py`
//! (`get_current_trading_day`, `is_within_trading_hours`).

use crate::types::Timestamp;
use chrono::{NaiveDate, NaiveTime, TimeZone, Timelike};
use chrono_tz::Tz;

/// Anchors all trading-day and session-window arithmetic to one IANA zone
/// and a daily close hour.
#[derive(Clone, Copy, Debug)]
pub struct TimezoneAnchor {
    zone: Tz,
    daily_close_hour: u32,
}

impl TimezoneAnchor {
    pub fn new(zone: Tz, daily_close_hour: u32) -> Self {
        TimezoneAnchor { zone, daily_close_hour }
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    pub fn now(&self) -> Timestamp {
        chrono::Utc::now().with_timezone(&self.zone)
    }

    /// The calendar date this timestamp belongs to, for bias/risk bookkeeping.
    /// Hours before `daily_close_hour` belong to the previous calendar day,
    /// mirroring the original's "new day starts at the close hour, not
    /// midnight" rule.
    pub fn trading_day(&self, at: Timestamp) -> NaiveDate {
        let local = at.with_timezone(&self.zone);
        if local.hour() < self.daily_close_hour {
            local.date_naive().pred_opt().expect("date underflow")
        } else {
            local.date_naive()
        }
    }

    /// The instant the trading day for `day` closes: `daily_close_hour` on
    /// the calendar day following `day`.
    pub fn daily_close_time(&self, day: NaiveDate) -> Timestamp {
        let close_date = day.succ_opt().expect("date overflow");
        let naive = close_date.and_time(NaiveTime::from_hms_opt(self.daily_close_hour, 0, 0).unwrap());
        self.zone.from_local_datetime(&naive).single().expect("unambiguous local time")
    }

    /// True when `before` and `after` fall on different trading days.
    pub fn crossed(&self, before: Timestamp, after: Timestamp) -> bool {
        self.trading_day(before) != self.trading_day(after)
    }

    /// Session-window check supporting overnight windows where `start > end`
    /// (e.g. 19:00-06:00), matching the original's wraparound handling.
    pub fn is_within_trading_hours(&self, at: Timestamp, start: NaiveTime, end: NaiveTime) -> bool {
        let local_time = at.with_timezone(&self.zone).time();
        if start <= end {
            local_time >= start && local_time <= end
        } else {
            local_time >= start || local_time <= end
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn anchor() -> TimezoneAnchor {
        TimezoneAnchor::new(chrono_tz::America::Bogota, 16)
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> Timestamp {
        chrono_tz::America::Bogota.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn trading_day_before_close_hour_belongs_to_previous_day() {
        let a = anchor();
        let ts = at(2026, 3, 10, 8, 0);
        assert_eq!(a.trading_day(ts), NaiveDate::from_ymd_opt(2026, 3, 9).unwrap());
    }

    #[test]
    fn trading_day_at_or_after_close_hour_belongs_to_same_day() {
        let a = anchor();
        let ts = at(2026, 3, 10, 16, 0);
        assert_eq!(a.trading_day(ts), NaiveDate::from_ymd_opt(2026, 3, 10).unwrap());
    }

    #[test]
    fn crossed_detects_boundary() {
        let a = anchor();
        let before = at(2026, 3, 10, 15, 59);
        let after = at(2026, 3, 10, 16, 1);
        assert!(a.crossed(before, after));
        assert!(!a.crossed(at(2026, 3, 10, 9, 0), at(2026, 3, 10, 10, 0)));
    }

    #[test]
    fn overnight_session_wraps_midnight() {
        let a = anchor();
        let start = NaiveTime::from_hms_opt(19, 0, 0).unwrap();
        let end = NaiveTime::from_hms_opt(6, 0, 0).unwrap();
        assert!(a.is_within_trading_hours(at(2026, 3, 10, 23, 0), start, end));
        assert!(a.is_within_trading_hours(at(2026, 3, 10, 2, 0), start, end));
        assert!(!a.is_within_trading_hours(at(2026, 3, 10, 12, 0), start, end));
    }

    #[test]
    fn same_day_session_does_not_wrap() {
        let a = anchor();
        let start = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let end = NaiveTime::from_hms_opt(17, 0, 0).unwrap();
        assert!(a.is_within_trading_hours(at(2026, 3, 10, 12, 0), start, end));
        assert!(!a.is_within_trading_hours(at(2026, 3, 10, 20, 0), start, end));
    }
}
