//! Fibonacci 50% structural check for GAIN bots (spec §4.H).
//!
//! Grounded on `original_source/core/fibonacci_checker.py`
//! (`find_m15_swing_buy/sell`, `find_largest_body_h4`,
//! `check_h4_covers_fib50`, `check_gain_buy_structure`/`check_gain_sell_structure`).

use crate::types::Bar;

/// The M15 swing is the day's extrema over the supplied closed bars — day
/// extrema, not a fractal pivot, per Open Question 3 in spec §9.
pub fn m15_swing_fib50(m15_bars: &[Bar]) -> Option<f64> {
    if m15_bars.is_empty() {
        return None;
    }
    let swing_low = m15_bars.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    let swing_high = m15_bars.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    Some(swing_low + 0.5 * (swing_high - swing_low))
}

/// The largest-body H4 candle among the last `candidates` *closed* bars,
/// excluding whatever H4 bar may still be forming — mirrors the original's
/// `h4_bars[-candidates-1:-1]` slice.
pub fn largest_body_h4<'a>(h4_bars: &'a [Bar], candidates: usize) -> Option<&'a Bar> {
    if h4_bars.is_empty() || candidates == 0 {
        return None;
    }
    let take = candidates.min(h4_bars.len());
    h4_bars[h4_bars.len() - take..].iter().max_by(|a, b| a.body().partial_cmp(&b.body()).unwrap())
}

pub fn h4_covers_fib50(h4_bar: &Bar, fib50: f64) -> bool {
    h4_bar.low <= fib50 && fib50 <= h4_bar.high
}

/// Combined structure check: the M15 50% retracement level must fall within
/// the range of the largest-bodied recent H4 candle.
pub struct StructureCheck {
    pub fib50: f64,
    pub h4_bar: Bar,
    pub covers: bool,
}

pub fn check_gain_structure(m15_bars: &[Bar], h4_bars: &[Bar], h4_candidates: usize) -> Option<StructureCheck> {
    let fib50 = m15_swing_fib50(m15_bars)?;
    let h4_bar = *largest_body_h4(h4_bars, h4_candidates)?;
    let covers = h4_covers_fib50(&h4_bar, fib50);
    Some(StructureCheck { fib50, h4_bar, covers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Bar {
        let t = chrono_tz::America::Bogota.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Bar { start_time: t, open, high, low, close, volume: 1.0 }
    }

    #[test]
    fn swing_fib50_is_midpoint_of_day_extrema() {
        let bars = vec![bar(10.0, 12.0, 9.0, 11.0), bar(11.0, 15.0, 10.0, 14.0), bar(14.0, 16.0, 13.0, 15.0)];
        // swing_low = 9.0, swing_high = 16.0 -> fib50 = 12.5
        assert_eq!(m15_swing_fib50(&bars), Some(12.5));
    }

    #[test]
    fn empty_m15_bars_yield_no_fib50() {
        assert_eq!(m15_swing_fib50(&[]), None);
    }

    #[test]
    fn largest_body_picks_biggest_among_last_n_closed_candidates() {
        let bars = vec![
            bar(1.0, 2.0, 0.0, 1.0),   // forming bar, excluded by the caller's closed-bars cut
            bar(10.0, 15.0, 9.0, 11.0), // body 1
            bar(10.0, 20.0, 5.0, 18.0), // body 8 -> largest
            bar(10.0, 15.0, 9.0, 10.5), // body 0.5
        ];
        let chosen = largest_body_h4(&bars, 3).unwrap();
        assert_eq!(chosen.close, 18.0);
    }

    #[test]
    fn h4_covers_fib50_checks_range_inclusively() {
        let b = bar(10.0, 20.0, 5.0, 18.0);
        assert!(h4_covers_fib50(&b, 12.5));
        assert!(h4_covers_fib50(&b, 5.0));
        assert!(h4_covers_fib50(&b, 20.0));
        assert!(!h4_covers_fib50(&b, 4.9));
    }

    #[test]
    fn combined_check_reports_coverage() {
        let m15 = vec![bar(10.0, 12.0, 9.0, 11.0), bar(11.0, 15.0, 10.0, 14.0)];
        let h4 = vec![bar(10.0, 20.0, 5.0, 18.0)];
        let result = check_gain_structure(&m15, &h4, 3).unwrap();
        assert!(result.covers);
    }
}
