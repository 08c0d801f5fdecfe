//! Daily directional bias, derived from the previous trading day's closed D1
//! candle (spec §4.D).
//!
//! Grounded on `original_source/core/daily_bias.py` (`compute_bias`,
//! `get_bias`, `is_day_stop_triggered`, `get_bias_summary`).

use crate::types::{Bar, Side};
use chrono::NaiveDate;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Bias {
    Buy,
    /// `level50` is the SELL-day stop level: `min(open, close) - 0.5 *
    /// lower_wick`. Implemented exactly as spec.md §4.D states — this is
    /// Open Question 1, resolved in favor of the spec's stated formula, not
    /// a "corrected" one.
    Sell { level50: f64 },
    Neutral,
}

impl Bias {
    pub fn side(&self) -> Option<Side> {
        match self {
            Bias::Buy => Some(Side::Buy),
            Bias::Sell { .. } => Some(Side::Sell),
            Bias::Neutral => None,
        }
    }

    /// [SUPPLEMENT, from original_source/core/daily_bias.py
    /// `get_bias_summary`] — consumed only by the event sink's status line,
    /// never by the decision pipeline.
    pub fn summary(&self) -> String {
        match self {
            Bias::Buy => "BUY day".to_string(),
            Bias::Sell { level50 } => format!("SELL day (stop level {level50:.5})"),
            Bias::Neutral => "NEUTRAL day".to_string(),
        }
    }
}

/// Computes the bias from one closed D1 candle using the small-body and
/// wick-dominance rules from the original: a body smaller than its longest
/// wick is treated as indecisive and yields `Neutral`; otherwise the wick
/// that exceeds the other by more than `epsilon` decides the day.
pub fn compute_bias(d1_bar: &Bar, epsilon: f64) -> Bias {
    let body = d1_bar.body();
    let upper_wick = d1_bar.high - d1_bar.open.max(d1_bar.close);
    let lower_wick = d1_bar.open.min(d1_bar.close) - d1_bar.low;
    let longest_wick = upper_wick.max(lower_wick);

    if longest_wick <= body {
        return Bias::Neutral;
    }
    // Lower wick dominant (price rejected lower) reads as a BUY day; upper
    // wick dominant (price rejected higher) reads as a SELL day, with
    // level50 still anchored on the lower wick per the stated formula.
    if lower_wick > upper_wick * (1.0 + epsilon) {
        Bias::Buy
    } else if upper_wick > lower_wick * (1.0 + epsilon) {
        let level50 = d1_bar.open.min(d1_bar.close) - 0.5 * lower_wick;
        Bias::Sell { level50 }
    } else {
        Bias::Neutral
    }
}

/// Day-stop check for PAIN-SELL: a SELL-day bot halts once price trades at
/// or below `level50` (the prior day's level50 stop), for the rest of the
/// trading day.
pub fn is_day_stop_triggered(bias: &Bias, current_price: f64) -> bool {
    match bias {
        Bias::Sell { level50 } => current_price <= *level50,
        _ => false,
    }
}

/// Caches one `Bias` per trading day so the orchestrator computes it once
/// per day rather than on every cycle.
#[derive(Clone, Debug, Default)]
pub struct DailyBiasCache {
    entry: Option<(NaiveDate, Bias)>,
}

impl DailyBiasCache {
    pub fn new() -> Self {
        DailyBiasCache::default()
    }

    pub fn get_or_compute(&mut self, day: NaiveDate, d1_bar: &Bar, epsilon: f64) -> Bias {
        if let Some((cached_day, bias)) = &self.entry {
            if *cached_day == day {
                return *bias;
            }
        }
        let bias = compute_bias(d1_bar, epsilon);
        self.entry = Some((day, bias));
        bias
    }

    pub fn current(&self) -> Option<Bias> {
        self.entry.map(|(_, b)| b)
    }
}
