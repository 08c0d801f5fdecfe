//! M30 "clean break" latch (spec §4.F).
//!
//! Grounded on `original_source/core/m30_break_detector.py` (`update`,
//! `check_upward_break`, `check_downward_break`): a break is recorded the
//! instant the close-vs-EMA side flips, and the latch never self-resets —
//! it only changes when the opposite flip occurs.

use crate::types::Side;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Position {
    Above,
    Below,
}

fn position_of(close: f64, ema: f64) -> Position {
    if close >= ema {
        Position::Above
    } else {
        Position::Below
    }
}

/// Tracks the latest side-flip ("break") of M30 close vs. the long EMA for
/// one symbol. Latches the break index so callers can require the break to
/// still hold at the latest bar.
#[derive(Clone, Copy, Debug, Default)]
pub struct M30BreakDetector {
    last_position: Option<Position>,
    break_side: Option<Side>,
    break_index: Option<usize>,
}

impl M30BreakDetector {
    pub fn new() -> Self {
        M30BreakDetector::default()
    }

    /// Feeds the latest closed M30 bar at `index` (monotonically increasing
    /// per symbol). Records a new break only on a side flip.
    pub fn update(&mut self, close: f64, ema: f64, index: usize) {
        let position = position_of(close, ema);
        if let Some(prev) = self.last_position {
            if prev != position {
                self.break_side = Some(match position {
                    Position::Above => Side::Buy,
                    Position::Below => Side::Sell,
                });
                self.break_index = Some(index);
            }
        }
        self.last_position = Some(position);
    }

    pub fn break_side(&self) -> Option<Side> {
        self.break_side
    }

    pub fn break_index(&self) -> Option<usize> {
        self.break_index
    }

    /// True when the latch records an upward break and the latest bar
    /// (`close`, `ema`) is still above the EMA.
    pub fn check_upward_break(&self, close: f64, ema: f64) -> bool {
        self.break_side == Some(Side::Buy) && close >= ema
    }

    /// True when the latch records a downward break and the latest bar is
    /// still below the EMA.
    pub fn check_downward_break(&self, close: f64, ema: f64) -> bool {
        self.break_side == Some(Side::Sell) && close < ema
    }
}
