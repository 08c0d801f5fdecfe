//! Multi-timeframe trend alignment check (spec §4.E).
//!
//! Grounded on `original_source/core/trend_filter.py` (`check_alignment`,
//! `get_trend_summary`), which checks snake color agreement across
//! `['H1', 'M30', 'M15']`.

use crate::types::{Color, Timeframe};

/// One timeframe's snake color, used both to decide alignment and to render
/// the human-readable summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeframeColor {
    pub timeframe: Timeframe,
    pub color: Color,
}

/// True when every timeframe in `colors` matches `required`. An empty
/// `colors` slice (missing data on one of the configured timeframes) never
/// counts as aligned.
pub fn check_alignment(colors: &[TimeframeColor], required: Color) -> bool {
    !colors.is_empty() && colors.iter().all(|c| c.color == required)
}

/// [SUPPLEMENT, from original_source/core/trend_filter.py
/// `get_trend_summary`] — e.g. "H1:green M30:green M15:red", consumed only
/// by the event sink.
pub fn summary(colors: &[TimeframeColor]) -> String {
    colors
        .iter()
        .map(|c| format!("{}:{}", c.timeframe, color_str(c.color)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn color_str(color: Color) -> &'static str {
    match color {
        Color::Green => "green",
        Color::Red => "red",
        Color::Neutral => "neutral",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colors(values: &[(Timeframe, Color)]) -> Vec<TimeframeColor> {
        values.iter().map(|&(timeframe, color)| TimeframeColor { timeframe, color }).collect()
    }

    #[test]
    fn aligned_when_all_timeframes_match() {
        let c = colors(&[(Timeframe::H1, Color::Green), (Timeframe::M30, Color::Green), (Timeframe::M15, Color::Green)]);
        assert!(check_alignment(&c, Color::Green));
    }

    #[test]
    fn not_aligned_when_one_timeframe_disagrees() {
        let c = colors(&[(Timeframe::H1, Color::Green), (Timeframe::M30, Color::Red), (Timeframe::M15, Color::Green)]);
        assert!(!check_alignment(&c, Color::Green));
    }

    #[test]
    fn empty_input_never_aligns() {
        assert!(!check_alignment(&[], Color::Green));
    }

    #[test]
    fn summary_renders_each_timeframe() {
        let c = colors(&[(Timeframe::H1, Color::Green), (Timeframe::M30, Color::Red)]);
        assert_eq!(summary(&c), "H1:green M30:red");
    }
}
