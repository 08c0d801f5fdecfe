//! Per-bot evaluator (spec §4.I): combines daily bias, trend alignment, the
//! M30 break or GAIN structure check, and the M1 trigger into a single
//! entry/no-entry decision for one `BotKind`.
//!
//! Grounded on `original_source/core/bot_engine.py` (`_check_pain_buy`,
//! `_check_pain_sell`, `_check_gain_buy`, `_check_gain_sell`).

use crate::daily_bias::Bias;
use crate::fibonacci::StructureCheck;
use crate::m1_state::M1State;
use crate::types::{BotKind, Side};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Enter(Side),
    NotReady,
}

/// One row of the bot's evaluation table (spec §4.I): whether this
/// precondition passed, a short machine-stable label for it, and a
/// human-readable detail string. The engine only consumes `verdict`;
/// `reasons` exists for the event sink and any UI built on top of it.
#[derive(Clone, Debug, PartialEq)]
pub struct Reason {
    pub pass: bool,
    pub label: &'static str,
    pub detail: String,
}

/// The full result of evaluating one bot: its enter/no-entry verdict plus
/// the table of checks that produced it.
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub reasons: Vec<Reason>,
}

/// Everything one bot's evaluation needs, assembled by the orchestrator from
/// a symbol's pipeline outputs for the current cycle.
pub struct BotInputs<'a> {
    pub bias: Bias,
    pub trend_aligned: bool,
    /// Rendered once per cycle via `trend_filter::summary` (e.g.
    /// "H1:green M30:green M15:red"), empty when no timeframe had both
    /// closed bars and an EMA yet.
    pub trend_summary: &'a str,
    pub m30_break_side: Option<Side>,
    pub structure: Option<&'a StructureCheck>,
    pub m1_state: M1State,
}

/// Evaluates `kind` against this cycle's inputs. PAIN bots require bias +
/// trend + an M30 break in the matching direction; GAIN bots require bias +
/// trend + a covering Fibonacci structure instead of a break. Both require
/// the M1 state machine to have reached `Ready` on the matching side. Unlike
/// a short-circuiting check, every row is evaluated so the reasons table is
/// always complete, even once an earlier row has already failed.
pub fn evaluate(kind: BotKind, inputs: &BotInputs) -> Evaluation {
    let side = kind.side();
    let mut reasons = Vec::with_capacity(4);

    let bias_ok = inputs.bias.side() == Some(side);
    reasons.push(Reason {
        pass: bias_ok,
        label: "bias",
        detail: format!("{} (need {side})", inputs.bias.summary()),
    });

    let trend_word = if inputs.trend_aligned { "is" } else { "is not" };
    let trend_detail = if inputs.trend_summary.is_empty() {
        format!("trend {trend_word} aligned for {side}")
    } else {
        format!("trend {trend_word} aligned for {side} ({})", inputs.trend_summary)
    };
    reasons.push(Reason { pass: inputs.trend_aligned, label: "trend", detail: trend_detail });

    let structural_ok = if kind.is_pain() {
        inputs.m30_break_side == Some(side)
    } else {
        inputs.structure.map(|s| s.covers).unwrap_or(false)
    };
    let structure_label = if kind.is_pain() { "m30_break" } else { "structure" };
    let structure_detail = if kind.is_pain() {
        match inputs.m30_break_side {
            Some(break_side) => format!("M30 break side is {break_side}, need {side}"),
            None => format!("no M30 break recorded yet, need {side}"),
        }
    } else {
        match inputs.structure {
            Some(s) => format!(
                "fib50={:.5}, H4 range [{:.5}, {:.5}], covers={}",
                s.fib50, s.h4_bar.low, s.h4_bar.high, s.covers
            ),
            None => "no structure data available".to_string(),
        }
    };
    reasons.push(Reason { pass: structural_ok, label: structure_label, detail: structure_detail });

    let trigger_ok = matches!(inputs.m1_state, M1State::Ready { side: ready_side } if ready_side == side);
    let trigger_detail = match inputs.m1_state {
        M1State::Ready { side: ready_side } => format!("m1 state is READY on {ready_side}, need {side}"),
        M1State::Crossed { side: cross_side, .. } => format!("m1 state is CROSSED on {cross_side}, not yet ready"),
        M1State::Idle => "m1 state is IDLE".to_string(),
        M1State::Executed => "m1 state is EXECUTED (already consumed this trigger)".to_string(),
    };
    reasons.push(Reason { pass: trigger_ok, label: "m1_trigger", detail: trigger_detail });

    let ready = reasons.iter().all(|r| r.pass);
    let verdict = if ready { Verdict::Enter(side) } else { Verdict::NotReady };
    Evaluation { verdict, reasons }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fibonacci::StructureCheck;
    use chrono::TimeZone;

    fn h4_bar() -> crate::types::Bar {
        let t = chrono_tz::America::Bogota.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        crate::types::Bar { start_time: t, open: 1.0, high: 2.0, low: 0.0, close: 1.5, volume: 1.0 }
    }

    #[test]
    fn pain_buy_enters_on_bias_trend_break_and_ready_trigger() {
        let inputs = BotInputs {
            bias: Bias::Buy,
            trend_aligned: true,
            trend_summary: "H1:green M30:green M15:green",
            m30_break_side: Some(Side::Buy),
            structure: None,
            m1_state: M1State::Ready { side: Side::Buy },
        };
        let evaluation = evaluate(BotKind::PainBuy, &inputs);
        assert_eq!(evaluation.verdict, Verdict::Enter(Side::Buy));
        assert!(evaluation.reasons.iter().all(|r| r.pass));
        assert_eq!(evaluation.reasons.len(), 4);
    }

    #[test]
    fn pain_buy_not_ready_without_matching_bias() {
        let inputs = BotInputs {
            bias: Bias::Sell { level50: 1.0 },
            trend_aligned: true,
            trend_summary: "H1:green M30:green M15:green",
            m30_break_side: Some(Side::Buy),
            structure: None,
            m1_state: M1State::Ready { side: Side::Buy },
        };
        let evaluation = evaluate(BotKind::PainBuy, &inputs);
        assert_eq!(evaluation.verdict, Verdict::NotReady);
        let bias_reason = evaluation.reasons.iter().find(|r| r.label == "bias").unwrap();
        assert!(!bias_reason.pass);
    }

    #[test]
    fn pain_sell_not_ready_without_trend_alignment() {
        let inputs = BotInputs {
            bias: Bias::Sell { level50: 1.0 },
            trend_aligned: false,
            trend_summary: "H1:red M30:green M15:green",
            m30_break_side: Some(Side::Sell),
            structure: None,
            m1_state: M1State::Ready { side: Side::Sell },
        };
        let evaluation = evaluate(BotKind::PainSell, &inputs);
        assert_eq!(evaluation.verdict, Verdict::NotReady);
        let trend_reason = evaluation.reasons.iter().find(|r| r.label == "trend").unwrap();
        assert!(!trend_reason.pass);
    }

    #[test]
    fn gain_buy_requires_covering_structure_instead_of_a_break() {
        let structure = StructureCheck { fib50: 1.0, h4_bar: h4_bar(), covers: true };
        let inputs = BotInputs {
            bias: Bias::Buy,
            trend_aligned: true,
            trend_summary: "H1:green M30:green M15:green",
            m30_break_side: None,
            structure: Some(&structure),
            m1_state: M1State::Ready { side: Side::Buy },
        };
        let evaluation = evaluate(BotKind::GainBuy, &inputs);
        assert_eq!(evaluation.verdict, Verdict::Enter(Side::Buy));
        assert!(evaluation.reasons.iter().any(|r| r.label == "structure" && r.pass));
    }

    #[test]
    fn gain_sell_not_ready_when_structure_does_not_cover() {
        let structure = StructureCheck { fib50: 1.0, h4_bar: h4_bar(), covers: false };
        let inputs = BotInputs {
            bias: Bias::Sell { level50: 1.0 },
            trend_aligned: true,
            trend_summary: "H1:green M30:green M15:green",
            m30_break_side: None,
            structure: Some(&structure),
            m1_state: M1State::Ready { side: Side::Sell },
        };
        let evaluation = evaluate(BotKind::GainSell, &inputs);
        assert_eq!(evaluation.verdict, Verdict::NotReady);
        let structure_reason = evaluation.reasons.iter().find(|r| r.label == "structure").unwrap();
        assert!(!structure_reason.pass);
    }

    #[test]
    fn not_ready_until_m1_state_reaches_ready_on_matching_side() {
        let inputs = BotInputs {
            bias: Bias::Buy,
            trend_aligned: true,
            trend_summary: "H1:green M30:green M15:green",
            m30_break_side: Some(Side::Buy),
            structure: None,
            m1_state: M1State::Crossed { side: Side::Buy, cross_bar_index: 3 },
        };
        let evaluation = evaluate(BotKind::PainBuy, &inputs);
        assert_eq!(evaluation.verdict, Verdict::NotReady);
        let trigger_reason = evaluation.reasons.iter().find(|r| r.label == "m1_trigger").unwrap();
        assert!(!trigger_reason.pass);
    }
}
