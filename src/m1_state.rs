//! M1 cross-then-touch entry trigger state machine (spec §4.G).
//!
//! Grounded on `original_source/core/m1_state_machine.py` (`EntryState`,
//! `update`, `mark_executed`, `reset`). Each phase carries only the fields
//! that are meaningful in that phase — an `Idle` state cannot also be
//! holding a stale `cross_bar_index`, per the phase-restricted-fields design
//! note in spec §9.

use crate::types::Side;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum M1State {
    Idle,
    Crossed { side: Side, cross_bar_index: usize },
    Ready { side: Side },
    Executed,
}

impl Default for M1State {
    fn default() -> Self {
        M1State::Idle
    }
}

/// One M1 bar's inputs to the state machine: close/low/high relative to the
/// purple line (short EMA) and the snake (long EMA) color side.
pub struct M1Tick {
    pub bar_index: usize,
    pub close: f64,
    pub low: f64,
    pub high: f64,
    pub purple: f64,
    pub snake_is_green: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct M1StateMachine {
    state: M1State,
    prev_close: Option<f64>,
    prev_purple: Option<f64>,
}

impl M1StateMachine {
    pub fn new() -> Self {
        M1StateMachine::default()
    }

    pub fn state(&self) -> M1State {
        self.state
    }

    /// Advances the machine one M1 bar. `max_gap` bounds how many bars may
    /// elapse between a cross and its confirming touch before the machine
    /// gives up and returns to `Idle`.
    pub fn update(&mut self, tick: &M1Tick, max_gap: usize) {
        let next = match self.state {
            M1State::Idle => self.from_idle(tick),
            M1State::Crossed { side, cross_bar_index } => self.from_crossed(tick, side, cross_bar_index, max_gap),
            M1State::Ready { side } => M1State::Ready { side },
            M1State::Executed => M1State::Executed,
        };
        self.state = next;
        self.prev_close = Some(tick.close);
        self.prev_purple = Some(tick.purple);
    }

    fn from_idle(&self, tick: &M1Tick) -> M1State {
        if let (Some(prev_close), Some(prev_purple)) = (self.prev_close, self.prev_purple) {
            if prev_close < prev_purple && tick.close > tick.purple {
                return M1State::Crossed { side: Side::Buy, cross_bar_index: tick.bar_index };
            }
            if prev_close > prev_purple && tick.close < tick.purple {
                return M1State::Crossed { side: Side::Sell, cross_bar_index: tick.bar_index };
            }
        }
        M1State::Idle
    }

    fn from_crossed(&self, tick: &M1Tick, side: Side, cross_bar_index: usize, max_gap: usize) -> M1State {
        let bars_since_cross = tick.bar_index.saturating_sub(cross_bar_index);
        if bars_since_cross > max_gap {
            return M1State::Idle;
        }
        let touched = tick.low <= tick.purple && tick.purple <= tick.high;
        match side {
            Side::Buy => {
                if tick.close < tick.purple {
                    return M1State::Idle;
                }
                if touched {
                    if tick.close >= tick.purple && tick.snake_is_green {
                        return M1State::Ready { side: Side::Buy };
                    }
                    return M1State::Idle;
                }
                M1State::Crossed { side, cross_bar_index }
            }
            Side::Sell => {
                if tick.close > tick.purple {
                    return M1State::Idle;
                }
                if touched {
                    if tick.close <= tick.purple && !tick.snake_is_green {
                        return M1State::Ready { side: Side::Sell };
                    }
                    return M1State::Idle;
                }
                M1State::Crossed { side, cross_bar_index }
            }
        }
    }

    /// Consumes the `Ready` state once an order has actually been placed.
    pub fn mark_executed(&mut self) {
        if matches!(self.state, M1State::Ready { .. }) {
            self.state = M1State::Executed;
        }
    }

    /// Returns the machine to `Idle` with all phase-local memory cleared,
    /// e.g. after a position closes or at the start of a new trading day.
    pub fn reset(&mut self) {
        self.state = M1State::Idle;
        self.prev_close = None;
        self.prev_purple = None;
    }
}
