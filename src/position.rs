//! Order intent sizing and exit monitoring (spec §4.K).
//!
//! Grounded on `original_source/core/order_manager.py` (`execute_buy`,
//! `execute_sell`, TP/SL sizing) and `original_source/core/exit_manager.py`
//! (`_check_m5_purple_break`, `check_profit_targets`).

use crate::types::{Bar, Side};

/// A fully-sized order ready to send to the broker: TP distance is derived
/// from the fixed USD target and the symbol's contract size; SL distance is
/// `3x` the TP distance, placed on the opposite side — unchanged from the
/// original's risk multiplier.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrderIntent {
    pub side: Side,
    pub lot_size: f64,
    pub entry_price: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
}

const SL_RISK_MULTIPLIER: f64 = 3.0;

pub fn size_order(side: Side, entry_price: f64, lot_size: f64, contract_size: f64, trade_target_usd: f64) -> OrderIntent {
    let tp_distance = trade_target_usd / (contract_size * lot_size);
    let sl_distance = tp_distance * SL_RISK_MULTIPLIER;
    let (take_profit, stop_loss) = match side {
        Side::Buy => (entry_price + tp_distance, entry_price - sl_distance),
        Side::Sell => (entry_price - tp_distance, entry_price + sl_distance),
    };
    OrderIntent { side, lot_size, entry_price, take_profit, stop_loss }
}

/// Early-exit check against the M5 purple line (short EMA), gated by
/// `risk_management.early_exit_on_m5_break`. A BUY position exits once M5
/// close drops below the purple line; a SELL position exits once it rises
/// above it.
pub fn check_m5_early_exit(side: Side, m5_close: f64, m5_purple: f64, enabled: bool) -> bool {
    if !enabled {
        return false;
    }
    match side {
        Side::Buy => m5_close < m5_purple,
        Side::Sell => m5_close > m5_purple,
    }
}

/// Whether a position's TP or SL has been reached by the latest closed M1
/// bar. The broker enforces the actual fill; the orchestrator uses this only
/// to label an externally-closed position's reason ("TP/SL" vs "manual")
/// once the broker has already reported the position gone.
pub fn profit_target_reached(side: Side, bar: &Bar, take_profit: f64, stop_loss: f64) -> bool {
    match side {
        Side::Buy => bar.high >= take_profit || bar.low <= stop_loss,
        Side::Sell => bar.low <= take_profit || bar.high >= stop_loss,
    }
}
