//! Core data types shared across the decision pipeline.
//!
//! `Timestamp` is always expressed in the configured anchor timezone
//! (see [`crate::timezone`]) — the pipeline never mixes UTC and local wall
//! time internally.

use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type Timestamp = DateTime<Tz>;

/// One closed OHLCV bar. Never mutated after publication (spec §3).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bar {
    pub start_time: Timestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }
}

/// The seven timeframes the resampler produces from M1 input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 7] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    /// Nominal duration in minutes. For D1 this is used only for ordering
    /// and logging — the actual bucketing follows the trading-day key, not
    /// a fixed 1440-minute clock (spec §3).
    pub fn duration_minutes(self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "M1" => Ok(Timeframe::M1),
            "M5" => Ok(Timeframe::M5),
            "M15" => Ok(Timeframe::M15),
            "M30" => Ok(Timeframe::M30),
            "H1" => Ok(Timeframe::H1),
            "H4" => Ok(Timeframe::H4),
            "D1" => Ok(Timeframe::D1),
            other => Err(format!("unknown timeframe: {other}")),
        }
    }
}

/// Trade direction, shared by signals, positions and broker order requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Price position relative to the long EMA (spec §4.C "snake color").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
    Green,
    Red,
    Neutral,
}

/// The four independent bots that run per symbol (spec §1, §4.I).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BotKind {
    PainBuy,
    PainSell,
    GainBuy,
    GainSell,
}

impl BotKind {
    pub const ALL: [BotKind; 4] = [
        BotKind::PainBuy,
        BotKind::PainSell,
        BotKind::GainBuy,
        BotKind::GainSell,
    ];

    pub fn side(self) -> Side {
        match self {
            BotKind::PainBuy | BotKind::GainBuy => Side::Buy,
            BotKind::PainSell | BotKind::GainSell => Side::Sell,
        }
    }

    pub fn is_pain(self) -> bool {
        matches!(self, BotKind::PainBuy | BotKind::PainSell)
    }

    pub fn is_gain(self) -> bool {
        matches!(self, BotKind::GainBuy | BotKind::GainSell)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BotKind::PainBuy => "pain_buy",
            BotKind::PainSell => "pain_sell",
            BotKind::GainBuy => "gain_buy",
            BotKind::GainSell => "gain_sell",
        }
    }
}

impl fmt::Display for BotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operational status of one (symbol, bot-kind) pair (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BotStatus {
    Idle,
    Scanning,
    Ready,
    InPosition,
    Halted,
}

/// An open position tracked locally against one (symbol, bot-kind).
#[derive(Clone, Debug, PartialEq)]
pub struct OpenPosition {
    pub ticket: String,
    pub side: Side,
    pub entry_price: f64,
    pub entry_time: Timestamp,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub lot_size: f64,
}

/// Per (symbol, bot-kind) record: status plus the open position, if any.
#[derive(Clone, Debug, PartialEq)]
pub struct BotRecord {
    pub status: BotStatus,
    pub position: Option<OpenPosition>,
}

impl Default for BotRecord {
    fn default() -> Self {
        BotRecord { status: BotStatus::Idle, position: None }
    }
}

/// Running daily profit/loss aggregate for one symbol, reset at the trading
/// day boundary (spec §4.J gates 4 and 5).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DailyPnl {
    pub profit: f64,
    pub loss: f64,
    pub trade_count: u32,
}

impl DailyPnl {
    pub fn record(&mut self, profit_usd: f64) {
        if profit_usd > 0.0 {
            self.profit += profit_usd;
        } else {
            self.loss += profit_usd.abs();
        }
        self.trade_count += 1;
    }
}
