//! Event sink contract (spec §6): everything the pipeline reports outward,
//! decoupled from how it's actually delivered.

pub mod fanout;
pub mod null;
pub mod telegram;
pub mod tracing_sink;

use crate::bots::Reason;
use crate::types::{BotKind, Side};
use async_trait::async_trait;

/// One bot's readiness row within a `BotStatus` event: its verdict plus the
/// reasons table that produced it (spec §4.I).
#[derive(Clone, Debug)]
pub struct BotReasonEntry {
    pub bot: BotKind,
    pub ready: bool,
    pub reasons: Vec<Reason>,
}

/// One notable pipeline event. Sinks decide how (or whether) to render each
/// variant; the pipeline never formats presentation strings itself.
#[derive(Clone, Debug)]
pub enum Event<'a> {
    Started,
    TradeOpened { symbol: &'a str, bot: BotKind, side: Side, qty: f64, entry: f64, stop_loss: f64, take_profit: f64 },
    TradeClosed { symbol: &'a str, bot: BotKind, side: Side, entry: f64, exit: f64, pnl_usd: f64, reason: &'a str },
    RiskAlert { symbol: &'a str, message: &'a str },
    DailySummary { symbol: &'a str, pnl_usd: f64, trades: u32 },
    Error { symbol: &'a str, detail: &'a str },
    /// Per-symbol, per-cycle readiness snapshot across all of that symbol's
    /// bots (spec §4.L step 6). Emitted once per cycle regardless of whether
    /// any bot actually entered.
    BotStatus { symbol: &'a str, bots: Vec<BotReasonEntry> },
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: Event<'_>);
}
