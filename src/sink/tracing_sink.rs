//! Structured-log sink: one `tracing` event per pipeline event, replacing
//! the teacher's `log`/`env_logger` pair (spec §1 ambient logging).

use crate::sink::{Event, EventSink};
use async_trait::async_trait;

pub struct TracingSink;

impl TracingSink {
    pub fn new() -> Self {
        TracingSink
    }
}

#[async_trait]
impl EventSink for TracingSink {
    async fn publish(&self, event: Event<'_>) {
        match event {
            Event::Started => tracing::info!("engine started"),
            Event::TradeOpened { symbol, bot, side, qty, entry, stop_loss, take_profit } => {
                tracing::info!(symbol, %bot, %side, qty, entry, stop_loss, take_profit, "trade opened");
            }
            Event::TradeClosed { symbol, bot, side, entry, exit, pnl_usd, reason } => {
                tracing::info!(symbol, %bot, %side, entry, exit, pnl_usd, reason, "trade closed");
            }
            Event::RiskAlert { symbol, message } => {
                tracing::warn!(symbol, message, "risk alert");
            }
            Event::DailySummary { symbol, pnl_usd, trades } => {
                tracing::info!(symbol, pnl_usd, trades, "daily summary");
            }
            Event::Error { symbol, detail } => {
                tracing::error!(symbol, detail, "pipeline error");
            }
            Event::BotStatus { symbol, bots } => {
                for entry in &bots {
                    let failing: Vec<&str> = entry.reasons.iter().filter(|r| !r.pass).map(|r| r.label).collect();
                    tracing::debug!(symbol, bot = %entry.bot, ready = entry.ready, ?failing, "bot status");
                }
            }
        }
    }
}
