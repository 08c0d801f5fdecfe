//! Telegram push sink, grounded on the teacher's `telegram.rs`
//! (`TelegramBot::send`, `notify_trade_open`, `notify_trade_close`,
//! `notify_risk_alert`).

use crate::config::Secrets;
use crate::sink::{Event, EventSink};
use async_trait::async_trait;

const BASE_URL: &str = "https://api.telegram.org";

pub struct TelegramSink {
    client: reqwest::Client,
    url: String,
    chat_id: String,
}

impl TelegramSink {
    pub fn new(secrets: &Secrets) -> Option<Self> {
        let token = secrets.telegram_token.clone()?;
        let chat_id = secrets.telegram_chat_id.clone()?;
        Some(TelegramSink {
            client: reqwest::Client::new(),
            url: format!("{BASE_URL}/bot{token}/sendMessage"),
            chat_id,
        })
    }

    async fn send(&self, text: &str) {
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        match self.client.post(&self.url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!("telegram message sent");
            }
            Ok(resp) => tracing::warn!(status = %resp.status(), "telegram send returned error status"),
            Err(e) => tracing::warn!(error = %e, "telegram send failed"),
        }
    }
}

#[async_trait]
impl EventSink for TelegramSink {
    async fn publish(&self, event: Event<'_>) {
        match event {
            Event::Started => self.send("🤖 <b>wickline started</b>").await,
            Event::TradeOpened { symbol, bot, side, qty, entry, stop_loss, take_profit } => {
                let emoji = if matches!(side, crate::types::Side::Buy) { "🟢" } else { "🔴" };
                let msg = format!(
                    "{emoji} <b>Trade Opened — {side} {symbol} ({bot})</b>\n\
                     Qty:   <code>{qty:.4}</code>\n\
                     Entry: <code>{entry:.5}</code>\n\
                     SL:    <code>{stop_loss:.5}</code>\n\
                     TP:    <code>{take_profit:.5}</code>",
                );
                self.send(&msg).await;
            }
            Event::TradeClosed { symbol, bot, side, entry, exit, pnl_usd, reason } => {
                let emoji = if pnl_usd >= 0.0 { "✅" } else { "❌" };
                let msg = format!(
                    "{emoji} <b>Trade Closed — {side} {symbol} ({bot})</b>\n\
                     Entry: <code>{entry:.5}</code>  Exit: <code>{exit:.5}</code>\n\
                     PnL:   <code>{pnl_usd:+.2} USD</code>\n\
                     Reason: {reason}",
                );
                self.send(&msg).await;
            }
            Event::RiskAlert { symbol, message } => {
                self.send(&format!("⚠️ <b>Risk Alert — {symbol}</b>\n{message}")).await;
            }
            Event::DailySummary { symbol, pnl_usd, trades } => {
                let msg = format!(
                    "📊 <b>Daily Summary — {symbol}</b>\n\
                     PnL:    <code>{pnl_usd:+.2} USD</code>\n\
                     Trades: <code>{trades}</code>",
                );
                self.send(&msg).await;
            }
            Event::Error { symbol, detail } => {
                self.send(&format!("🚨 <b>Error — {symbol}</b>\n{detail}")).await;
            }
            // Fires once per symbol every cycle; a push channel would drown
            // in it. The tracing sink carries bot status instead.
            Event::BotStatus { .. } => {}
        }
    }
}
