//! In-memory broker double used by orchestrator and integration tests.

use crate::broker::{AccountInfo, BrokerAdapter, BrokerPosition, Quote, SymbolInfo};
use crate::error::EngineResult;
use crate::types::{Bar, Side};
use async_trait::async_trait;
use std::sync::Mutex;

pub struct MockBroker {
    bars: Mutex<Vec<Bar>>,
    quote: Mutex<Quote>,
    positions: Mutex<Vec<BrokerPosition>>,
    orders_placed: Mutex<Vec<(String, Side, f64)>>,
    account: Mutex<AccountInfo>,
    symbol_info: Mutex<SymbolInfo>,
}

impl Default for MockBroker {
    fn default() -> Self {
        MockBroker {
            bars: Mutex::new(Vec::new()),
            quote: Mutex::new(Quote { bid: 0.0, ask: 0.0 }),
            positions: Mutex::new(Vec::new()),
            orders_placed: Mutex::new(Vec::new()),
            account: Mutex::new(AccountInfo { equity: 10_000.0, margin_free: 10_000.0 }),
            symbol_info: Mutex::new(SymbolInfo {
                point: 0.00001,
                contract_size: 1.0,
                volume_min: 0.001,
                volume_max: 100.0,
                volume_step: 0.001,
                digits: 5,
            }),
        }
    }
}

impl MockBroker {
    pub fn new() -> Self {
        MockBroker::default()
    }

    pub fn set_account_info(&self, info: AccountInfo) {
        *self.account.lock().unwrap() = info;
    }

    pub fn set_symbol_info(&self, info: SymbolInfo) {
        *self.symbol_info.lock().unwrap() = info;
    }

    pub fn set_bars(&self, bars: Vec<Bar>) {
        *self.bars.lock().unwrap() = bars;
    }

    pub fn set_quote(&self, quote: Quote) {
        *self.quote.lock().unwrap() = quote;
    }

    pub fn set_positions(&self, positions: Vec<BrokerPosition>) {
        *self.positions.lock().unwrap() = positions;
    }

    pub fn orders_placed(&self) -> Vec<(String, Side, f64)> {
        self.orders_placed.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrokerAdapter for MockBroker {
    async fn fetch_klines(&self, _symbol: &str, limit: usize) -> EngineResult<Vec<Bar>> {
        let bars = self.bars.lock().unwrap();
        let take = limit.min(bars.len());
        Ok(bars[bars.len() - take..].to_vec())
    }

    async fn quote(&self, _symbol: &str) -> EngineResult<Quote> {
        Ok(*self.quote.lock().unwrap())
    }

    async fn place_market_order(&self, symbol: &str, side: Side, qty: f64, _stop_loss: f64, _take_profit: f64) -> EngineResult<String> {
        self.orders_placed.lock().unwrap().push((symbol.to_string(), side, qty));
        Ok(format!("mock-order-{symbol}"))
    }

    async fn close_position(&self, symbol: &str, _side: Side, _qty: f64) -> EngineResult<String> {
        Ok(format!("mock-close-{symbol}"))
    }

    async fn open_positions(&self, symbol: &str) -> EngineResult<Vec<BrokerPosition>> {
        Ok(self.positions.lock().unwrap().iter().filter(|p| p.symbol == symbol).cloned().collect())
    }

    async fn all_open_positions(&self) -> EngineResult<Vec<BrokerPosition>> {
        Ok(self.positions.lock().unwrap().clone())
    }

    async fn account_info(&self) -> EngineResult<AccountInfo> {
        Ok(*self.account.lock().unwrap())
    }

    async fn symbol_info(&self, _symbol: &str) -> EngineResult<SymbolInfo> {
        Ok(*self.symbol_info.lock().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar(close: f64) -> Bar {
        let t = chrono_tz::America::Bogota.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Bar { start_time: t, open: close, high: close, low: close, close, volume: 1.0 }
    }

    #[tokio::test]
    async fn fetch_klines_returns_trailing_window() {
        let broker = MockBroker::new();
        broker.set_bars((1..=10).map(|i| bar(i as f64)).collect());
        let bars = broker.fetch_klines("BTCUSDT", 3).await.unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars.last().unwrap().close, 10.0);
    }

    #[tokio::test]
    async fn place_market_order_records_the_call() {
        let broker = MockBroker::new();
        broker.place_market_order("BTCUSDT", Side::Buy, 1.5, 90.0, 110.0).await.unwrap();
        assert_eq!(broker.orders_placed(), vec![("BTCUSDT".to_string(), Side::Buy, 1.5)]);
    }
}
