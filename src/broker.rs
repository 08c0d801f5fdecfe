//! Broker adapter contract (spec §6): the one seam between the decision
//! pipeline and a live trading venue.

pub mod bybit;
pub mod mock;

use crate::error::EngineResult;
use crate::types::{Bar, Side, Timeframe};
use async_trait::async_trait;

/// A live position as reported by the broker, used to reconcile locally
/// tracked `OpenPosition`s against reality (spec §4.K "sync with broker").
///
/// `ticket` is an opaque identifier the adapter chooses; it only needs to be
/// stable enough that a position placed with a given ticket can be found
/// again (or found gone) in a later `open_positions` call for the same
/// symbol. Different adapters can back it with very different things — a
/// true per-order id, or, for a netting-mode venue that doesn't expose one,
/// a `(symbol, side)` key (see [`bybit::BybitBroker`]).
#[derive(Clone, Debug, PartialEq)]
pub struct BrokerPosition {
    pub symbol: String,
    pub ticket: String,
    pub side: Side,
    pub size: f64,
    pub avg_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// Current best bid/ask for spread gating (spec §4.J gate 3).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

/// Account-level health figures for risk gate 7 (spec §4.J).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AccountInfo {
    pub equity: f64,
    pub margin_free: f64,
}

impl AccountInfo {
    pub fn healthy(&self) -> bool {
        self.equity > 0.0 && self.margin_free > 0.0
    }
}

/// Per-symbol trading parameters (spec §6 `get_symbol_info`), used for
/// TP/SL sizing (§4.K) and the spread-in-pips conversion (§4.J gate 3).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SymbolInfo {
    pub point: f64,
    pub contract_size: f64,
    pub volume_min: f64,
    pub volume_max: f64,
    pub volume_step: f64,
    pub digits: u32,
}

impl SymbolInfo {
    /// One pip is conventionally ten points (spec §8 scenario 6: 30 points
    /// at `point = 0.00001` is 3.0 pips).
    pub fn pips(&self, price_distance: f64) -> f64 {
        if self.point <= 0.0 {
            return 0.0;
        }
        price_distance / (self.point * 10.0)
    }
}

/// Every broker interaction the orchestrator needs. One concrete
/// implementation ([`bybit::BybitBroker`]) and one test double
/// ([`mock::MockBroker`]) are provided.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    async fn fetch_klines(&self, symbol: &str, limit: usize) -> EngineResult<Vec<Bar>>;

    async fn quote(&self, symbol: &str) -> EngineResult<Quote>;

    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        qty: f64,
        stop_loss: f64,
        take_profit: f64,
    ) -> EngineResult<String>;

    async fn close_position(&self, symbol: &str, side: Side, qty: f64) -> EngineResult<String>;

    /// All currently open positions for `symbol` (spec §6
    /// `get_open_positions(symbol?)`). A netting-mode venue returns at most
    /// one per side; a hedge-mode or ticket-per-order venue may return
    /// several independently closeable positions on the same side.
    async fn open_positions(&self, symbol: &str) -> EngineResult<Vec<BrokerPosition>>;

    async fn all_open_positions(&self) -> EngineResult<Vec<BrokerPosition>>;

    async fn account_info(&self) -> EngineResult<AccountInfo>;

    async fn symbol_info(&self, symbol: &str) -> EngineResult<SymbolInfo>;
}

/// Wraps a real adapter, delegating every read (`fetch_klines`, `quote`,
/// `open_positions`, `all_open_positions`) but logging instead of sending
/// writes (`place_market_order`, `close_position`). Used by the `--dry-run`
/// CLI flag to exercise the full decision pipeline against a live broker
/// without risking capital.
pub struct DryRunBroker<B> {
    inner: B,
}

impl<B: BrokerAdapter> DryRunBroker<B> {
    pub fn new(inner: B) -> Self {
        DryRunBroker { inner }
    }
}

#[async_trait]
impl<B: BrokerAdapter> BrokerAdapter for DryRunBroker<B> {
    async fn fetch_klines(&self, symbol: &str, limit: usize) -> EngineResult<Vec<Bar>> {
        self.inner.fetch_klines(symbol, limit).await
    }

    async fn quote(&self, symbol: &str) -> EngineResult<Quote> {
        self.inner.quote(symbol).await
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        qty: f64,
        stop_loss: f64,
        take_profit: f64,
    ) -> EngineResult<String> {
        tracing::info!(symbol, %side, qty, stop_loss, take_profit, "dry-run: order not sent");
        Ok(format!("dry-run-{symbol}"))
    }

    async fn close_position(&self, symbol: &str, side: Side, qty: f64) -> EngineResult<String> {
        tracing::info!(symbol, %side, qty, "dry-run: close not sent");
        Ok(format!("dry-run-close-{symbol}"))
    }

    async fn open_positions(&self, symbol: &str) -> EngineResult<Vec<BrokerPosition>> {
        self.inner.open_positions(symbol).await
    }

    async fn all_open_positions(&self) -> EngineResult<Vec<BrokerPosition>> {
        self.inner.all_open_positions().await
    }

    async fn account_info(&self) -> EngineResult<AccountInfo> {
        self.inner.account_info().await
    }

    async fn symbol_info(&self, symbol: &str) -> EngineResult<SymbolInfo> {
        self.inner.symbol_info(symbol).await
    }
}

/// Tags a broker-native timeframe string for kline requests.
pub fn timeframe_interval(tf: Timeframe) -> &'static str {
    match tf {
        Timeframe::M1 => "1",
        Timeframe::M5 => "5",
        Timeframe::M15 => "15",
        Timeframe::M30 => "30",
        Timeframe::H1 => "60",
        Timeframe::H4 => "240",
        Timeframe::D1 => "D",
    }
}
