//! Cooperative single-scheduler orchestrator (spec §4.L, §5).
//!
//! One `tokio::task` per symbol polls its broker klines roughly every two
//! seconds, runs the decision pipeline, and funnels resulting events into a
//! shared `mpsc` channel the orchestrator drains into the event sink —
//! mirroring the teacher's `tokio::spawn`-per-pair REST prefetch pattern in
//! `main.rs`, generalized from one-shot prefetch to a standing poll loop.

use crate::bots::{self, BotInputs, Verdict};
use crate::broker::BrokerAdapter;
use crate::config::Config;
use crate::daily_bias;
use crate::ema;
use crate::error::{EngineError, EngineResult};
use crate::fibonacci;
use crate::position;
use crate::risk::{self, RiskCheckInputs};
use crate::sink::{BotReasonEntry, Event, EventSink};
use crate::symbol_state::SymbolState;
use crate::timezone::TimezoneAnchor;
use crate::trend_filter::{self, TimeframeColor};
use crate::types::{BotKind, BotStatus, Color, OpenPosition, Side, Timeframe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

const POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Bar cache TTL (spec §4.L): shields the broker from a hot loop across the
/// ~2s orchestrator cycle.
const BAR_CACHE_TTL: Duration = Duration::from_secs(60);

pub struct Engine {
    config: Arc<Config>,
    anchor: TimezoneAnchor,
    broker: Arc<dyn BrokerAdapter>,
    sink: Arc<dyn EventSink>,
    symbols: Vec<(String, Arc<Mutex<SymbolState>>)>,
}

impl Engine {
    pub fn new(config: Arc<Config>, broker: Arc<dyn BrokerAdapter>, sink: Arc<dyn EventSink>) -> EngineResult<Self> {
        let zone = config
            .environment
            .timezone
            .parse()
            .map_err(|_| EngineError::ConfigInvalid(format!("bad timezone {:?}", config.environment.timezone)))?;
        let anchor = TimezoneAnchor::new(zone, config.environment.daily_close_hour);
        let symbols = config
            .symbols
            .all()
            .into_iter()
            .map(|s| {
                let state = Arc::new(Mutex::new(SymbolState::new(s.clone())));
                (s, state)
            })
            .collect();
        Ok(Engine { config, anchor, broker, sink, symbols })
    }

    /// Runs forever, polling every symbol once per cycle. Returns only on a
    /// fatal error (spec §7: `BrokerFatal`/`ConfigInvalid` stop the engine).
    pub async fn run(&self) -> EngineResult<()> {
        self.sink.publish(Event::Started).await;
        let (tx, mut rx) = mpsc::channel::<EngineResult<()>>(64);

        let sink = self.sink.clone();
        tokio::spawn(async move {
            while let Some(result) = rx.recv().await {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "symbol cycle reported an error");
                    // Data-insufficiency is silent by design (spec §7): it
                    // just means the evaluator stays non-ready. Every other
                    // non-fatal kind gets an error event.
                    if !matches!(e, EngineError::DataInsufficient { .. }) {
                        let symbol = e.symbol().unwrap_or("unknown").to_string();
                        let detail = e.to_string();
                        sink.publish(Event::Error { symbol: &symbol, detail: &detail }).await;
                    }
                }
            }
            drop(sink);
        });

        let mut interval = tokio::time::interval(POLL_INTERVAL);
        loop {
            interval.tick().await;
            if self.run_cycle(&tx).await {
                return Err(EngineError::BrokerFatal("a symbol task reported a fatal error".into()));
            }
        }
    }

    /// Runs one pipeline cycle across every symbol, feeding results into
    /// `tx` (spec §4.L: steps 1-6 for each symbol). Returns `true` if any
    /// symbol task reported a fatal error. Split out of `run()`'s loop body
    /// so integration tests can drive a single cycle without waiting on the
    /// real ~2s inter-cycle delay.
    async fn run_cycle(&self, tx: &mpsc::Sender<EngineResult<()>>) -> bool {
        let mut handles = Vec::with_capacity(self.symbols.len());
        for (symbol, state) in &self.symbols {
            let symbol = symbol.clone();
            let state = state.clone();
            let config = self.config.clone();
            let anchor = self.anchor;
            let broker = self.broker.clone();
            let sink = self.sink.clone();
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                let result = process_symbol(&symbol, &state, &config, &anchor, broker.as_ref(), sink.as_ref()).await;
                let fatal = matches!(&result, Err(e) if e.is_fatal());
                let _ = tx.send(result).await;
                fatal
            }));
        }
        let mut any_fatal = false;
        for handle in handles {
            if handle.await.unwrap_or(false) {
                any_fatal = true;
            }
        }
        any_fatal
    }

    /// Runs exactly one pipeline cycle across every symbol and returns each
    /// symbol's result directly, without the `run()` event loop or its event
    /// channel plumbing. Used by integration tests to exercise the full
    /// decision pipeline end-to-end against a [`crate::broker::mock::MockBroker`].
    pub async fn tick_once(&self) -> Vec<EngineResult<()>> {
        let mut results = Vec::with_capacity(self.symbols.len());
        for (symbol, state) in &self.symbols {
            results.push(process_symbol(symbol, state, &self.config, &self.anchor, self.broker.as_ref(), self.sink.as_ref()).await);
        }
        results
    }

    /// Clears the bar-cache TTL on every tracked symbol so the next cycle
    /// re-fetches klines regardless of how recently it last did. Exercised
    /// by integration tests that need a second `tick_once()` to observe new
    /// bars the test pushed into the broker double between calls.
    pub async fn force_refetch(&self) {
        for (_, state) in &self.symbols {
            state.lock().await.last_fetch = None;
        }
    }
}

async fn process_symbol(
    symbol: &str,
    state: &Arc<Mutex<SymbolState>>,
    config: &Config,
    anchor: &TimezoneAnchor,
    broker: &dyn BrokerAdapter,
    sink: &dyn EventSink,
) -> EngineResult<()> {
    let mut state = state.lock().await;

    let needs_fetch = state.last_fetch.map(|t| t.elapsed() >= BAR_CACHE_TTL).unwrap_or(true);
    if needs_fetch {
        // H1 is the highest timeframe the snake/purple EMAs need a full
        // warm-up window for (D1 warms up gradually, one bar per day); 60
        // M1 bars per H1 bar, plus a cushion for weekends/gaps.
        let warmup_periods = config.indicators.snake.period.max(config.indicators.purple_line.period);
        let fetch_limit = (warmup_periods * 60 * 2).max(500);
        let fetched = broker.fetch_klines(symbol, fetch_limit).await?;
        if fetched.is_empty() && state.resampler.m1_bars().is_empty() {
            return Err(EngineError::data_insufficient(symbol, "M1", "no bars returned"));
        }
        state.ingest_m1(&fetched);
        state.last_fetch = Some(std::time::Instant::now());
    }
    let m1_bars: Vec<crate::types::Bar> = state.resampler.m1_bars().to_vec();
    if m1_bars.is_empty() {
        return Err(EngineError::data_insufficient(symbol, "M1", "no bars cached yet"));
    }

    let now = anchor.now();
    let today = anchor.trading_day(now);
    if let Some(prev_day) = state.trading_day {
        if prev_day != today {
            sink.publish(Event::DailySummary { symbol, pnl_usd: state.daily_pnl.profit - state.daily_pnl.loss, trades: state.daily_pnl.trade_count }).await;
            state.roll_trading_day(today);
        }
    } else {
        state.roll_trading_day(today);
    }

    let smoothing = config.indicators.smoothing();
    let snake_period = config.indicators.snake.period;
    let purple_period = config.indicators.purple_line.period;

    // Update the EMA cache for every timeframe we have closed bars for.
    for tf in Timeframe::ALL {
        let closed = state.resampler.closed_bars(tf, anchor);
        if closed.len() >= snake_period {
            state.ema_cache.update(tf, snake_period, &closed, smoothing);
        }
        if closed.len() >= purple_period {
            state.ema_cache.update(tf, purple_period, &closed, smoothing);
        }
    }

    let d1_bars = state.resampler.closed_bars(Timeframe::D1, anchor);
    let bias = match d1_bars.last() {
        Some(d1_bar) => state.daily_bias.get_or_compute(today, d1_bar, config.daily_bias.epsilon_wick_ratio),
        None => return Err(EngineError::data_insufficient(symbol, "D1", "no closed daily candle yet")),
    };

    let trend_colors: Vec<TimeframeColor> = config
        .trend_filters
        .timeframes_to_check
        .iter()
        .filter_map(|&tf| {
            let closed = state.resampler.closed_bars(tf, anchor);
            let close = closed.last()?.close;
            let ema_value = state.ema_cache.get(tf, snake_period)?;
            Some(TimeframeColor { timeframe: tf, color: ema::snake_color(close, ema_value, config.trend_filters.equality_is_not_trend) })
        })
        .collect();
    let trend_aligned_buy = trend_filter::check_alignment(&trend_colors, Color::Green);
    let trend_aligned_sell = trend_filter::check_alignment(&trend_colors, Color::Red);
    let trend_summary = trend_filter::summary(&trend_colors);

    let m30_bars = state.resampler.closed_bars(Timeframe::M30, anchor);
    if let (Some(last), Some(ema_value)) = (m30_bars.last(), state.ema_cache.get(Timeframe::M30, snake_period)) {
        let index = m30_bars.len() - 1;
        state.m30_break.update(last.close, ema_value, index);
    }
    let m30_break_side = state.m30_break.break_side();

    // Swing high/low for the GAIN structure check are scoped to today's
    // M15 bars (spec §4.H); H4 candidates stay unscoped since "recent" there
    // means the last N closed bars regardless of which trading day they fall in.
    let m15_bars: Vec<crate::types::Bar> =
        state.resampler.closed_bars(Timeframe::M15, anchor).into_iter().filter(|b| anchor.trading_day(b.start_time) == today).collect();
    let h4_bars = state.resampler.closed_bars(Timeframe::H4, anchor);
    let structure = fibonacci::check_gain_structure(&m15_bars, &h4_bars, config.structure_checks.h4_candidates);

    if let (Some(last), Some(purple), Some(snake)) = (
        m1_bars.last(),
        ema::latest_ema(&m1_bars, purple_period, smoothing),
        ema::latest_ema(&m1_bars, snake_period, smoothing),
    ) {
        let tick = crate::m1_state::M1Tick {
            bar_index: m1_bars.len() - 1,
            close: last.close,
            low: last.low,
            high: last.high,
            purple,
            snake_is_green: last.close >= snake,
        };
        state.m1_state.update(&tick, config.entry_m1.max_bars_between_cross_and_touch);
    }

    if config.risk_management.early_exit_on_m5_break {
        let m5_bars = state.resampler.closed_bars(Timeframe::M5, anchor);
        if let (Some(last), Some(purple)) = (m5_bars.last(), state.ema_cache.get(Timeframe::M5, purple_period)) {
            for kind in BotKind::ALL {
                let record = state.bots.get(&kind).unwrap();
                if let Some(position) = &record.position {
                    if position::check_m5_early_exit(position.side, last.close, purple, true) {
                        let entry = position.entry_price;
                        let exit = last.close;
                        let pnl = match position.side {
                            Side::Buy => (exit - entry) * position.lot_size,
                            Side::Sell => (entry - exit) * position.lot_size,
                        };
                        let side = position.side;
                        if let Err(e) = broker.close_position(symbol, side, config.trading.lot_size).await {
                            tracing::warn!(symbol, bot = %kind, error = %e, "early-exit close request failed");
                            sink.publish(Event::Error { symbol, detail: &format!("early-exit close failed for {kind}: {e}") }).await;
                            continue;
                        }
                        close_position_record(&mut state, symbol, kind, exit, pnl, "m5 early exit", sink).await;
                    }
                }
            }
        }
    }

    // External synchronization (spec §4.K): a tracked position whose
    // symbol no longer shows up on the broker closed externally (TP, SL,
    // or a manual action) and is purged here rather than left stale.
    reconcile_external_closes(symbol, &mut state, broker, sink).await?;

    let symbol_enabled_pain = config.symbols.is_pain(symbol);
    let symbol_enabled_gain = config.symbols.is_gain(symbol);

    let mut bot_statuses: Vec<BotReasonEntry> = Vec::with_capacity(BotKind::ALL.len());

    for kind in BotKind::ALL {
        if kind.is_pain() && !symbol_enabled_pain {
            continue;
        }
        if kind.is_gain() && !symbol_enabled_gain {
            continue;
        }
        if state.bots.get(&kind).unwrap().position.is_some() {
            continue;
        }
        if state.bots.get(&kind).unwrap().status == BotStatus::Halted {
            continue;
        }
        if kind.is_pain() {
            if kind == BotKind::PainSell {
                let todays_low = m1_bars
                    .iter()
                    .filter(|b| anchor.trading_day(b.start_time) == today)
                    .map(|b| b.low)
                    .fold(f64::INFINITY, f64::min);
                let halted = todays_low.is_finite() && daily_bias::is_day_stop_triggered(&bias, todays_low);
                if halted {
                    state.bots.get_mut(&kind).unwrap().status = BotStatus::Halted;
                    sink.publish(Event::RiskAlert {
                        symbol,
                        message: "PAIN-SELL halted for the rest of the trading day (day-stop at level50)",
                    })
                    .await;
                    continue;
                }
            }
        }

        let trend_aligned = if kind.side() == Side::Buy { trend_aligned_buy } else { trend_aligned_sell };
        let inputs = BotInputs {
            bias,
            trend_aligned,
            trend_summary: &trend_summary,
            m30_break_side,
            structure: structure.as_ref(),
            m1_state: state.m1_state.state(),
        };
        let evaluation = bots::evaluate(kind, &inputs);
        let verdict = evaluation.verdict;
        bot_statuses.push(BotReasonEntry { bot: kind, ready: matches!(verdict, Verdict::Enter(_)), reasons: evaluation.reasons });

        match verdict {
            Verdict::Enter(side) => {
                let open_count = state.bots.values().filter(|r| r.position.is_some()).count();
                let quote = broker.quote(symbol).await?;
                let symbol_info = broker.symbol_info(symbol).await?;
                let account = broker.account_info().await?;
                let symbol_enabled = if kind.is_pain() { symbol_enabled_pain } else { symbol_enabled_gain };
                let risk_inputs = RiskCheckInputs {
                    now,
                    symbol,
                    symbol_enabled,
                    spread_pips: symbol_info.pips(quote.spread()),
                    daily_pnl: &state.daily_pnl,
                    open_position_count: open_count,
                    account_healthy: account.healthy(),
                };
                if let Err(failures) = risk::check_all_gates(config, anchor, &risk_inputs) {
                    tracing::debug!(symbol, bot = %kind, ?failures, "risk gate(s) blocked entry");
                    continue;
                }
                let entry_price = m1_bars.last().unwrap().close;
                let order = position::size_order(side, entry_price, config.trading.lot_size, symbol_info.contract_size, config.trading.trade_target_usd);
                match broker.place_market_order(symbol, side, config.trading.lot_size, order.stop_loss, order.take_profit).await {
                    Ok(ticket) => {
                        state.bots.get_mut(&kind).unwrap().status = BotStatus::InPosition;
                        state.bots.get_mut(&kind).unwrap().position = Some(OpenPosition {
                            ticket,
                            side,
                            entry_price,
                            entry_time: now,
                            take_profit: order.take_profit,
                            stop_loss: order.stop_loss,
                            lot_size: config.trading.lot_size,
                        });
                        state.m1_state.mark_executed();
                        sink.publish(Event::TradeOpened {
                            symbol,
                            bot: kind,
                            side,
                            qty: config.trading.lot_size,
                            entry: entry_price,
                            stop_loss: order.stop_loss,
                            take_profit: order.take_profit,
                        })
                        .await;
                    }
                    Err(e) => {
                        tracing::warn!(symbol, bot = %kind, error = %e, "order placement failed");
                        sink.publish(Event::Error { symbol, detail: &format!("order placement failed for {kind}: {e}") }).await;
                    }
                }
            }
            Verdict::NotReady => {}
        }
    }

    sink.publish(Event::BotStatus { symbol, bots: bot_statuses }).await;

    Ok(())
}

async fn close_position_record(state: &mut SymbolState, symbol: &str, kind: BotKind, exit: f64, pnl: f64, reason: &str, sink: &dyn EventSink) {
    let record = state.bots.get_mut(&kind).unwrap();
    if let Some(position) = record.position.take() {
        record.status = BotStatus::Idle;
        state.daily_pnl.record(pnl);
        state.m1_state.reset();
        sink.publish(Event::TradeClosed { symbol, bot: kind, side: position.side, entry: position.entry_price, exit, pnl_usd: pnl, reason }).await;
    }
}

/// Drops any tracked position whose symbol the broker no longer reports as
/// open — it closed externally via TP, SL, or a manual action (spec §4.K
/// "external synchronization"). Exit price is estimated from the latest
/// closed M1 bar since the broker doesn't report a fill price for a close
/// that happened outside this process.
async fn reconcile_external_closes(
    symbol: &str,
    state: &mut SymbolState,
    broker: &dyn BrokerAdapter,
    sink: &dyn EventSink,
) -> EngineResult<()> {
    let has_tracked = state.bots.values().any(|r| r.position.is_some());
    if !has_tracked {
        return Ok(());
    }
    let live = broker.open_positions(symbol).await?;
    let last_close = state.resampler.m1_bars().last().map(|b| b.close);

    for kind in BotKind::ALL {
        // Matched by ticket, not just side, so two different bot kinds
        // holding independent same-side positions on one symbol (e.g.
        // PAIN-BUY and GAIN-BUY both long EURUSD) don't get conflated: one
        // can close externally while the other stays open.
        let still_open = state
            .bots
            .get(&kind)
            .unwrap()
            .position
            .as_ref()
            .map(|p| live.iter().any(|l| l.ticket == p.ticket))
            .unwrap_or(true);
        if still_open {
            continue;
        }
        let position = state.bots.get(&kind).unwrap().position.clone().unwrap();
        let exit = last_close.unwrap_or(position.entry_price);
        let pnl = match position.side {
            Side::Buy => (exit - position.entry_price) * position.lot_size,
            Side::Sell => (position.entry_price - exit) * position.lot_size,
        };
        let reason = match state.resampler.m1_bars().last() {
            Some(bar) if position::profit_target_reached(position.side, bar, position.take_profit, position.stop_loss) => {
                "closed externally (TP/SL)"
            }
            _ => "closed externally",
        };
        close_position_record(state, symbol, kind, exit, pnl, reason, sink).await;
    }
    Ok(())
}
