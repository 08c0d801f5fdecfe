//! End-to-end integration tests driving `Engine::tick_once()` against the
//! in-memory mock broker, exercising the resample -> daily-bias -> trend ->
//! M30-break -> bot-evaluation -> sink wiring the way the real event loop
//! does, without the ~2s poll interval (spec §4.L, §8).

use async_trait::async_trait;
use chrono::TimeZone;
use std::sync::{Arc, Mutex};
use wickline::broker::mock::MockBroker;
use wickline::broker::BrokerAdapter;
use wickline::config::Config;
use wickline::orchestrator::Engine;
use wickline::sink::null::NullSink;
use wickline::sink::{BotReasonEntry, Event, EventSink};
use wickline::types::{Bar, BotKind};

fn load_config() -> Arc<Config> {
    let raw = r#"
        [environment]
        timezone = "America/Bogota"
        daily_close_hour = 16

        [indicators.snake]
        period = 3
        [indicators.purple_line]
        period = 2

        [daily_bias]
        epsilon_wick_ratio = 0.05

        [trend_filters]
        timeframes_to_check = ["H1", "M30", "M15"]

        [entry_m1]
        max_bars_between_cross_and_touch = 20

        [structure_checks]
        h4_candidates = 3

        [trading]
        lot_size = 0.1
        trade_target_usd = 2.0
        max_spread_pips = 2.0
        max_slippage_pips = 2.0
        max_concurrent_orders = 2
        daily_target_usd = 100.0
        daily_stop_usd = 50.0

        [risk_management]
        enable_daily_stop = false
        enable_daily_target = false
        early_exit_on_m5_break = false

        [session]
        enabled = false
        [session.trading_hours]
        start = "00:00"
        end = "23:59"

        [symbols]
        pain = ["BTCUSDT"]
        gain = ["BTCUSDT"]
    "#;
    Arc::new(toml::from_str(raw).expect("fixture config parses"))
}

fn bar(y: i32, m: u32, d: u32, h: u32, open: f64, high: f64, low: f64, close: f64) -> Bar {
    let start_time = chrono_tz::America::Bogota.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap();
    Bar { start_time, open, high, low, close, volume: 1.0 }
}

/// Prior-day D1 candle: open 100, dips to a low of 80, recovers to close
/// 101 -> a long lower wick against a 1-point body, which reads as a BUY
/// day (spec §4.D).
fn prior_day_bars() -> Vec<Bar> {
    vec![
        bar(2026, 3, 8, 16, 100.0, 100.0, 100.0, 100.0),
        bar(2026, 3, 8, 20, 100.0, 101.0, 80.0, 100.0),
        bar(2026, 3, 9, 10, 100.0, 101.0, 95.0, 101.0),
    ]
}

#[derive(Default)]
struct RecordingSink {
    bot_status: Mutex<Option<Vec<BotReasonEntry>>>,
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, event: Event<'_>) {
        if let Event::BotStatus { bots, .. } = event {
            *self.bot_status.lock().unwrap() = Some(bots);
        }
    }
}

fn reason<'a>(bots: &'a [BotReasonEntry], kind: BotKind, label: &str) -> &'a wickline::bots::Reason {
    bots.iter().find(|b| b.bot == kind).unwrap().reasons.iter().find(|r| r.label == label).unwrap()
}

#[tokio::test]
async fn no_bars_yields_data_insufficient_and_places_no_order() {
    let broker = Arc::new(MockBroker::new());
    let engine = Engine::new(load_config(), broker.clone(), Arc::new(NullSink)).unwrap();

    let results = engine.tick_once().await;
    assert_eq!(results.len(), 1);
    assert!(results[0].is_err());
    assert!(broker.orders_placed().is_empty());
}

#[tokio::test]
async fn bullish_prior_day_candle_drives_a_buy_bias_into_every_bot_status_row() {
    let broker = Arc::new(MockBroker::new());
    let mut bars = prior_day_bars();
    bars.extend([
        bar(2026, 3, 9, 16, 101.0, 102.0, 101.0, 102.0),
        bar(2026, 3, 9, 17, 102.0, 103.0, 102.0, 103.0),
        bar(2026, 3, 9, 18, 103.0, 104.0, 103.0, 104.0),
        bar(2026, 3, 9, 19, 104.0, 105.0, 104.0, 105.0),
    ]);
    broker.set_bars(bars);

    let sink = Arc::new(RecordingSink::default());
    let engine = Engine::new(load_config(), broker.clone(), sink.clone()).unwrap();

    let results = engine.tick_once().await;
    assert_eq!(results.len(), 1);
    assert!(results[0].is_ok(), "expected Ok, got {:?}", results[0]);
    // Neither the M30 break latch nor the M1 trigger can have armed yet —
    // both only ever flip on a *second* cycle once a prior position is on
    // record, and this is the symbol's first cycle ever.
    assert!(broker.orders_placed().is_empty());

    let bots = sink.bot_status.lock().unwrap().clone().expect("a BotStatus event was published");
    assert_eq!(bots.len(), 4, "both pain and gain are enabled for this symbol, so all four bots evaluate");

    let bias_reason = reason(&bots, BotKind::PainBuy, "bias");
    assert!(bias_reason.pass);
    assert_eq!(bias_reason.detail, "BUY day (need BUY)");

    let sell_bias_reason = reason(&bots, BotKind::PainSell, "bias");
    assert!(!sell_bias_reason.pass, "a BUY day must not also satisfy PAIN-SELL's bias check");
}

#[tokio::test]
async fn m30_break_latches_buy_only_after_the_ema_side_flips_across_two_cycles() {
    let broker = Arc::new(MockBroker::new());
    let mut first_cycle_bars = prior_day_bars();
    first_cycle_bars.extend([
        bar(2026, 3, 9, 16, 105.0, 106.0, 104.0, 105.0),
        bar(2026, 3, 9, 17, 95.0, 96.0, 94.0, 95.0),
        bar(2026, 3, 9, 18, 150.0, 151.0, 149.0, 150.0),
    ]);
    broker.set_bars(first_cycle_bars.clone());

    let sink = Arc::new(RecordingSink::default());
    let engine = Engine::new(load_config(), broker.clone(), sink.clone()).unwrap();

    // Cycle 1: the closed M30 series is [100, 100, 101, 105, 95] (the bar at
    // 18:00 is still forming). Its EMA(3) seeds at 100.33 from the first
    // three closes and tracks up to 98.83 by the last closed bar (95),
    // putting the latest closed bar *below* its EMA. First-ever call: the
    // detector has no prior position to compare against, so no break is
    // latched yet.
    engine.tick_once().await;
    let first = sink.bot_status.lock().unwrap().clone().unwrap();
    let m30_reason = reason(&first, BotKind::PainBuy, "m30_break");
    assert!(!m30_reason.pass);
    assert!(m30_reason.detail.contains("no M30 break recorded yet"), "{}", m30_reason.detail);

    // Cycle 2: one more M1 bar (19:00, close 160) closes the 18:00 bucket
    // (close 150), whose EMA(3) continuation from 98.83 is 124.42 -- now
    // *above* its EMA. That's the side flip the latch records.
    let mut second_cycle_bars = first_cycle_bars;
    second_cycle_bars.push(bar(2026, 3, 9, 19, 160.0, 161.0, 159.0, 160.0));
    broker.set_bars(second_cycle_bars);
    engine.force_refetch().await;

    engine.tick_once().await;
    let second = sink.bot_status.lock().unwrap().clone().unwrap();
    let m30_reason = reason(&second, BotKind::PainBuy, "m30_break");
    assert!(m30_reason.pass, "expected the M30 break to have flipped to BUY: {}", m30_reason.detail);
    assert_eq!(m30_reason.detail, "M30 break side is BUY, need BUY");

    // The opposite side's bot must not also read the break as satisfied.
    let sell_reason = reason(&second, BotKind::PainSell, "m30_break");
    assert!(!sell_reason.pass);
}
