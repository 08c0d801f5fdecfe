//! Per-symbol state bundle (spec §3): everything the orchestrator threads
//! through one symbol's pipeline cycle.

use crate::daily_bias::DailyBiasCache;
use crate::ema::EmaCache;
use crate::m1_state::M1StateMachine;
use crate::m30_break::M30BreakDetector;
use crate::resampler::Resampler;
use crate::types::{BotKind, BotRecord, DailyPnl, Timestamp};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::time::Instant;

pub struct SymbolState {
    pub symbol: String,
    pub resampler: Resampler,
    pub ema_cache: EmaCache,
    pub m30_break: M30BreakDetector,
    pub m1_state: M1StateMachine,
    pub daily_bias: DailyBiasCache,
    pub bots: HashMap<BotKind, BotRecord>,
    pub daily_pnl: DailyPnl,
    pub trading_day: Option<NaiveDate>,
    /// Wall-clock time of the last successful M1 kline fetch, used to honor
    /// the one-minute bar-cache TTL (spec §4.L) so the broker isn't
    /// hot-looped every ~2s orchestrator cycle.
    pub last_fetch: Option<Instant>,
    /// Start-time of the newest M1 bar already pushed into the resampler,
    /// so a re-fetch only appends bars strictly beyond it (spec §3 "last
    /// processed M1 bar time").
    pub last_m1_time: Option<Timestamp>,
}

impl SymbolState {
    pub fn new(symbol: impl Into<String>) -> Self {
        let mut bots = HashMap::new();
        for kind in BotKind::ALL {
            bots.insert(kind, BotRecord::default());
        }
        SymbolState {
            symbol: symbol.into(),
            resampler: Resampler::new(),
            ema_cache: EmaCache::new(),
            m30_break: M30BreakDetector::new(),
            m1_state: M1StateMachine::new(),
            daily_bias: DailyBiasCache::new(),
            bots,
            daily_pnl: DailyPnl::default(),
            trading_day: None,
            last_fetch: None,
            last_m1_time: None,
        }
    }

    /// Appends only the bars strictly newer than the last one already
    /// pushed, preserving the resampler's strictly-increasing input
    /// contract across repeated trailing-window fetches.
    pub fn ingest_m1(&mut self, bars: &[crate::types::Bar]) {
        for &bar in bars {
            if self.last_m1_time.map(|t| bar.start_time > t).unwrap_or(true) {
                self.resampler.push_m1(bar);
                self.last_m1_time = Some(bar.start_time);
            }
        }
    }

    /// Resets per-day bookkeeping when a new trading day begins. Open
    /// positions and their bot records are left untouched — only daily
    /// aggregates and HALTED bots re-arm (spec §3: "HALTED cannot re-arm
    /// same day").
    pub fn roll_trading_day(&mut self, day: NaiveDate) {
        self.trading_day = Some(day);
        self.daily_pnl = DailyPnl::default();
        for record in self.bots.values_mut() {
            if record.position.is_none() {
                record.status = crate::types::BotStatus::Idle;
            }
        }
    }
}
