//! Configuration surface enumerated in spec.md §6, loaded from a TOML file
//! via `serde`. Secrets (API keys, tokens) are never stored in the TOML
//! file — they are read from the process environment at startup, the way
//! the teacher crate reads `BYBIT_API_KEY` / `TELEGRAM_TOKEN`.
//!
//! Once constructed, a `Config` is immutable and threaded by `Arc` through
//! every component (design note §9: "configuration is immutable after
//! bootstrap").

use crate::error::{EngineError, EngineResult};
use crate::types::Timeframe;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Clone, Debug, Deserialize)]
pub struct EnvironmentConfig {
    pub timezone: String,
    #[serde(default = "default_close_hour")]
    pub daily_close_hour: u32,
}

fn default_close_hour() -> u32 {
    16
}

#[derive(Clone, Debug, Deserialize)]
pub struct PeriodConfig {
    pub period: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmaFormulaConfig {
    #[serde(default = "default_smoothing")]
    pub smoothing: f64,
}

fn default_smoothing() -> f64 {
    2.0
}

#[derive(Clone, Debug, Deserialize)]
pub struct IndicatorsConfig {
    pub snake: PeriodConfig,
    pub purple_line: PeriodConfig,
    #[serde(default)]
    pub ema_formula: EmaFormulaConfigOpt,
}

/// `ema_formula` is optional in the TOML; falls back to the default smoothing.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct EmaFormulaConfigOpt {
    pub smoothing: Option<f64>,
}

impl IndicatorsConfig {
    pub fn smoothing(&self) -> f64 {
        self.ema_formula.smoothing.unwrap_or_else(default_smoothing)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct DailyBiasConfig {
    #[serde(default = "default_epsilon")]
    pub epsilon_wick_ratio: f64,
}

fn default_epsilon() -> f64 {
    0.05
}

#[derive(Clone, Debug, Deserialize)]
pub struct TrendFiltersConfig {
    #[serde(default = "default_trend_timeframes")]
    pub timeframes_to_check: Vec<Timeframe>,
    #[serde(default = "default_true")]
    pub equality_is_not_trend: bool,
}

fn default_trend_timeframes() -> Vec<Timeframe> {
    vec![Timeframe::H1, Timeframe::M30, Timeframe::M15]
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize)]
pub struct EntryM1Config {
    #[serde(default = "default_max_gap")]
    pub max_bars_between_cross_and_touch: usize,
}

fn default_max_gap() -> usize {
    20
}

#[derive(Clone, Debug, Deserialize)]
pub struct StructureChecksConfig {
    #[serde(default = "default_h4_candidates")]
    pub h4_candidates: usize,
}

fn default_h4_candidates() -> usize {
    3
}

#[derive(Clone, Debug, Deserialize)]
pub struct TradingConfig {
    pub lot_size: f64,
    pub trade_target_usd: f64,
    pub max_spread_pips: f64,
    pub max_slippage_pips: f64,
    pub max_concurrent_orders: usize,
    pub daily_target_usd: f64,
    pub daily_stop_usd: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RiskManagementConfig {
    pub enable_daily_stop: bool,
    pub enable_daily_target: bool,
    /// [SUPPLEMENT, from original_source/core/exit_manager.py] — mirrors
    /// the original's `get_early_exit_on_m5_purple_break()` gate. When
    /// false the M5 early-exit monitor is skipped and only the
    /// broker-enforced TP/SL remain.
    #[serde(default = "default_true")]
    pub early_exit_on_m5_break: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TradingHoursConfig {
    pub start: String,
    pub end: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SessionConfig {
    pub enabled: bool,
    pub trading_hours: TradingHoursConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SymbolsConfig {
    #[serde(default)]
    pub pain: Vec<String>,
    #[serde(default)]
    pub gain: Vec<String>,
}

impl SymbolsConfig {
    pub fn all(&self) -> HashSet<String> {
        self.pain.iter().chain(self.gain.iter()).cloned().collect()
    }

    pub fn is_pain(&self, symbol: &str) -> bool {
        self.pain.iter().any(|s| s == symbol)
    }

    pub fn is_gain(&self, symbol: &str) -> bool {
        self.gain.iter().any(|s| s == symbol)
    }
}

fn default_rest_url() -> String {
    "https://api-demo.bybit.com".to_string()
}

#[derive(Clone, Debug, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub telegram_enabled: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub environment: EnvironmentConfig,
    pub indicators: IndicatorsConfig,
    pub daily_bias: DailyBiasConfig,
    pub trend_filters: TrendFiltersConfig,
    pub entry_m1: EntryM1Config,
    pub structure_checks: StructureChecksConfig,
    pub trading: TradingConfig,
    pub risk_management: RiskManagementConfig,
    pub session: SessionConfig,
    pub symbols: SymbolsConfig,
    #[serde(default)]
    pub broker: BrokerConfigOpt,
    #[serde(default)]
    pub sink: SinkConfig,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct BrokerConfigOpt {
    pub rest_url: Option<String>,
}

impl Config {
    pub fn broker_rest_url(&self) -> String {
        self.broker.rest_url.clone().unwrap_or_else(default_rest_url)
    }

    /// Parse and validate a config file. Configuration-invalid errors are
    /// fail-fast at start (spec §7).
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Config> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::ConfigInvalid(format!("cannot read {}: {e}", path.display())))?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| EngineError::ConfigInvalid(format!("cannot parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> EngineResult<()> {
        if self.environment.daily_close_hour > 23 {
            return Err(EngineError::ConfigInvalid(format!(
                "environment.daily_close_hour must be 0-23, got {}",
                self.environment.daily_close_hour
            )));
        }
        if self.environment.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(EngineError::ConfigInvalid(format!(
                "environment.timezone {:?} is not a recognized IANA zone",
                self.environment.timezone
            )));
        }
        if self.indicators.snake.period == 0 || self.indicators.purple_line.period == 0 {
            return Err(EngineError::ConfigInvalid(
                "indicators.snake.period and purple_line.period must be > 0".into(),
            ));
        }
        if self.trading.lot_size <= 0.0 {
            return Err(EngineError::ConfigInvalid("trading.lot_size must be > 0".into()));
        }
        if self.symbols.pain.is_empty() && self.symbols.gain.is_empty() {
            return Err(EngineError::ConfigInvalid(
                "symbols.pain and symbols.gain cannot both be empty".into(),
            ));
        }
        if self.session.enabled {
            let hours = &self.session.trading_hours;
            for (field, value) in [("start", &hours.start), ("end", &hours.end)] {
                if chrono::NaiveTime::parse_from_str(value, "%H:%M").is_err() {
                    return Err(EngineError::ConfigInvalid(format!(
                        "session.trading_hours.{field} {value:?} is not HH:MM"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Secrets read from the process environment, never from the TOML file —
/// unchanged from the teacher's approach in `bybit_api.rs` / `telegram.rs`.
#[derive(Clone)]
pub struct Secrets {
    pub bybit_api_key: String,
    pub bybit_secret: String,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl Secrets {
    pub fn from_env(telegram_required: bool) -> EngineResult<Secrets> {
        let bybit_api_key = require_env("BYBIT_API_KEY")?;
        let bybit_secret = require_env("BYBIT_SECRET")?;
        let (telegram_token, telegram_chat_id) = if telegram_required {
            (Some(require_env("TELEGRAM_TOKEN")?), Some(require_env("TELEGRAM_CHAT_ID")?))
        } else {
            (std::env::var("TELEGRAM_TOKEN").ok(), std::env::var("TELEGRAM_CHAT_ID").ok())
        };
        Ok(Secrets { bybit_api_key, bybit_secret, telegram_token, telegram_chat_id })
    }
}

fn require_env(key: &str) -> EngineResult<String> {
    std::env::var(key).map_err(|_| EngineError::ConfigInvalid(format!("{key} env var not set")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        toml::from_str(
            r#"
            [environment]
            timezone = "America/Bogota"
            daily_close_hour = 16

            [indicators.snake]
            period = 100
            [indicators.purple_line]
            period = 10

            [daily_bias]
            epsilon_wick_ratio = 0.05

            [trend_filters]
            timeframes_to_check = ["H1", "M30", "M15"]
            equality_is_not_trend = true

            [entry_m1]
            max_bars_between_cross_and_touch = 20

            [structure_checks]
            h4_candidates = 3

            [trading]
            lot_size = 0.1
            trade_target_usd = 2.0
            max_spread_pips = 2.0
            max_slippage_pips = 2.0
            max_concurrent_orders = 4
            daily_target_usd = 100.0
            daily_stop_usd = 50.0

            [risk_management]
            enable_daily_stop = true
            enable_daily_target = true

            [session]
            enabled = true
            [session.trading_hours]
            start = "19:00"
            end = "06:00"

            [symbols]
            pain = ["EURUSD"]
            gain = ["EURUSD", "GBPUSD"]
            "#,
        )
        .unwrap()
    }

    #[test]
    fn parses_full_surface_with_defaults() {
        let cfg = sample();
        assert_eq!(cfg.indicators.smoothing(), 2.0);
        assert_eq!(cfg.entry_m1.max_bars_between_cross_and_touch, 20);
        assert!(cfg.risk_management.early_exit_on_m5_break);
        assert_eq!(cfg.broker_rest_url(), "https://api-demo.bybit.com");
    }

    #[test]
    fn validates_timezone() {
        let mut cfg = sample();
        cfg.environment.timezone = "Not/AZone".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validates_symbol_sets_nonempty() {
        let mut cfg = sample();
        cfg.symbols.pain.clear();
        cfg.symbols.gain.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn symbol_tag_membership() {
        let cfg = sample();
        assert!(cfg.symbols.is_pain("EURUSD"));
        assert!(!cfg.symbols.is_pain("GBPUSD"));
        assert!(cfg.symbols.is_gain("GBPUSD"));
    }
}
