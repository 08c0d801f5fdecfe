//! Risk gates (spec §4.J): the seven checks an entry must clear before an
//! order is placed. Every gate runs regardless of earlier failures, so the
//! reason log always shows the complete set of what blocked an entry.
//!
//! Grounded on `original_source/core/risk_manager.py` (`check_all_gates`,
//! `_check_spread`, `_check_daily_profit`, `_check_daily_loss`).

use crate::config::{Config, TradingHoursConfig};
use crate::timezone::TimezoneAnchor;
use crate::types::{DailyPnl, Timestamp};
use chrono::NaiveTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateFailure {
    OutsideSession,
    SymbolDisabled,
    SpreadTooWide,
    DailyTargetReached,
    DailyStopReached,
    ConcurrencyLimitReached,
    AccountUnhealthy,
}

pub struct RiskCheckInputs<'a> {
    pub now: Timestamp,
    pub symbol: &'a str,
    pub symbol_enabled: bool,
    pub spread_pips: f64,
    pub daily_pnl: &'a DailyPnl,
    pub open_position_count: usize,
    pub account_healthy: bool,
}

/// Runs every gate in spec order and collects every failure, rather than
/// stopping at the first — so a blocked entry's logged reason reflects all
/// of what's wrong, not just whichever gate happened to run first.
pub fn check_all_gates(
    config: &Config,
    anchor: &TimezoneAnchor,
    inputs: &RiskCheckInputs,
) -> Result<(), Vec<GateFailure>> {
    let checks = [
        check_session(config, anchor, inputs.now),
        check_symbol_enabled(inputs.symbol_enabled),
        check_spread(config, inputs.spread_pips),
        check_daily_target(config, inputs.daily_pnl),
        check_daily_stop(config, inputs.daily_pnl),
        check_concurrency(config, inputs.open_position_count),
        check_account_health(inputs.account_healthy),
    ];
    let failures: Vec<GateFailure> = checks.into_iter().filter_map(Result::err).collect();
    if failures.is_empty() {
        Ok(())
    } else {
        Err(failures)
    }
}

fn parse_hm(s: &str) -> NaiveTime {
    NaiveTime::parse_from_str(s, "%H:%M").expect("trading_hours validated at config load")
}

fn check_session(config: &Config, anchor: &TimezoneAnchor, now: Timestamp) -> Result<(), GateFailure> {
    if !config.session.enabled {
        return Ok(());
    }
    let TradingHoursConfig { start, end } = &config.session.trading_hours;
    if anchor.is_within_trading_hours(now, parse_hm(start), parse_hm(end)) {
        Ok(())
    } else {
        Err(GateFailure::OutsideSession)
    }
}

fn check_symbol_enabled(symbol_enabled: bool) -> Result<(), GateFailure> {
    if symbol_enabled {
        Ok(())
    } else {
        Err(GateFailure::SymbolDisabled)
    }
}

fn check_spread(config: &Config, spread_pips: f64) -> Result<(), GateFailure> {
    if spread_pips <= config.trading.max_spread_pips {
        Ok(())
    } else {
        Err(GateFailure::SpreadTooWide)
    }
}

fn check_daily_target(config: &Config, daily_pnl: &DailyPnl) -> Result<(), GateFailure> {
    if config.risk_management.enable_daily_target && daily_pnl.profit >= config.trading.daily_target_usd {
        Err(GateFailure::DailyTargetReached)
    } else {
        Ok(())
    }
}

fn check_daily_stop(config: &Config, daily_pnl: &DailyPnl) -> Result<(), GateFailure> {
    if config.risk_management.enable_daily_stop && daily_pnl.loss >= config.trading.daily_stop_usd {
        Err(GateFailure::DailyStopReached)
    } else {
        Ok(())
    }
}

fn check_concurrency(config: &Config, open_position_count: usize) -> Result<(), GateFailure> {
    if open_position_count < config.trading.max_concurrent_orders {
        Ok(())
    } else {
        Err(GateFailure::ConcurrencyLimitReached)
    }
}

fn check_account_health(account_healthy: bool) -> Result<(), GateFailure> {
    if account_healthy {
        Ok(())
    } else {
        Err(GateFailure::AccountUnhealthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> Config {
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
            [entry_m1]
            [structure_checks]
            [trading]
            lot_size = 0.1
            trade_target_usd = 2.0
            max_spread_pips = 2.0
            max_slippage_pips = 2.0
            max_concurrent_orders = 2
            daily_target_usd = 100.0
            daily_stop_usd = 50.0
            [risk_management]
            enable_daily_stop = true
            enable_daily_target = true
            [session]
            enabled = true
            [session.trading_hours]
            start = "00:00"
            end = "23:59"
            [symbols]
            pain = ["EURUSD"]
            "#,
        )
        .unwrap()
    }

    fn anchor() -> TimezoneAnchor {
        TimezoneAnchor::new(chrono_tz::America::Bogota, 16)
    }

    fn now() -> Timestamp {
        chrono_tz::America::Bogota.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn healthy_inputs() -> RiskCheckInputs<'static> {
        RiskCheckInputs {
            now: now(),
            symbol: "EURUSD",
            symbol_enabled: true,
            spread_pips: 1.0,
            daily_pnl: Box::leak(Box::new(DailyPnl::default())),
            open_position_count: 0,
            account_healthy: true,
        }
    }

    #[test]
    fn all_gates_pass_with_healthy_inputs() {
        assert_eq!(check_all_gates(&config(), &anchor(), &healthy_inputs()), Ok(()));
    }

    #[test]
    fn spread_gate_rejects_wide_spread() {
        let mut inputs = healthy_inputs();
        inputs.spread_pips = 5.0;
        assert_eq!(check_all_gates(&config(), &anchor(), &inputs), Err(vec![GateFailure::SpreadTooWide]));
    }

    #[test]
    fn daily_stop_gate_trips_once_loss_meets_limit() {
        let pnl = DailyPnl { profit: 0.0, loss: 50.0, trade_count: 1 };
        let mut inputs = healthy_inputs();
        inputs.daily_pnl = Box::leak(Box::new(pnl));
        assert_eq!(check_all_gates(&config(), &anchor(), &inputs), Err(vec![GateFailure::DailyStopReached]));
    }

    #[test]
    fn concurrency_gate_trips_at_the_configured_limit() {
        let mut inputs = healthy_inputs();
        inputs.open_position_count = 2;
        assert_eq!(check_all_gates(&config(), &anchor(), &inputs), Err(vec![GateFailure::ConcurrencyLimitReached]));
    }

    #[test]
    fn all_failing_gates_are_collected_not_just_the_first() {
        let mut inputs = healthy_inputs();
        inputs.symbol_enabled = false;
        inputs.spread_pips = 999.0;
        assert_eq!(
            check_all_gates(&config(), &anchor(), &inputs),
            Err(vec![GateFailure::SymbolDisabled, GateFailure::SpreadTooWide])
        );
    }
}
