//! The PAIN/GAIN intraday decision pipeline as a library: everything
//! `main.rs` wires together, exposed here so integration tests (`tests/`)
//! can drive the full pipeline the same way the binary does.

pub mod bots;
pub mod broker;
pub mod config;
pub mod daily_bias;
pub mod ema;
pub mod error;
pub mod fibonacci;
pub mod m1_state;
pub mod m30_break;
pub mod orchestrator;
pub mod position;
pub mod resampler;
pub mod risk;
pub mod sink;
pub mod symbol_state;
pub mod timezone;
pub mod trend_filter;
pub mod types;
