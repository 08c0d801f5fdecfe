#[cfg(feature = "jemalloc")]
use tikv_jemallocator::Jemalloc;
#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[cfg(feature = "jemalloc")]
fn jemalloc_purge() {
    use tikv_jemalloc_ctl::epoch;
    // Advancing the epoch causes jemalloc to evaluate all decay windows
    // and release dirty pages back to the OS via its background purge logic.
    if let Ok(e) = epoch::mib() {
        let _ = e.advance();
    }
    tracing::debug!("jemalloc: epoch advanced — dirty pages scheduled for release");
}

use clap::Parser;
use std::sync::Arc;
use wickline::broker::bybit::BybitBroker;
use wickline::broker::mock::MockBroker;
use wickline::broker::{BrokerAdapter, DryRunBroker};
use wickline::config::{Config, Secrets};
use wickline::error::{EngineError, EngineResult};
use wickline::orchestrator::Engine;
use wickline::sink::fanout::FanoutSink;
use wickline::sink::telegram::TelegramSink;
use wickline::sink::tracing_sink::TracingSink;
use wickline::sink::EventSink;

/// Command-line entry point for the intraday PAIN/GAIN engine.
#[derive(Parser, Debug)]
#[command(name = "wickline", about = "Rule-based intraday PAIN/GAIN trading engine")]
struct Args {
    /// Path to the TOML configuration file (spec §6).
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Run the full decision pipeline against the live broker but log
    /// orders instead of sending them (spec §6 "dry-run mode").
    #[arg(long)]
    dry_run: bool,

    /// Exercise the engine against an in-memory broker double instead of
    /// Bybit, useful for smoke-testing a config file without network
    /// access or API keys.
    #[arg(long)]
    mock_broker: bool,

    /// `tracing-subscriber` `EnvFilter` directive, e.g. "info" or
    /// "wickline=debug,warn".
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(&args.log_level);

    if let Err(e) = run(args).await {
        tracing::error!(error = %e, "engine stopped");
        std::process::exit(1);
    }
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

async fn run(args: Args) -> EngineResult<()> {
    let config = Arc::new(Config::load(&args.config)?);
    tracing::info!(symbols = config.symbols.all().len(), "configuration loaded");

    let zone: chrono_tz::Tz = config
        .environment
        .timezone
        .parse()
        .map_err(|_| EngineError::ConfigInvalid(format!("bad timezone {:?}", config.environment.timezone)))?;

    let broker: Arc<dyn BrokerAdapter> = if args.mock_broker {
        tracing::warn!("running against the in-memory mock broker, no live orders will ever be placed");
        Arc::new(MockBroker::new())
    } else {
        let secrets = Secrets::from_env(config.sink.telegram_enabled)?;
        let live = BybitBroker::new(config.broker_rest_url(), &secrets, zone)?;
        if args.dry_run {
            tracing::info!("dry-run mode: orders are logged, never sent");
            Arc::new(DryRunBroker::new(live))
        } else {
            Arc::new(live)
        }
    };

    let sink = build_sink(&config)?;

    let engine = Engine::new(config, broker, sink)?;

    #[cfg(feature = "jemalloc")]
    tokio::spawn(async {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            jemalloc_purge();
        }
    });

    tokio::select! {
        result = engine.run() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal, stopping");
            Ok(())
        }
    }
}

/// Wires the `tracing` log sink plus, if configured, a Telegram push sink,
/// fanning events out to both (spec §6: sink delivery is best-effort and
/// one sink's failure never blocks another).
fn build_sink(config: &Config) -> EngineResult<Arc<dyn EventSink>> {
    let mut sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(TracingSink::new())];

    if config.sink.telegram_enabled {
        let secrets = Secrets::from_env(true)?;
        match TelegramSink::new(&secrets) {
            Some(telegram) => sinks.push(Arc::new(telegram)),
            None => tracing::warn!("sink.telegram_enabled is true but TELEGRAM_TOKEN/TELEGRAM_CHAT_ID are unset"),
        }
    }

    Ok(Arc::new(FanoutSink::new(sinks)))
}
