//! Closed error enumeration for every pipeline and broker boundary (spec §7).
//!
//! No exceptions cross component boundaries: every fallible call returns
//! `Result<T, EngineError>`. The six kinds below mirror the teacher's
//! `BybitError` three-way classification (`RateLimit`/`Transient`/
//! `Permanent`), generalized to the dispositions spec §7 assigns to each.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Fewer bars than required for EMA seeding, missing D1, empty resample.
    /// Handled by the evaluator returning non-ready with a reason; never
    /// propagated past the module that detected it.
    #[error("insufficient data for {symbol} {timeframe}: {detail}")]
    DataInsufficient {
        symbol: String,
        timeframe: String,
        detail: String,
    },

    /// Timeout, read failure, null tick. The orchestrator skips the symbol
    /// this cycle and resumes next cycle.
    #[error("broker transient error on {symbol}: {detail}")]
    BrokerTransient { symbol: String, detail: String },

    /// Order rejected, unknown retcode. Treated as non-ready-this-tick for
    /// that bot; not retried within the cycle.
    #[error("broker refused request for {symbol}: {detail}")]
    BrokerRefused { symbol: String, detail: String },

    /// Auth failed, adapter unavailable. Fatal: the orchestrator stops and
    /// the process exits non-zero.
    #[error("fatal broker error: {0}")]
    BrokerFatal(String),

    /// Missing fields, bad types. Fails fast at startup.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A state machine reached an undefined branch, or bar time went
    /// non-monotonic. The affected symbol's state is reset; the
    /// orchestrator continues.
    #[error("invariant violation for {symbol}: {detail}")]
    InvariantViolation { symbol: String, detail: String },
}

impl EngineError {
    pub fn data_insufficient(
        symbol: impl Into<String>,
        timeframe: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        EngineError::DataInsufficient {
            symbol: symbol.into(),
            timeframe: timeframe.into(),
            detail: detail.into(),
        }
    }

    pub fn invariant(symbol: impl Into<String>, detail: impl Into<String>) -> Self {
        EngineError::InvariantViolation { symbol: symbol.into(), detail: detail.into() }
    }

    /// Whether this error should halt the orchestrator entirely.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::BrokerFatal(_) | EngineError::ConfigInvalid(_))
    }

    /// The symbol this error concerns, if any — used to attribute sink
    /// `Error` events back to the symbol whose cycle raised them.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            EngineError::DataInsufficient { symbol, .. }
            | EngineError::BrokerTransient { symbol, .. }
            | EngineError::BrokerRefused { symbol, .. }
            | EngineError::InvariantViolation { symbol, .. } => Some(symbol),
            EngineError::BrokerFatal(_) | EngineError::ConfigInvalid(_) => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
