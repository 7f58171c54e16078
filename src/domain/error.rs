//! Domain error types.

use crate::domain::order::OrderStatus;

/// Top-level error type for barsim.
#[derive(Debug, thiserror::Error)]
pub enum BacktestError {
    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("missing {column} value in row {row}")]
    MissingField { row: usize, column: &'static str },

    #[error("no bars for {symbol}")]
    EmptyData { symbol: String },

    #[error("strict validation failed: {}", issues.join("; "))]
    StrictValidation { issues: Vec<String> },

    #[error("insufficient data for {what}: have {have}, need {need}")]
    InsufficientData {
        what: String,
        have: usize,
        need: usize,
    },

    #[error("invalid config value {key}: {reason}")]
    Config { key: String, reason: String },

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("order {id} is {from:?} and cannot transition")]
    InvalidOrderTransition { id: u64, from: OrderStatus },

    #[error("ledger invariant violated: {0}")]
    Ledger(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BacktestError {
    pub fn config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        BacktestError::Config {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn data(reason: impl Into<String>) -> Self {
        BacktestError::Data {
            reason: reason.into(),
        }
    }

    /// True for the configuration class of errors, which must surface before any
    /// simulation work begins.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BacktestError::Config { .. } | BacktestError::UnknownStrategy(_)
        )
    }
}

impl From<&BacktestError> for std::process::ExitCode {
    fn from(err: &BacktestError) -> Self {
        let code: u8 = match err {
            BacktestError::Io(_) => 1,
            BacktestError::Config { .. } | BacktestError::UnknownStrategy(_) => 2,
            BacktestError::Data { .. }
            | BacktestError::MissingField { .. }
            | BacktestError::EmptyData { .. }
            | BacktestError::StrictValidation { .. }
            | BacktestError::Csv(_)
            | BacktestError::Json(_) => 3,
            BacktestError::InsufficientData { .. } => 4,
            BacktestError::InvalidOrderTransition { .. } | BacktestError::Ledger(_) => 5,
        };
        std::process::ExitCode::from(code)
    }
}
