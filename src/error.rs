//! Error taxonomy for the engine, per the command-scope failure model:
//! every error here surfaces to the requesting client as a typed result,
//! never past the dispatcher.

use thiserror::Error;

use crate::decimal::DecimalError;

/// Ledger-level failures. User-visible.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient funds: user {user_id} lacks {required} {asset}")]
    InsufficientFunds {
        user_id: String,
        asset: String,
        required: String,
    },
    #[error("unknown asset: {0}")]
    UnknownAsset(String),
}

/// Orderbook-level failures. Structurally the book is total over valid
/// input (§4.2) — this only covers internal invariant breaches, which are
/// unreachable in a correct build and exist so debug assertions have a
/// typed error to report instead of panicking in release.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BookError {
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
}

/// Wire-level rejection codes the dispatcher must emit verbatim (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectCode {
    SelfTrade,
    OrderFailed,
}

/// Dispatcher-level (command-scope) errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("unknown market: {0}")]
    UnknownMarket(String),

    #[error("unknown order: {0}")]
    UnknownOrder(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("self-trade prevention triggered")]
    SelfTrade,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Decimal(#[from] DecimalError),
}

impl EngineError {
    /// The wire-level reject code spec §6 requires on `ORDER_REJECTED`.
    pub fn code(&self) -> RejectCode {
        match self {
            EngineError::SelfTrade => RejectCode::SelfTrade,
            _ => RejectCode::OrderFailed,
        }
    }
}
