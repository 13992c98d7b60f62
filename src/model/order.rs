//! Order, fill and market-registry types shared across the orderbook,
//! ledger and dispatcher.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Self-trade prevention policy, configured per market (spec §4.2 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StpMode {
    CancelNewest,
    CancelOldest,
    CancelBoth,
}

impl Default for StpMode {
    fn default() -> Self {
        StpMode::CancelNewest
    }
}

/// Order lifecycle state (spec §4.4 state machine). `Accepted` and
/// `PartiallyFilled` orders rest on the book; the rest are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Accepted,
    PartiallyFilled,
    Filled,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    pub fn is_resting(self) -> bool {
        matches!(self, OrderStatus::Accepted | OrderStatus::PartiallyFilled)
    }
}

/// A limit order, either resting in a book or just placed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: Uuid,
    pub user_id: String,
    pub market: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub filled: Decimal,
    /// Monotonic insertion sequence, used to break ties at equal price
    /// (time priority). Not wall-clock time — deterministic and replayable.
    pub sequence: u64,
}

impl Order {
    pub fn remaining(&self) -> Decimal {
        self.quantity.sub(self.filled)
    }
}

/// A single match between a taker and one resting maker. Immutable once
/// produced. Fills always carry the maker's price (spec §4.2 step 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub trade_id: u64,
    pub price: Decimal,
    pub qty: Decimal,
    pub maker_order_id: Uuid,
    pub maker_user_id: String,
}
