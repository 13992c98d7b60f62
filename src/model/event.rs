//! Outbound payloads: the per-client result (spec §6 "Result channel"),
//! the broadcast event families (`depth@`, `trade@`, `userTrades@`), and
//! the persistence-channel records consumed by the (out-of-scope) durable
//! writer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Decimal;
use crate::error::RejectCode;
use crate::model::order::{Fill, Side};

/// One reply per command, routed back to the requesting client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResultPayload {
    OrderPlaced {
        order_id: Uuid,
        executed_qty: Decimal,
        fills: Vec<FillView>,
    },
    OrderRejected {
        order_id: String,
        executed_qty: Decimal,
        remaining_qty: Decimal,
        reason: String,
        code: RejectCode,
    },
    OrderCancelled {
        order_id: Uuid,
        executed_qty: Decimal,
        remaining_qty: Decimal,
    },
    OpenOrders(Vec<crate::model::order::Order>),
    Depth {
        bids: Vec<(Decimal, Decimal)>,
        asks: Vec<(Decimal, Decimal)>,
    },
    Balance(std::collections::HashMap<String, crate::ledger::AssetBalance>),
    OnRampSuccess {
        user_id: String,
        amount: Decimal,
        new_balance: Decimal,
    },
    OnRampFailed {
        user_id: String,
        reason: String,
    },
    WithdrawSuccess {
        user_id: String,
        tx_id: String,
        new_balance: Decimal,
    },
    WithdrawFailed {
        user_id: String,
        tx_id: String,
        reason: String,
    },
}

/// Fill as rendered on the wire (no maker_user_id — that's internal).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillView {
    pub price: Decimal,
    pub qty: Decimal,
    pub trade_id: u64,
}

impl From<&Fill> for FillView {
    fn from(f: &Fill) -> Self {
        FillView {
            price: f.price,
            qty: f.qty,
            trade_id: f.trade_id,
        }
    }
}

/// Broadcast events published on the named channels of spec §6:
/// `depth@<market>`, `trade@<market>`, `userTrades@<user_id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "e")]
pub enum BroadcastEvent {
    #[serde(rename = "depth")]
    Depth {
        /// Not in spec §6's literal `depth@<market>` payload — the demux key
        /// a single shared `depth` sender needs since it carries every
        /// market's deltas (spec §6, §9 "EventBus" design note).
        market: String,
        b: Vec<(Decimal, Decimal)>,
        a: Vec<(Decimal, Decimal)>,
    },
    #[serde(rename = "trade")]
    Trade {
        t: u64,
        m: bool,
        p: Decimal,
        q: Decimal,
        /// Market symbol — also the demux key for the single `trades` sender
        /// (spec §6's `trade@<market>` channel).
        s: String,
    },
    #[serde(rename = "userTrade")]
    UserTrade {
        /// Not in spec §6's literal `userTrades@<user_id>` payload — the
        /// demux key a single shared `user_trades` sender needs since it
        /// carries every user's fills (spec §6, §9 "EventBus" design note).
        user_id: String,
        t: u64,
        s: String,
        p: Decimal,
        q: Decimal,
        side: Side,
        role: TradeRole,
        timestamp: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeRole {
    Maker,
    Taker,
}

/// Records destined for the (external, out-of-scope) durable persistence
/// writer. The dispatcher only produces these; nothing here consumes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PersistenceRecord {
    TradeAdded {
        id: u64,
        market: String,
        price: Decimal,
        quantity: Decimal,
        quote_quantity: Decimal,
        is_buyer_maker: bool,
        timestamp: i64,
        buyer_user_id: Option<String>,
        seller_user_id: Option<String>,
    },
    OrderUpdate {
        order_id: Uuid,
        executed_qty: Decimal,
        market: Option<String>,
        price: Option<Decimal>,
        quantity: Option<Decimal>,
        side: Option<Side>,
        user_id: Option<String>,
        status: Option<crate::model::order::OrderStatus>,
    },
}
