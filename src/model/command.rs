//! Inbound command set (spec §4.4, §6). A `Command` arrives wrapped in an
//! `Envelope` carrying the requesting client's id, matching the request
//! queue shape `{ client_id, message }` from spec §6.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::order::Side;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    CreateOrder {
        market: String,
        user_id: String,
        side: Side,
        price: String,
        quantity: String,
    },
    CancelOrder {
        market: String,
        order_id: Uuid,
    },
    GetOpenOrders {
        market: String,
        user_id: String,
    },
    GetDepth {
        market: String,
    },
    GetBalance {
        user_id: String,
    },
    OnRamp {
        user_id: String,
        asset: String,
        amount: String,
    },
    Withdraw {
        user_id: String,
        asset: String,
        amount: String,
        tx_id: String,
    },
}

/// One inbound message from the request queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub client_id: String,
    pub command: Command,
}
