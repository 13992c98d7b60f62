//! Engine dispatcher: owns the market registry and balance ledger, and
//! implements the cross-cutting `validate -> lock -> match -> settle ->
//! emit` workflow for each inbound command (spec §4.4).

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::decimal::Decimal;
use crate::error::{EngineError, LedgerError, RejectCode};
use crate::ledger::BalanceLedger;
use crate::model::command::Command;
use crate::model::event::{BroadcastEvent, FillView, PersistenceRecord, ResultPayload, TradeRole};
use crate::model::order::{Order, OrderStatus, Side, StpMode};
use crate::orderbook::{BookSnapshot, Orderbook};

/// One market's static identity, as named in its `BASE_QUOTE` symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    #[serde(default)]
    pub stp_mode: StpMode,
}

/// The three broadcast channel families of spec §6, generalized from the
/// donor's single-topic `broadcast::Sender<TradeEvent>` to the channel
/// families this engine names. Each event carries its own market/user
/// field so a single sender can serve every market; a real fan-out layer
/// downstream demultiplexes by that field.
#[derive(Clone)]
pub struct EventBus {
    pub depth: broadcast::Sender<BroadcastEvent>,
    pub trades: broadcast::Sender<BroadcastEvent>,
    pub user_trades: broadcast::Sender<BroadcastEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            depth: broadcast::channel(capacity).0,
            trades: broadcast::channel(capacity).0,
            user_trades: broadcast::channel(capacity).0,
        }
    }

    fn emit_depth(&self, event: BroadcastEvent) {
        let _ = self.depth.send(event);
    }

    fn emit_trade(&self, event: BroadcastEvent) {
        let _ = self.trades.send(event);
    }

    fn emit_user_trade(&self, event: BroadcastEvent) {
        let _ = self.user_trades.send(event);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub orderbooks: Vec<BookSnapshot>,
    pub balances: Vec<(String, HashMap<String, crate::ledger::AssetBalance>)>,
}

/// Owns every market's orderbook and the balance ledger. Single-threaded
/// command processor: `apply_command` must be called to completion before
/// the next command is dequeued (spec §5).
pub struct Engine {
    markets: HashMap<String, Orderbook>,
    ledger: BalanceLedger,
    events: EventBus,
    persistence_tx: mpsc::UnboundedSender<PersistenceRecord>,
}

impl Engine {
    pub fn new(events: EventBus, persistence_tx: mpsc::UnboundedSender<PersistenceRecord>) -> Self {
        Self {
            markets: HashMap::new(),
            ledger: BalanceLedger::new(),
            events,
            persistence_tx,
        }
    }

    /// Seed an empty engine with configured markets and balances (spec §6
    /// "Configuration" — used when no snapshot is restored on start).
    pub fn seed(&mut self, markets: &[MarketConfig], seed_balances: &[(String, String, Decimal)]) {
        for m in markets {
            self.markets.insert(
                m.symbol.clone(),
                Orderbook::new(m.base_asset.clone(), m.quote_asset.clone(), m.stp_mode),
            );
        }
        for (user_id, asset, amount) in seed_balances {
            self.ledger.credit(user_id, asset, *amount);
        }
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            orderbooks: self.markets.values().map(|b| b.snapshot()).collect(),
            balances: self.ledger.all(),
        }
    }

    pub fn restore(snapshot: EngineSnapshot, events: EventBus, persistence_tx: mpsc::UnboundedSender<PersistenceRecord>) -> Self {
        let mut markets = HashMap::new();
        for book_snapshot in snapshot.orderbooks {
            let symbol = format!("{}_{}", book_snapshot.base_asset, book_snapshot.quote_asset);
            markets.insert(symbol, Orderbook::restore(book_snapshot));
        }
        let mut ledger = BalanceLedger::new();
        for (user_id, assets) in snapshot.balances {
            ledger.restore_user(user_id, assets);
        }
        Self {
            markets,
            ledger,
            events,
            persistence_tx,
        }
    }

    fn push_persistence(&self, record: PersistenceRecord) {
        if self.persistence_tx.send(record).is_err() {
            debug!("persistence channel has no receiver; dropping record");
        }
    }

    /// Run one command to completion, performing the entire `validate ->
    /// lock -> match -> settle -> emit` workflow synchronously and
    /// returning the single result owed to the requesting client.
    pub fn apply_command(&mut self, client_id: &str, command: Command) -> ResultPayload {
        match command {
            Command::CreateOrder { market, user_id, side, price, quantity } => {
                self.create_order(client_id, market, user_id, side, price, quantity)
            }
            Command::CancelOrder { market, order_id } => self.cancel_order(market, order_id),
            Command::GetOpenOrders { market, user_id } => ResultPayload::OpenOrders(
                self.markets.get(&market).map(|b| b.open_orders(&user_id)).unwrap_or_default(),
            ),
            Command::GetDepth { market } => {
                let (bids, asks) = self.markets.get(&market).map(|b| b.depth()).unwrap_or_default();
                ResultPayload::Depth { bids, asks }
            }
            Command::GetBalance { user_id } => ResultPayload::Balance(self.ledger.get(&user_id)),
            Command::OnRamp { user_id, asset, amount } => self.on_ramp(user_id, asset, amount),
            Command::Withdraw { user_id, asset, amount, tx_id } => self.withdraw(user_id, asset, amount, tx_id),
        }
    }

    fn reject(&self, reason: impl Into<String>, code: RejectCode) -> ResultPayload {
        ResultPayload::OrderRejected {
            order_id: String::new(),
            executed_qty: Decimal::ZERO,
            remaining_qty: Decimal::ZERO,
            reason: reason.into(),
            code,
        }
    }

    fn create_order(
        &mut self,
        client_id: &str,
        market: String,
        user_id: String,
        side: Side,
        price_text: String,
        quantity_text: String,
    ) -> ResultPayload {
        debug!(client_id = %client_id, market = %market, user_id = %user_id, "create_order received");

        let Some(book) = self.markets.get(&market) else {
            return self.reject(format!("unknown market: {market}"), RejectCode::OrderFailed);
        };
        let (base_asset, quote_asset) = (book.base_asset.clone(), book.quote_asset.clone());

        let price = match Decimal::parse(&price_text) {
            Ok(p) if p.is_positive() => p,
            _ => return self.reject("price must be a positive decimal", RejectCode::OrderFailed),
        };
        let quantity = match Decimal::parse(&quantity_text) {
            Ok(q) if q.is_positive() => q,
            _ => return self.reject("quantity must be a positive decimal", RejectCode::OrderFailed),
        };

        if let Err(LedgerError::InsufficientFunds { asset, required, .. }) =
            self.ledger.lock(&user_id, side, &base_asset, &quote_asset, price, quantity)
        {
            return self.reject(
                format!("insufficient funds: need {required} {asset}"),
                RejectCode::OrderFailed,
            );
        }

        let order = Order {
            order_id: Uuid::new_v4(),
            user_id: user_id.clone(),
            market: market.clone(),
            side,
            price,
            quantity,
            filled: Decimal::ZERO,
            sequence: 0,
        };

        let Some(book) = self.markets.get_mut(&market) else {
            debug_assert!(false, "market {market} vanished between validation and matching");
            tracing::error!(market = %market, "internal invariant violation: market unavailable after a successful lock, unwinding and dropping command");
            self.ledger.unlock(&user_id, side, &base_asset, &quote_asset, price, quantity);
            return self.reject(format!("internal error: market {market} unavailable"), RejectCode::OrderFailed);
        };
        let outcome = book.add_order(order);

        // Self-trade prevention removed resting orders before possibly
        // rejecting; unwind their locked funds and announce the cancel.
        for cancelled in &outcome.cancelled_orders {
            self.ledger.unlock(
                &cancelled.user_id,
                cancelled.side,
                &base_asset,
                &quote_asset,
                cancelled.price,
                cancelled.remaining(),
            );
            self.push_persistence(PersistenceRecord::OrderUpdate {
                order_id: cancelled.order_id,
                executed_qty: cancelled.filled,
                market: Some(market.clone()),
                price: Some(cancelled.price),
                quantity: Some(cancelled.quantity),
                side: Some(cancelled.side),
                user_id: Some(cancelled.user_id.clone()),
                status: Some(OrderStatus::Cancelled),
            });
            self.emit_depth_delta(&market, cancelled.side, cancelled.price);
        }

        if matches!(outcome.status, OrderStatus::Rejected) {
            // Self-trade detected against the taker's own order; unwind
            // the lock this command just took.
            self.ledger.unlock(&user_id, side, &base_asset, &quote_asset, price, quantity);
            info!(market = %market, user_id = %user_id, "order rejected: self-trade prevention");
            return ResultPayload::OrderRejected {
                order_id: String::new(),
                executed_qty: Decimal::ZERO,
                remaining_qty: Decimal::ZERO,
                reason: outcome.rejection_reason.unwrap_or_default(),
                code: RejectCode::SelfTrade,
            };
        }

        let order_id = outcome.order.order_id;
        let taker_status = if !outcome.order.remaining().is_positive() {
            OrderStatus::Filled
        } else {
            outcome.status
        };

        for fill in &outcome.fills {
            self.ledger.settle_fill(&user_id, &fill.maker_user_id, side, &base_asset, &quote_asset, fill.qty, fill.price);

            let is_buyer_maker = side == Side::Sell;
            let (buyer_user_id, seller_user_id) = match side {
                Side::Buy => (Some(user_id.clone()), Some(fill.maker_user_id.clone())),
                Side::Sell => (Some(fill.maker_user_id.clone()), Some(user_id.clone())),
            };

            self.push_persistence(PersistenceRecord::TradeAdded {
                id: fill.trade_id,
                market: market.clone(),
                price: fill.price,
                quantity: fill.qty,
                quote_quantity: fill.qty.mul(fill.price),
                is_buyer_maker,
                timestamp: Utc::now().timestamp_millis(),
                buyer_user_id,
                seller_user_id,
            });

            self.push_persistence(PersistenceRecord::OrderUpdate {
                order_id: fill.maker_order_id,
                executed_qty: fill.qty,
                market: Some(market.clone()),
                price: Some(fill.price),
                quantity: None,
                side: Some(side.opposite()),
                user_id: Some(fill.maker_user_id.clone()),
                status: None,
            });

            self.events.emit_trade(BroadcastEvent::Trade {
                t: fill.trade_id,
                m: is_buyer_maker,
                p: fill.price,
                q: fill.qty,
                s: market.clone(),
            });

            self.events.emit_user_trade(BroadcastEvent::UserTrade {
                user_id: user_id.clone(),
                t: fill.trade_id,
                s: market.clone(),
                p: fill.price,
                q: fill.qty,
                side,
                role: TradeRole::Taker,
                timestamp: Utc::now().timestamp_millis(),
            });
            self.events.emit_user_trade(BroadcastEvent::UserTrade {
                user_id: fill.maker_user_id.clone(),
                t: fill.trade_id,
                s: market.clone(),
                p: fill.price,
                q: fill.qty,
                side: side.opposite(),
                role: TradeRole::Maker,
                timestamp: Utc::now().timestamp_millis(),
            });
        }

        self.push_persistence(PersistenceRecord::OrderUpdate {
            order_id,
            executed_qty: outcome.executed_qty,
            market: Some(market.clone()),
            price: Some(price),
            quantity: Some(quantity),
            side: Some(side),
            user_id: Some(user_id.clone()),
            status: Some(taker_status),
        });

        for (side, price) in &outcome.touched_levels {
            self.emit_depth_delta(&market, *side, *price);
        }

        debug!(market = %market, order_id = %order_id, executed_qty = %outcome.executed_qty, "order placed");

        ResultPayload::OrderPlaced {
            order_id,
            executed_qty: outcome.executed_qty,
            fills: outcome.fills.iter().map(FillView::from).collect(),
        }
    }

    fn emit_depth_delta(&self, market: &str, side: Side, price: Decimal) {
        let Some(book) = self.markets.get(market) else { return };
        let qty = book.depth_at(side, price);
        let level = (price, qty);
        let (b, a) = match side {
            Side::Buy => (vec![level], Vec::new()),
            Side::Sell => (Vec::new(), vec![level]),
        };
        self.events.emit_depth(BroadcastEvent::Depth { market: market.to_string(), b, a });
    }

    fn cancel_order(&mut self, market: String, order_id: Uuid) -> ResultPayload {
        let Some(book) = self.markets.get_mut(&market) else {
            return ResultPayload::OrderCancelled { order_id, executed_qty: Decimal::ZERO, remaining_qty: Decimal::ZERO };
        };
        let Some(cancelled) = book.cancel(order_id) else {
            return ResultPayload::OrderCancelled { order_id, executed_qty: Decimal::ZERO, remaining_qty: Decimal::ZERO };
        };

        let base_asset = book.base_asset.clone();
        let quote_asset = book.quote_asset.clone();
        let price = cancelled.price;
        let remaining = cancelled.remaining();

        self.ledger.unlock(&cancelled.user_id, cancelled.side, &base_asset, &quote_asset, price, remaining);

        self.push_persistence(PersistenceRecord::OrderUpdate {
            order_id,
            executed_qty: cancelled.filled,
            market: Some(market.clone()),
            price: Some(price),
            quantity: Some(cancelled.quantity),
            side: Some(cancelled.side),
            user_id: Some(cancelled.user_id.clone()),
            status: Some(OrderStatus::Cancelled),
        });

        self.emit_depth_delta(&market, cancelled.side, price);

        ResultPayload::OrderCancelled { order_id, executed_qty: cancelled.filled, remaining_qty: remaining }
    }

    fn on_ramp(&mut self, user_id: String, asset: String, amount_text: String) -> ResultPayload {
        let amount = match Decimal::parse(&amount_text) {
            Ok(a) if a.is_positive() => a,
            _ => {
                return ResultPayload::OnRampFailed {
                    user_id,
                    reason: "amount must be a positive decimal".to_string(),
                }
            }
        };
        self.ledger.credit(&user_id, &asset, amount);
        let new_balance = self.ledger.get(&user_id).get(&asset).map(|b| b.available).unwrap_or(Decimal::ZERO);
        ResultPayload::OnRampSuccess { user_id, amount, new_balance }
    }

    fn withdraw(&mut self, user_id: String, asset: String, amount_text: String, tx_id: String) -> ResultPayload {
        let amount = match Decimal::parse(&amount_text) {
            Ok(a) if a.is_positive() => a,
            _ => {
                return ResultPayload::WithdrawFailed {
                    user_id,
                    tx_id,
                    reason: "amount must be a positive decimal".to_string(),
                }
            }
        };
        match self.ledger.debit(&user_id, &asset, amount) {
            Ok(()) => {
                let new_balance = self.ledger.get(&user_id).get(&asset).map(|b| b.available).unwrap_or(Decimal::ZERO);
                ResultPayload::WithdrawSuccess { user_id, tx_id, new_balance }
            }
            Err(LedgerError::InsufficientFunds { .. }) => {
                warn!(user_id = %user_id, asset = %asset, "withdraw rejected: insufficient funds");
                ResultPayload::WithdrawFailed { user_id, tx_id, reason: "insufficient funds".to_string() }
            }
            Err(LedgerError::UnknownAsset(_)) => {
                ResultPayload::WithdrawFailed { user_id, tx_id, reason: "unknown asset".to_string() }
            }
        }
    }
}

/// Validation/internal errors that never leave the dispatcher as-is — they
/// are always rendered into a [`ResultPayload`] by `apply_command` before
/// reaching a caller, per spec §7's propagation policy. Kept as a typed
/// enum for callers that want to pattern-match before rendering, e.g. the
/// engine's own tests.
#[allow(dead_code)]
pub type DispatcherError = EngineError;
