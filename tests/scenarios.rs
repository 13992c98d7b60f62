//! End-to-end dispatcher scenarios from spec §8 ("Concrete end-to-end
//! scenarios"), driven entirely through `Engine::apply_command` the way a
//! real request-queue consumer would.

use tokio::sync::mpsc;

use spot_engine::decimal::Decimal;
use spot_engine::engine::{Engine, EventBus, MarketConfig};
use spot_engine::model::command::Command;
use spot_engine::model::event::ResultPayload;
use spot_engine::model::order::{Side, StpMode};

fn d(s: &str) -> Decimal {
    Decimal::parse(s).unwrap()
}

fn test_engine() -> Engine {
    let events = EventBus::new(64);
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move { while rx.recv().await.is_some() {} });

    let mut engine = Engine::new(events, tx);
    engine.seed(
        &[MarketConfig {
            symbol: "TATA_INR".to_string(),
            base_asset: "TATA".to_string(),
            quote_asset: "INR".to_string(),
            stp_mode: StpMode::CancelNewest,
        }],
        &[
            ("u1".to_string(), "INR".to_string(), d("10000")),
            ("u1".to_string(), "TATA".to_string(), d("100")),
            ("u2".to_string(), "INR".to_string(), d("10000")),
            ("u2".to_string(), "TATA".to_string(), d("100")),
        ],
    );
    engine
}

fn create_order(engine: &mut Engine, user: &str, side: Side, price: &str, qty: &str) -> ResultPayload {
    engine.apply_command(
        "client",
        Command::CreateOrder {
            market: "TATA_INR".to_string(),
            user_id: user.to_string(),
            side,
            price: price.to_string(),
            quantity: qty.to_string(),
        },
    )
}

fn balance_of(engine: &mut Engine, user: &str, asset: &str) -> (Decimal, Decimal) {
    match engine.apply_command("client", Command::GetBalance { user_id: user.to_string() }) {
        ResultPayload::Balance(map) => {
            let b = map.get(asset).copied().unwrap_or_default();
            (b.available, b.locked)
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test]
async fn s1_full_fill_at_maker_price() {
    let mut engine = test_engine();

    create_order(&mut engine, "u2", Side::Sell, "100", "10");
    let result = create_order(&mut engine, "u1", Side::Buy, "100", "10");

    match result {
        ResultPayload::OrderPlaced { executed_qty, fills, .. } => {
            assert_eq!(executed_qty, d("10"));
            assert_eq!(fills.len(), 1);
            assert_eq!(fills[0].price, d("100"));
            assert_eq!(fills[0].qty, d("10"));
        }
        other => panic!("expected OrderPlaced, got {other:?}"),
    }

    assert_eq!(balance_of(&mut engine, "u1", "INR"), (d("9000"), Decimal::ZERO));
    assert_eq!(balance_of(&mut engine, "u1", "TATA"), (d("110"), Decimal::ZERO));
    assert_eq!(balance_of(&mut engine, "u2", "INR"), (d("11000"), Decimal::ZERO));
    assert_eq!(balance_of(&mut engine, "u2", "TATA"), (d("90"), Decimal::ZERO));

    match engine.apply_command("client", Command::GetDepth { market: "TATA_INR".to_string() }) {
        ResultPayload::Depth { bids, asks } => {
            assert!(bids.is_empty());
            assert!(asks.is_empty());
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test]
async fn s2_partial_fill() {
    let mut engine = test_engine();

    create_order(&mut engine, "u2", Side::Sell, "100", "20");
    let result = create_order(&mut engine, "u1", Side::Buy, "100", "10");

    match result {
        ResultPayload::OrderPlaced { executed_qty, .. } => assert_eq!(executed_qty, d("10")),
        other => panic!("expected OrderPlaced, got {other:?}"),
    }

    assert_eq!(balance_of(&mut engine, "u1", "INR"), (d("9000"), Decimal::ZERO));
    assert_eq!(balance_of(&mut engine, "u1", "TATA"), (d("110"), Decimal::ZERO));
    assert_eq!(balance_of(&mut engine, "u2", "TATA"), (d("90"), d("10")));

    match engine.apply_command("client", Command::GetDepth { market: "TATA_INR".to_string() }) {
        ResultPayload::Depth { asks, .. } => assert_eq!(asks, vec![(d("100"), d("10"))]),
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test]
async fn s3_price_time_across_levels() {
    let mut engine = test_engine();
    engine.apply_command("client", Command::OnRamp { user_id: "u3".to_string(), asset: "INR".to_string(), amount: "10000".to_string() });
    engine.apply_command("client", Command::OnRamp { user_id: "u4".to_string(), asset: "TATA".to_string(), amount: "100".to_string() });

    create_order(&mut engine, "u1", Side::Buy, "1002", "2");
    create_order(&mut engine, "u2", Side::Buy, "1001", "3");
    create_order(&mut engine, "u3", Side::Buy, "1000", "5");

    let result = create_order(&mut engine, "u4", Side::Sell, "1000", "6");

    match result {
        ResultPayload::OrderPlaced { executed_qty, fills, .. } => {
            assert_eq!(executed_qty, d("6"));
            assert_eq!(fills.len(), 3);
            assert_eq!((fills[0].price, fills[0].qty), (d("1002"), d("2")));
            assert_eq!((fills[1].price, fills[1].qty), (d("1001"), d("3")));
            assert_eq!((fills[2].price, fills[2].qty), (d("1000"), d("1")));
        }
        other => panic!("expected OrderPlaced, got {other:?}"),
    }

    match engine.apply_command("client", Command::GetDepth { market: "TATA_INR".to_string() }) {
        ResultPayload::Depth { bids, .. } => assert_eq!(bids, vec![(d("1000"), d("4"))]),
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test]
async fn s4_no_cross() {
    let mut engine = test_engine();

    create_order(&mut engine, "u1", Side::Buy, "990", "5");
    let result = create_order(&mut engine, "u2", Side::Sell, "1000", "5");

    match result {
        ResultPayload::OrderPlaced { executed_qty, fills, .. } => {
            assert_eq!(executed_qty, Decimal::ZERO);
            assert!(fills.is_empty());
        }
        other => panic!("expected OrderPlaced, got {other:?}"),
    }

    match engine.apply_command("client", Command::GetDepth { market: "TATA_INR".to_string() }) {
        ResultPayload::Depth { bids, asks } => {
            assert_eq!(bids, vec![(d("990"), d("5"))]);
            assert_eq!(asks, vec![(d("1000"), d("5"))]);
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test]
async fn s5_stp_cancel_newest_rejects_and_unwinds_lock() {
    let mut engine = test_engine();

    create_order(&mut engine, "u1", Side::Sell, "1000", "5");
    let before = balance_of(&mut engine, "u1", "TATA");

    let result = create_order(&mut engine, "u1", Side::Buy, "1000", "5");

    match result {
        ResultPayload::OrderRejected { code, .. } => {
            assert!(matches!(code, spot_engine::error::RejectCode::SelfTrade));
        }
        other => panic!("expected OrderRejected, got {other:?}"),
    }

    assert_eq!(balance_of(&mut engine, "u1", "TATA"), before);
    match engine.apply_command("client", Command::GetDepth { market: "TATA_INR".to_string() }) {
        ResultPayload::Depth { asks, .. } => assert_eq!(asks, vec![(d("1000"), d("5"))]),
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test]
async fn s6_conservation_under_trade() {
    let mut engine = test_engine();

    create_order(&mut engine, "u2", Side::Sell, "100", "10");
    create_order(&mut engine, "u1", Side::Buy, "100", "10");

    let (u1_inr_avail, u1_inr_locked) = balance_of(&mut engine, "u1", "INR");
    let (u2_inr_avail, u2_inr_locked) = balance_of(&mut engine, "u2", "INR");
    let (u1_tata_avail, u1_tata_locked) = balance_of(&mut engine, "u1", "TATA");
    let (u2_tata_avail, u2_tata_locked) = balance_of(&mut engine, "u2", "TATA");

    let total_inr = u1_inr_avail.add(u1_inr_locked).add(u2_inr_avail).add(u2_inr_locked);
    let total_tata = u1_tata_avail.add(u1_tata_locked).add(u2_tata_avail).add(u2_tata_locked);

    assert_eq!(total_inr, d("20000"));
    assert_eq!(total_tata, d("200"));
}

#[tokio::test]
async fn cancel_returns_locked_funds_and_is_idempotent() {
    let mut engine = test_engine();

    let placed = create_order(&mut engine, "u1", Side::Buy, "50", "4");
    let order_id = match placed {
        ResultPayload::OrderPlaced { order_id, .. } => order_id,
        other => panic!("expected OrderPlaced, got {other:?}"),
    };

    assert_eq!(balance_of(&mut engine, "u1", "INR"), (d("9800"), d("200")));

    let cancelled = engine.apply_command(
        "client",
        Command::CancelOrder { market: "TATA_INR".to_string(), order_id },
    );
    match cancelled {
        ResultPayload::OrderCancelled { remaining_qty, .. } => assert_eq!(remaining_qty, d("4")),
        other => panic!("expected OrderCancelled, got {other:?}"),
    }
    assert_eq!(balance_of(&mut engine, "u1", "INR"), (d("10000"), Decimal::ZERO));

    // Cancelling again is a no-op.
    let noop = engine.apply_command("client", Command::CancelOrder { market: "TATA_INR".to_string(), order_id });
    match noop {
        ResultPayload::OrderCancelled { executed_qty, remaining_qty, .. } => {
            assert_eq!(executed_qty, Decimal::ZERO);
            assert_eq!(remaining_qty, Decimal::ZERO);
        }
        other => panic!("expected OrderCancelled, got {other:?}"),
    }
}

#[tokio::test]
async fn withdraw_fails_when_underfunded_and_succeeds_otherwise() {
    let mut engine = test_engine();

    let failed = engine.apply_command(
        "client",
        Command::Withdraw { user_id: "u1".to_string(), asset: "INR".to_string(), amount: "999999".to_string(), tx_id: "tx1".to_string() },
    );
    assert!(matches!(failed, ResultPayload::WithdrawFailed { .. }));

    let ok = engine.apply_command(
        "client",
        Command::Withdraw { user_id: "u1".to_string(), asset: "INR".to_string(), amount: "1000".to_string(), tx_id: "tx2".to_string() },
    );
    match ok {
        ResultPayload::WithdrawSuccess { new_balance, .. } => assert_eq!(new_balance, d("9000")),
        other => panic!("expected WithdrawSuccess, got {other:?}"),
    }
}

#[tokio::test]
async fn on_ramp_with_malformed_amount_is_rejected_as_on_ramp_failure() {
    let mut engine = test_engine();

    let rejected = engine.apply_command(
        "client",
        Command::OnRamp { user_id: "u5".to_string(), asset: "INR".to_string(), amount: "not-a-number".to_string() },
    );
    assert!(matches!(rejected, ResultPayload::OnRampFailed { .. }));

    let ok = engine.apply_command(
        "client",
        Command::OnRamp { user_id: "u5".to_string(), asset: "INR".to_string(), amount: "500".to_string() },
    );
    match ok {
        ResultPayload::OnRampSuccess { new_balance, .. } => assert_eq!(new_balance, d("500")),
        other => panic!("expected OnRampSuccess, got {other:?}"),
    }
}
