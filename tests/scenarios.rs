//! End-to-end matching scenarios driven through the engine core on the
//! in-memory store.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use trade_engine::engine::{
    CommandQueue, EngineCommand, EngineConfig, MatchingEngine, SnapshotRegistry,
};
use trade_engine::events::EventHub;
use trade_engine::intake::Intake;
use trade_engine::models::{CreateOrderRequest, Order, OrderSide, OrderStatus, OrderType};
use trade_engine::store::{MemoryOrderStore, OrderStore};
use uuid::Uuid;

const INSTRUMENT: &str = "BTC-USD";

struct Harness {
    store: Arc<MemoryOrderStore>,
    engine: MatchingEngine<MemoryOrderStore>,
    snapshots: SnapshotRegistry,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryOrderStore::new());
        let snapshots = SnapshotRegistry::new();
        let engine = MatchingEngine::new(
            Arc::clone(&store),
            snapshots.clone(),
            EventHub::new(256),
            EngineConfig::default(),
        );
        Self {
            store,
            engine,
            snapshots,
        }
    }

    fn build_order(side: OrderSide, order_type: OrderType, price: Option<Decimal>, qty: Decimal) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            client_id: "client-1".to_string(),
            instrument: INSTRUMENT.to_string(),
            side,
            order_type,
            price,
            quantity: qty,
            filled_quantity: Decimal::ZERO,
            status: OrderStatus::Open,
            idempotency_key: None,
            created_at: now,
            updated_at: now,
        }
    }

    async fn place_limit(&mut self, side: OrderSide, price: Decimal, qty: Decimal) -> Uuid {
        let order = Self::build_order(side, OrderType::Limit, Some(price), qty);
        let id = order.id;
        self.store.insert_order(&order).await.unwrap();
        self.engine.process(EngineCommand::Place(order)).await;
        id
    }

    async fn place_market(&mut self, side: OrderSide, qty: Decimal) -> Uuid {
        let order = Self::build_order(side, OrderType::Market, None, qty);
        let id = order.id;
        self.store.insert_order(&order).await.unwrap();
        self.engine.process(EngineCommand::Place(order)).await;
        id
    }

    async fn cancel(&mut self, order_id: Uuid) {
        self.engine.process(EngineCommand::Cancel(order_id)).await;
    }

    fn status(&self, order_id: Uuid) -> OrderStatus {
        self.store.order(order_id).unwrap().status
    }

    fn filled(&self, order_id: Uuid) -> Decimal {
        self.store.order(order_id).unwrap().filled_quantity
    }
}

#[tokio::test]
async fn basic_cross_fills_both_sides() {
    let mut h = Harness::new();
    let sell = h.place_limit(OrderSide::Sell, dec!(10.00), dec!(100)).await;
    let buy = h.place_limit(OrderSide::Buy, dec!(10.00), dec!(100)).await;

    let trades = h.store.trades();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].price, dec!(10.00));
    assert_eq!(trades[0].quantity, dec!(100));
    assert_eq!(trades[0].buy_order_id, buy);
    assert_eq!(trades[0].sell_order_id, sell);

    assert_eq!(h.status(sell), OrderStatus::Filled);
    assert_eq!(h.status(buy), OrderStatus::Filled);

    let book = h.engine.book(INSTRUMENT).unwrap();
    assert!(book.is_empty());
}

#[tokio::test]
async fn partial_fill_of_aggressor_rests_remainder() {
    let mut h = Harness::new();
    let sell = h.place_limit(OrderSide::Sell, dec!(10.00), dec!(50)).await;
    let buy = h.place_limit(OrderSide::Buy, dec!(10.00), dec!(80)).await;

    let trades = h.store.trades();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].quantity, dec!(50));

    assert_eq!(h.status(sell), OrderStatus::Filled);
    assert_eq!(h.status(buy), OrderStatus::PartiallyFilled);
    assert_eq!(h.filled(buy), dec!(50));

    let snapshot = h.snapshots.get(INSTRUMENT).unwrap();
    assert_eq!(snapshot.bids.len(), 1);
    assert_eq!(snapshot.bids[0].price, dec!(10.00));
    assert_eq!(snapshot.bids[0].quantity, dec!(30));
    assert!(snapshot.asks.is_empty());
}

#[tokio::test]
async fn market_order_walks_the_book() {
    let mut h = Harness::new();
    h.place_limit(OrderSide::Sell, dec!(10.00), dec!(20)).await;
    h.place_limit(OrderSide::Sell, dec!(10.01), dec!(30)).await;
    h.place_limit(OrderSide::Sell, dec!(10.02), dec!(50)).await;

    let market = h.place_market(OrderSide::Buy, dec!(60)).await;

    let trades = h.store.trades();
    assert_eq!(trades.len(), 3);
    assert_eq!(
        trades
            .iter()
            .map(|t| (t.price, t.quantity))
            .collect::<Vec<_>>(),
        vec![
            (dec!(10.00), dec!(20)),
            (dec!(10.01), dec!(30)),
            (dec!(10.02), dec!(10)),
        ]
    );

    assert_eq!(h.status(market), OrderStatus::Filled);

    let snapshot = h.snapshots.get(INSTRUMENT).unwrap();
    assert_eq!(snapshot.asks.len(), 1);
    assert_eq!(snapshot.asks[0].price, dec!(10.02));
    assert_eq!(snapshot.asks[0].quantity, dec!(40));
}

#[tokio::test]
async fn non_crossing_orders_rest_on_both_sides() {
    let mut h = Harness::new();
    let sell = h.place_limit(OrderSide::Sell, dec!(11.00), dec!(10)).await;
    let buy = h.place_limit(OrderSide::Buy, dec!(10.00), dec!(10)).await;

    assert!(h.store.trades().is_empty());
    assert_eq!(h.status(sell), OrderStatus::Open);
    assert_eq!(h.status(buy), OrderStatus::Open);

    let snapshot = h.snapshots.get(INSTRUMENT).unwrap();
    assert_eq!(snapshot.bids[0].price, dec!(10.00));
    assert_eq!(snapshot.bids[0].quantity, dec!(10));
    assert_eq!(snapshot.asks[0].price, dec!(11.00));
    assert_eq!(snapshot.asks[0].quantity, dec!(10));
}

#[tokio::test]
async fn cancel_before_match_prevents_trade() {
    let mut h = Harness::new();
    let buy = h.place_limit(OrderSide::Buy, dec!(10.00), dec!(10)).await;
    h.cancel(buy).await;
    let sell = h.place_limit(OrderSide::Sell, dec!(10.00), dec!(10)).await;

    assert!(h.store.trades().is_empty());
    assert_eq!(h.status(buy), OrderStatus::Cancelled);
    assert_eq!(h.status(sell), OrderStatus::Open);

    let snapshot = h.snapshots.get(INSTRUMENT).unwrap();
    assert!(snapshot.bids.is_empty());
    assert_eq!(snapshot.asks[0].quantity, dec!(10));
}

#[tokio::test]
async fn idempotent_replay_has_one_set_of_side_effects() {
    let mut h = Harness::new();
    let (queue_tx, mut queue_rx) = CommandQueue::new(64);
    let intake = Intake::new(Arc::clone(&h.store), queue_tx);

    let request = CreateOrderRequest {
        client_id: "client-1".to_string(),
        instrument: INSTRUMENT.to_string(),
        side: OrderSide::Buy,
        order_type: OrderType::Limit,
        price: Some(dec!(10.00)),
        quantity: dec!(10),
        idempotency_key: Some("key-1".to_string()),
    };

    let first = intake.place_order(request.clone()).await.unwrap();
    let cmd = queue_rx.recv().await.unwrap();
    h.engine.process(cmd).await;

    // Replay with the same key and a different body.
    let mut replay = request;
    replay.quantity = dec!(999);
    let second = intake.place_order(replay).await.unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.quantity, dec!(10));
    assert_eq!(intake.queue().depth(), 0); // no second enqueue
    assert_eq!(h.store.order_count(), 1);
    assert!(h.store.trades().is_empty());

    let snapshot = h.snapshots.get(INSTRUMENT).unwrap();
    assert_eq!(snapshot.bids[0].quantity, dec!(10));
}

#[tokio::test]
async fn market_order_on_empty_book_abandons() {
    let mut h = Harness::new();
    let market = h.place_market(OrderSide::Buy, dec!(5)).await;

    assert!(h.store.trades().is_empty());
    let order = h.store.order(market).unwrap();
    assert_eq!(order.status, OrderStatus::PartiallyFilled);
    assert_eq!(order.filled_quantity, dec!(0));

    // Never appears in any level.
    assert!(h
        .engine
        .book(INSTRUMENT)
        .map(|b| b.is_empty())
        .unwrap_or(true));
}

#[tokio::test]
async fn recovery_round_trip_restores_the_book() {
    let mut h = Harness::new();
    h.place_limit(OrderSide::Sell, dec!(10.00), dec!(10)).await;
    h.place_limit(OrderSide::Sell, dec!(10.01), dec!(10)).await;

    // "Restart": rebuild a fresh engine from the same store.
    let snapshots = SnapshotRegistry::new();
    let mut restarted = MatchingEngine::new(
        Arc::clone(&h.store),
        snapshots.clone(),
        EventHub::new(256),
        EngineConfig::default(),
    );
    let restored = restarted.recover().await.unwrap();
    assert_eq!(restored, 2);

    let snapshot = snapshots.get(INSTRUMENT).unwrap();
    assert!(snapshot.bids.is_empty());
    assert_eq!(
        snapshot
            .asks
            .iter()
            .map(|l| (l.price, l.quantity))
            .collect::<Vec<_>>(),
        vec![(dec!(10.00), dec!(10)), (dec!(10.01), dec!(10))]
    );

    // A new aggressor matches against the restored book as if no restart
    // had happened.
    let buy = Harness::build_order(OrderSide::Buy, OrderType::Limit, Some(dec!(10.00)), dec!(10));
    let buy_id = buy.id;
    h.store.insert_order(&buy).await.unwrap();
    restarted.process(EngineCommand::Place(buy)).await;

    assert_eq!(h.store.trades().len(), 1);
    assert_eq!(h.store.order(buy_id).unwrap().status, OrderStatus::Filled);
}

#[tokio::test]
async fn recovery_preserves_fifo_within_level() {
    let mut h = Harness::new();
    let first = h.place_limit(OrderSide::Sell, dec!(10.00), dec!(5)).await;
    let second = h.place_limit(OrderSide::Sell, dec!(10.00), dec!(7)).await;

    let mut restarted = MatchingEngine::new(
        Arc::clone(&h.store),
        SnapshotRegistry::new(),
        EventHub::new(256),
        EngineConfig::default(),
    );
    restarted.recover().await.unwrap();

    // An aggressor for exactly the first order's size must hit it, not the
    // second.
    let buy = Harness::build_order(OrderSide::Buy, OrderType::Limit, Some(dec!(10.00)), dec!(5));
    h.store.insert_order(&buy).await.unwrap();
    restarted.process(EngineCommand::Place(buy)).await;

    assert_eq!(h.store.order(first).unwrap().status, OrderStatus::Filled);
    assert_eq!(h.store.order(second).unwrap().status, OrderStatus::Open);
    assert_eq!(h.store.order(second).unwrap().filled_quantity, dec!(0));
}
