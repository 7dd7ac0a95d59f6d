//! Startup recovery: rebuild the in-memory books from the store.
//!
//! Live orders (open or partially filled) are re-inserted in `created_at`
//! order, which preserves FIFO priority within each restored price level.
//! Per-order failures are logged and skipped; the engine starts with
//! whatever could be reconstructed.

use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::models::OrderType;
use crate::store::{OrderStore, StoreError};

use super::book::OrderBook;
use super::engine::MatchingEngine;

impl<S: OrderStore> MatchingEngine<S> {
    /// Rebuild books from `scan_live_orders()`. Must run before the worker
    /// starts consuming commands. Returns the number of restored orders.
    pub async fn recover(&mut self) -> Result<usize, StoreError> {
        let live = self.store().scan_live_orders().await?;
        let total = live.len();

        let mut restored = 0usize;
        let mut touched: HashSet<String> = HashSet::new();
        let (books, resting) = self.books_mut();

        for order in live {
            if order.remaining() <= Decimal::ZERO {
                warn!(order_id = %order.id, "live order with nothing remaining; skipping");
                continue;
            }

            let book = books
                .entry(order.instrument.clone())
                .or_insert_with(|| OrderBook::new(order.instrument.clone()));

            match order.order_type {
                OrderType::Limit => {
                    if order.price.is_none() {
                        warn!(order_id = %order.id, "limit order without a price; skipping");
                        continue;
                    }
                    if book.add_limit(&order) {
                        touched.insert(order.instrument.clone());
                        resting.insert(order.id, order.clone());
                        restored += 1;
                    } else {
                        warn!(order_id = %order.id, "could not restore order into its book");
                    }
                }
                OrderType::Market => {
                    if order.filled_quantity > Decimal::ZERO {
                        // Market orders never rest; a partially filled one in
                        // the store is an anomaly.
                        warn!(order_id = %order.id, "partially filled market order in store; skipping");
                    } else {
                        warn!(order_id = %order.id, "unfilled market order in store; indexing without resting");
                        book.add_market(&order);
                        resting.insert(order.id, order.clone());
                    }
                }
            }
        }

        for instrument in &touched {
            self.publish_book(instrument);
        }

        info!(restored, scanned = total, "order book recovery complete");
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::book::SnapshotRegistry;
    use crate::engine::engine::EngineConfig;
    use crate::events::EventHub;
    use crate::models::{Order, OrderSide, OrderStatus};
    use crate::store::MemoryOrderStore;
    use chrono::{Duration as ChronoDuration, Utc};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use uuid::Uuid;

    fn live_order(
        side: OrderSide,
        price: Decimal,
        qty: Decimal,
        filled: Decimal,
        age_secs: i64,
    ) -> Order {
        let created = Utc::now() - ChronoDuration::seconds(age_secs);
        Order {
            id: Uuid::new_v4(),
            client_id: "c1".to_string(),
            instrument: "BTC-USD".to_string(),
            side,
            order_type: OrderType::Limit,
            price: Some(price),
            quantity: qty,
            filled_quantity: filled,
            status: if filled.is_zero() {
                OrderStatus::Open
            } else {
                OrderStatus::PartiallyFilled
            },
            idempotency_key: None,
            created_at: created,
            updated_at: created,
        }
    }

    async fn recovered_engine(store: Arc<MemoryOrderStore>) -> MatchingEngine<MemoryOrderStore> {
        let mut engine = MatchingEngine::new(
            store,
            SnapshotRegistry::new(),
            EventHub::new(64),
            EngineConfig::default(),
        );
        engine.recover().await.unwrap();
        engine
    }

    #[tokio::test]
    async fn test_recover_rebuilds_resting_asks() {
        let store = Arc::new(MemoryOrderStore::new());
        store
            .insert_order(&live_order(OrderSide::Sell, dec!(10.00), dec!(10), dec!(0), 20))
            .await
            .unwrap();
        store
            .insert_order(&live_order(OrderSide::Sell, dec!(10.01), dec!(10), dec!(0), 10))
            .await
            .unwrap();

        let engine = recovered_engine(store).await;
        let snapshot = engine.snapshots().get("BTC-USD").unwrap();

        assert!(snapshot.bids.is_empty());
        assert_eq!(snapshot.asks.len(), 2);
        assert_eq!(snapshot.asks[0].price, dec!(10.00));
        assert_eq!(snapshot.asks[0].quantity, dec!(10));
        assert_eq!(snapshot.asks[1].price, dec!(10.01));
    }

    #[tokio::test]
    async fn test_recover_preserves_fifo_within_level() {
        let store = Arc::new(MemoryOrderStore::new());
        let older = live_order(OrderSide::Sell, dec!(10.00), dec!(5), dec!(0), 60);
        let newer = live_order(OrderSide::Sell, dec!(10.00), dec!(5), dec!(0), 1);
        // Inserted newest-first; the created_at scan ordering must win.
        store.insert_order(&newer).await.unwrap();
        store.insert_order(&older).await.unwrap();

        let engine = recovered_engine(store).await;
        let book = engine.book("BTC-USD").unwrap();
        let head = book.best_ask_level().unwrap().head().unwrap();
        assert_eq!(head.order_id, older.id);
    }

    #[tokio::test]
    async fn test_recover_uses_remaining_quantity() {
        let store = Arc::new(MemoryOrderStore::new());
        store
            .insert_order(&live_order(OrderSide::Buy, dec!(9.99), dec!(10), dec!(4), 5))
            .await
            .unwrap();

        let engine = recovered_engine(store).await;
        let snapshot = engine.snapshots().get("BTC-USD").unwrap();
        assert_eq!(snapshot.bids[0].quantity, dec!(6));
    }

    #[tokio::test]
    async fn test_recover_skips_anomalies() {
        let store = Arc::new(MemoryOrderStore::new());

        // Fully consumed but still marked live.
        store
            .insert_order(&live_order(OrderSide::Buy, dec!(9.99), dec!(10), dec!(10), 5))
            .await
            .unwrap();

        // Partially filled market order must not rest.
        let mut market = live_order(OrderSide::Buy, dec!(9.99), dec!(10), dec!(2), 5);
        market.order_type = OrderType::Market;
        market.price = None;
        store.insert_order(&market).await.unwrap();

        let mut engine = MatchingEngine::new(
            store,
            SnapshotRegistry::new(),
            EventHub::new(64),
            EngineConfig::default(),
        );
        let restored = engine.recover().await.unwrap();

        assert_eq!(restored, 0);
        assert!(engine
            .book("BTC-USD")
            .map(|b| b.is_empty())
            .unwrap_or(true));
    }
}
