//! In-memory order store for tests and ephemeral runs.
//!
//! Mirrors the Postgres semantics closely enough for the engine, intake,
//! and recovery suites: idempotency-key uniqueness, trade-id replay
//! tolerance, and `created_at`-ordered live scans. Commits can be made to
//! fail on demand to exercise the engine's retry and pause paths.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{Order, OrderStatus, Trade};

use super::{OrderStore, StoreError};

#[derive(Default)]
struct Inner {
    orders: HashMap<Uuid, (u64, Order)>,
    trades: Vec<Trade>,
    trade_ids: HashSet<Uuid>,
    seq: u64,
}

#[derive(Default)]
pub struct MemoryOrderStore {
    inner: Mutex<Inner>,
    fail_commits: AtomicU32,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` `commit_execution` calls fail with `Unavailable`.
    pub fn fail_next_commits(&self, n: u32) {
        self.fail_commits.store(n, Ordering::SeqCst);
    }

    pub fn order(&self, order_id: Uuid) -> Option<Order> {
        self.inner
            .lock()
            .unwrap()
            .orders
            .get(&order_id)
            .map(|(_, o)| o.clone())
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.inner.lock().unwrap().trades.clone()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.inner
            .lock()
            .unwrap()
            .orders
            .values()
            .map(|(_, o)| o.clone())
            .collect()
    }

    pub fn order_count(&self) -> usize {
        self.inner.lock().unwrap().orders.len()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.orders.contains_key(&order.id) {
            return Err(StoreError::Unavailable("duplicate order id".to_string()));
        }
        if let Some(key) = &order.idempotency_key {
            let taken = inner
                .orders
                .values()
                .any(|(_, o)| o.idempotency_key.as_deref() == Some(key.as_str()));
            if taken {
                return Err(StoreError::DuplicateIdempotencyKey);
            }
        }
        let seq = inner.seq;
        inner.seq += 1;
        inner.orders.insert(order.id, (seq, order.clone()));
        Ok(())
    }

    async fn find_by_id(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.order(order_id))
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .orders
            .values()
            .find(|(_, o)| o.idempotency_key.as_deref() == Some(key))
            .map(|(_, o)| o.clone()))
    }

    async fn commit_execution(&self, trades: &[Trade], orders: &[Order]) -> Result<(), StoreError> {
        if self
            .fail_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }

        let mut inner = self.inner.lock().unwrap();
        for trade in trades {
            if inner.trade_ids.insert(trade.id) {
                inner.trades.push(trade.clone());
            }
        }
        for order in orders {
            match inner.orders.get_mut(&order.id) {
                Some((_, existing)) => *existing = order.clone(),
                None => {
                    let seq = inner.seq;
                    inner.seq += 1;
                    inner.orders.insert(order.id, (seq, order.clone()));
                }
            }
        }
        Ok(())
    }

    async fn scan_live_orders(&self) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut live: Vec<(u64, Order)> = inner
            .orders
            .values()
            .filter(|(_, o)| {
                matches!(o.status, OrderStatus::Open | OrderStatus::PartiallyFilled)
            })
            .cloned()
            .collect();
        live.sort_by(|(seq_a, a), (seq_b, b)| {
            a.created_at.cmp(&b.created_at).then(seq_a.cmp(seq_b))
        });
        Ok(live.into_iter().map(|(_, o)| o).collect())
    }

    async fn recent_trades(&self, limit: i64) -> Result<Vec<Trade>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut trades = inner.trades.clone();
        trades.sort_by(|a, b| b.executed_at.cmp(&a.executed_at));
        trades.truncate(limit.max(0) as usize);
        Ok(trades)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderSide, OrderType};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn order(key: Option<&str>) -> Order {
        Order {
            id: Uuid::new_v4(),
            client_id: "c1".to_string(),
            instrument: "BTC-USD".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            price: Some(dec!(10.00)),
            quantity: dec!(1),
            filled_quantity: dec!(0),
            status: OrderStatus::Open,
            idempotency_key: key.map(String::from),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_idempotency_key_uniqueness() {
        let store = MemoryOrderStore::new();
        store.insert_order(&order(Some("k1"))).await.unwrap();

        let result = store.insert_order(&order(Some("k1"))).await;
        assert!(matches!(result, Err(StoreError::DuplicateIdempotencyKey)));

        store.insert_order(&order(Some("k2"))).await.unwrap();
        store.insert_order(&order(None)).await.unwrap();
        store.insert_order(&order(None)).await.unwrap();
    }

    #[tokio::test]
    async fn test_scan_live_orders_filters_and_orders() {
        let store = MemoryOrderStore::new();
        let mut filled = order(None);
        filled.status = OrderStatus::Filled;
        let open_first = order(None);
        let open_second = order(None);

        store.insert_order(&open_first).await.unwrap();
        store.insert_order(&filled).await.unwrap();
        store.insert_order(&open_second).await.unwrap();

        let live = store.scan_live_orders().await.unwrap();
        assert_eq!(live.len(), 2);
        assert_eq!(live[0].id, open_first.id);
        assert_eq!(live[1].id, open_second.id);
    }

    #[tokio::test]
    async fn test_commit_failure_injection() {
        let store = MemoryOrderStore::new();
        store.fail_next_commits(2);

        assert!(store.commit_execution(&[], &[]).await.is_err());
        assert!(store.commit_execution(&[], &[]).await.is_err());
        assert!(store.commit_execution(&[], &[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_replayed_trade_id_is_idempotent() {
        let store = MemoryOrderStore::new();
        let trade = Trade {
            id: Uuid::new_v4(),
            buy_order_id: Uuid::new_v4(),
            sell_order_id: Uuid::new_v4(),
            instrument: "BTC-USD".to_string(),
            price: dec!(10.00),
            quantity: dec!(1),
            executed_at: Utc::now(),
        };

        store.commit_execution(&[trade.clone()], &[]).await.unwrap();
        store.commit_execution(&[trade], &[]).await.unwrap();
        assert_eq!(store.trades().len(), 1);
    }
}
