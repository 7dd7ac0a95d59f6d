//! PostgreSQL-backed order store.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Order, Trade};

use super::{OrderStore, StoreError};

#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, client_id, instrument, side, order_type, price, quantity,
                                filled_quantity, status, idempotency_key, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(order.id)
        .bind(&order.client_id)
        .bind(&order.instrument)
        .bind(order.side)
        .bind(order.order_type)
        .bind(order.price)
        .bind(order.quantity)
        .bind(order.filled_quantity)
        .bind(order.status)
        .bind(&order.idempotency_key)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, StoreError> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE idempotency_key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    async fn commit_execution(&self, trades: &[Trade], orders: &[Order]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for trade in trades {
            sqlx::query(
                r#"
                INSERT INTO trades (id, buy_order_id, sell_order_id, instrument, price, quantity, executed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(trade.id)
            .bind(trade.buy_order_id)
            .bind(trade.sell_order_id)
            .bind(&trade.instrument)
            .bind(trade.price)
            .bind(trade.quantity)
            .bind(trade.executed_at)
            .execute(&mut *tx)
            .await?;
        }

        for order in orders {
            sqlx::query(
                r#"
                INSERT INTO orders (id, client_id, instrument, side, order_type, price, quantity,
                                    filled_quantity, status, idempotency_key, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                ON CONFLICT (id) DO UPDATE SET
                    filled_quantity = EXCLUDED.filled_quantity,
                    status = EXCLUDED.status,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(order.id)
            .bind(&order.client_id)
            .bind(&order.instrument)
            .bind(order.side)
            .bind(order.order_type)
            .bind(order.price)
            .bind(order.quantity)
            .bind(order.filled_quantity)
            .bind(order.status)
            .bind(&order.idempotency_key)
            .bind(order.created_at)
            .bind(order.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn scan_live_orders(&self) -> Result<Vec<Order>, StoreError> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders
            WHERE status IN ('open', 'partially_filled')
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    async fn recent_trades(&self, limit: i64) -> Result<Vec<Trade>, StoreError> {
        let trades = sqlx::query_as::<_, Trade>(
            "SELECT * FROM trades ORDER BY executed_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(trades)
    }
}
