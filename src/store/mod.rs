//! Durable store port for orders and trades.
//!
//! The engine, intake, and recovery all talk to the store through this
//! trait; the Postgres implementation backs production and the in-memory
//! one backs tests and ephemeral runs.

mod memory;
mod postgres;

pub use memory::MemoryOrderStore;
pub use postgres::PgOrderStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Order, Trade};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Another order already holds this idempotency key.
    #[error("idempotency key already bound")]
    DuplicateIdempotencyKey,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // 23505 = unique_violation
            if db_err.code().as_deref() == Some("23505") {
                return StoreError::DuplicateIdempotencyKey;
            }
        }
        StoreError::Unavailable(err.to_string())
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync + 'static {
    /// Durably create an order row. Fails with `DuplicateIdempotencyKey`
    /// when the key is already bound to another order.
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError>;

    async fn find_by_id(&self, order_id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, StoreError>;

    /// Write the trades and order mutations of one command atomically:
    /// trades first, then order upserts. A replayed trade id is treated as
    /// success.
    async fn commit_execution(&self, trades: &[Trade], orders: &[Order]) -> Result<(), StoreError>;

    /// Orders with status open or partially_filled, ascending by
    /// `created_at`. Feeds recovery; the ordering preserves FIFO within
    /// each restored level.
    async fn scan_live_orders(&self) -> Result<Vec<Order>, StoreError>;

    /// Most recent trades, newest first.
    async fn recent_trades(&self, limit: i64) -> Result<Vec<Trade>, StoreError>;
}
