//! Order intake: validate, durably accept, then enqueue.
//!
//! Persist-before-enqueue is the durability contract: a command only enters
//! the matching queue once its order row is on disk with status `open`.
//! Enqueueing is non-blocking; a full queue is surfaced to the client as
//! backpressure rather than absorbed here.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::{EngineCommand, QueueError, QueueSender};
use crate::models::{CreateOrderRequest, Order, OrderStatus, OrderType};
use crate::store::{OrderStore, StoreError};

const MAX_DECIMAL_SCALE: u32 = 8;
const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("request validation failed")]
    Validation(Vec<String>),

    #[error("order store unavailable")]
    StoreUnavailable,

    #[error("command queue full")]
    QueueFull,

    #[error("order not found")]
    NotFound,
}

pub struct Intake<S> {
    store: Arc<S>,
    queue: QueueSender,
}

impl<S: OrderStore> Intake<S> {
    pub fn new(store: Arc<S>, queue: QueueSender) -> Self {
        Self { store, queue }
    }

    /// Accept a new order: validate, resolve the idempotency key, persist
    /// the row with status `open`, then enqueue the place command.
    ///
    /// A replayed idempotency key returns the previously accepted order
    /// without a second enqueue. On queue-full the persisted row stays
    /// `open`; recovery re-arms it after the next restart.
    pub async fn place_order(&self, req: CreateOrderRequest) -> Result<Order, IntakeError> {
        let errors = validate(&req);
        if !errors.is_empty() {
            return Err(IntakeError::Validation(errors));
        }

        if let Some(key) = req.idempotency_key.as_deref() {
            if let Some(existing) = self
                .store
                .find_by_idempotency_key(key)
                .await
                .map_err(unavailable)?
            {
                info!(order_id = %existing.id, key, "idempotent replay; returning existing order");
                return Ok(existing);
            }
        }

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            client_id: req.client_id,
            instrument: req.instrument,
            side: req.side,
            order_type: req.order_type,
            price: req.price,
            quantity: req.quantity,
            filled_quantity: Decimal::ZERO,
            status: OrderStatus::Open,
            idempotency_key: req.idempotency_key,
            created_at: now,
            updated_at: now,
        };

        match self.store.insert_order(&order).await {
            Ok(()) => {}
            Err(StoreError::DuplicateIdempotencyKey) => {
                // Lost a race on the same key; hand back the winner.
                let key = order.idempotency_key.as_deref().unwrap_or_default();
                return match self.store.find_by_idempotency_key(key).await {
                    Ok(Some(existing)) => Ok(existing),
                    _ => Err(IntakeError::StoreUnavailable),
                };
            }
            Err(StoreError::Unavailable(e)) => {
                warn!(error = %e, "order insert failed");
                return Err(IntakeError::StoreUnavailable);
            }
        }

        match self.queue.try_enqueue(EngineCommand::Place(order.clone())) {
            Ok(()) => {
                crate::metrics::set_queue_depth(self.queue.depth());
                Ok(order)
            }
            Err(QueueError::Full) => {
                warn!(order_id = %order.id, "command queue full; order stays open for recovery");
                Err(IntakeError::QueueFull)
            }
            Err(QueueError::Closed) => {
                warn!(order_id = %order.id, "command queue closed; engine is down");
                Err(IntakeError::QueueFull)
            }
        }
    }

    /// Request cancellation. Terminal orders are a no-op and return their
    /// current record; live orders get a cancel command enqueued and also
    /// return the current (pre-cancel) record.
    pub async fn cancel_order(&self, order_id: Uuid) -> Result<Order, IntakeError> {
        let order = self
            .store
            .find_by_id(order_id)
            .await
            .map_err(unavailable)?
            .ok_or(IntakeError::NotFound)?;

        if order.status.is_terminal() {
            return Ok(order);
        }

        match self.queue.try_enqueue(EngineCommand::Cancel(order_id)) {
            Ok(()) => Ok(order),
            Err(_) => Err(IntakeError::QueueFull),
        }
    }

    pub fn queue(&self) -> &QueueSender {
        &self.queue
    }
}

fn unavailable(err: StoreError) -> IntakeError {
    warn!(error = %err, "store error during intake");
    IntakeError::StoreUnavailable
}

fn validate(req: &CreateOrderRequest) -> Vec<String> {
    let mut errors = Vec::new();

    if req.client_id.trim().is_empty() {
        errors.push("client_id must not be empty".to_string());
    }
    if req.instrument.trim().is_empty() {
        errors.push("instrument must not be empty".to_string());
    }

    if req.quantity <= Decimal::ZERO {
        errors.push("quantity must be positive".to_string());
    } else if scale_of(req.quantity) > MAX_DECIMAL_SCALE {
        errors.push("quantity scale must be at most 8".to_string());
    }

    match req.order_type {
        OrderType::Limit => match req.price {
            None => errors.push("limit orders require a price".to_string()),
            Some(price) if price <= Decimal::ZERO => {
                errors.push("price must be positive".to_string())
            }
            Some(price) if scale_of(price) > MAX_DECIMAL_SCALE => {
                errors.push("price scale must be at most 8".to_string())
            }
            Some(_) => {}
        },
        OrderType::Market => {
            if req.price.is_some() {
                errors.push("market orders must not carry a price".to_string());
            }
        }
    }

    if let Some(key) = &req.idempotency_key {
        if key.trim().is_empty() {
            errors.push("idempotency_key must not be blank".to_string());
        } else if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
            errors.push("idempotency_key must be at most 128 characters".to_string());
        }
    }

    errors
}

fn scale_of(value: Decimal) -> u32 {
    value.normalize().scale()
}
