//! Post-commit event fan-out.
//!
//! Three independent broadcast channels (trades, order state changes, book
//! deltas). Delivery is best-effort: the engine never blocks on emission,
//! and subscribers that lag the buffer are dropped by the transport layer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;
use tokio::sync::broadcast;

use crate::engine::book::LevelView;
use crate::models::order::datetime_as_millis;
use crate::models::{Order, OrderResponse, Trade, TradeResponse};

/// Top-of-book view broadcast after each mutation, capped to the configured
/// delta depth.
#[derive(Debug, Clone, Serialize)]
pub struct BookDelta {
    pub instrument: String,
    pub bids: Vec<LevelView>,
    pub asks: Vec<LevelView>,
    #[serde(serialize_with = "datetime_as_millis::serialize")]
    pub snapshot_time: DateTime<Utc>,
}

/// Wire event with an `event_type` discriminator.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum StreamEvent {
    Trade(TradeResponse),
    OrderStateChange(OrderResponse),
    OrderbookDelta(BookDelta),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventChannel {
    Trades,
    Orderbook,
    Orders,
}

impl FromStr for EventChannel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trades" => Ok(EventChannel::Trades),
            "orderbook" => Ok(EventChannel::Orderbook),
            "orders" => Ok(EventChannel::Orders),
            _ => Err(()),
        }
    }
}

#[derive(Clone)]
pub struct EventHub {
    trades: broadcast::Sender<StreamEvent>,
    orders: broadcast::Sender<StreamEvent>,
    orderbook: broadcast::Sender<StreamEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (trades, _) = broadcast::channel(capacity);
        let (orders, _) = broadcast::channel(capacity);
        let (orderbook, _) = broadcast::channel(capacity);
        Self {
            trades,
            orders,
            orderbook,
        }
    }

    pub fn subscribe(&self, channel: EventChannel) -> broadcast::Receiver<StreamEvent> {
        match channel {
            EventChannel::Trades => self.trades.subscribe(),
            EventChannel::Orderbook => self.orderbook.subscribe(),
            EventChannel::Orders => self.orders.subscribe(),
        }
    }

    /// Send errors only mean nobody is listening; emission is fire-and-forget.
    pub fn publish_trade(&self, trade: &Trade) {
        let _ = self
            .trades
            .send(StreamEvent::Trade(TradeResponse::from(trade.clone())));
    }

    pub fn publish_order(&self, order: &Order) {
        let _ = self.orders.send(StreamEvent::OrderStateChange(
            OrderResponse::from(order.clone()),
        ));
    }

    pub fn publish_book_delta(&self, delta: BookDelta) {
        let _ = self.orderbook.send(StreamEvent::OrderbookDelta(delta));
    }
}
