//! Per-instrument limit order book.
//!
//! Bids and asks are ordered maps from price key to [`PriceLevel`]; bids are
//! walked highest-first, asks lowest-first. The book is owned exclusively by
//! the matching worker; other threads only ever see published snapshots.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::order::datetime_as_millis;
use crate::models::{Order, OrderSide};

use super::price_level::{BookEntry, PriceLevel};
use super::types::PriceKey;

/// Result of filling the head of a best level.
#[derive(Debug, Clone, Copy)]
pub struct HeadFill {
    pub order_id: Uuid,
    /// True when the head entry was depleted and left the book.
    pub removed: bool,
}

pub struct OrderBook {
    instrument: String,
    bids: BTreeMap<PriceKey, PriceLevel>,
    asks: BTreeMap<PriceKey, PriceLevel>,
    /// Order id -> location. `None` marks a market entry that never rests
    /// at a level (registered via `add_market`).
    by_id: HashMap<Uuid, Option<(OrderSide, PriceKey)>>,
}

impl OrderBook {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            by_id: HashMap::new(),
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn contains(&self, order_id: Uuid) -> bool {
        self.by_id.contains_key(&order_id)
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Rest a limit order at its price, creating the level if absent.
    /// Returns false (and leaves the book untouched) for duplicate ids or a
    /// missing price.
    pub fn add_limit(&mut self, order: &Order) -> bool {
        let Some(price) = order.price else {
            return false;
        };
        if self.by_id.contains_key(&order.id) {
            return false;
        }

        let key = PriceKey::from_decimal(price);
        let entry = BookEntry {
            order_id: order.id,
            client_id: order.client_id.clone(),
            price: Some(price),
            remaining_qty: order.remaining(),
            created_at: order.created_at,
        };

        self.side_mut(order.side)
            .entry(key)
            .or_insert_with(|| PriceLevel::new(price))
            .push_back(entry);
        self.by_id.insert(order.id, Some((order.side, key)));
        true
    }

    /// Register a market order in the id index only; it never occupies a
    /// price level.
    pub fn add_market(&mut self, order: &Order) {
        self.by_id.insert(order.id, None);
    }

    /// Remove an order from the book. True when the id was known.
    pub fn cancel(&mut self, order_id: Uuid) -> bool {
        let Some(location) = self.by_id.remove(&order_id) else {
            return false;
        };
        if let Some((side, key)) = location {
            if let Some(level) = self.side_mut(side).get_mut(&key) {
                level.remove(order_id);
                if level.is_empty() {
                    self.side_mut(side).remove(&key);
                }
            }
        }
        true
    }

    /// Best (highest) bid level.
    pub fn best_bid_level(&self) -> Option<&PriceLevel> {
        self.bids.values().next_back()
    }

    /// Best (lowest) ask level.
    pub fn best_ask_level(&self) -> Option<&PriceLevel> {
        self.asks.values().next()
    }

    pub fn best_level(&self, side: OrderSide) -> Option<&PriceLevel> {
        match side {
            OrderSide::Buy => self.best_bid_level(),
            OrderSide::Sell => self.best_ask_level(),
        }
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.best_bid_level().map(|l| l.price())
    }

    /// Levels on one side in matching-priority order (best first).
    pub fn levels(&self, side: OrderSide) -> Vec<&PriceLevel> {
        match side {
            OrderSide::Buy => self.bids.values().rev().collect(),
            OrderSide::Sell => self.asks.values().collect(),
        }
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.best_ask_level().map(|l| l.price())
    }

    /// Fill the head of the best level on `side` by `qty`, dropping the
    /// entry and the level as they deplete.
    pub fn fill_best(&mut self, side: OrderSide, qty: Decimal) -> Option<HeadFill> {
        let key = match side {
            OrderSide::Buy => *self.bids.keys().next_back()?,
            OrderSide::Sell => *self.asks.keys().next()?,
        };
        let level = self.side_mut(side).get_mut(&key)?;
        let order_id = level.head()?.order_id;

        let removed = level.fill_head(qty).is_some();
        if level.is_empty() {
            self.side_mut(side).remove(&key);
        }
        if removed {
            self.by_id.remove(&order_id);
        }
        Some(HeadFill { order_id, removed })
    }

    /// Immutable view of the top `depth` levels per side.
    pub fn snapshot(&self, depth: usize) -> BookSnapshot {
        let bids = self
            .bids
            .values()
            .rev()
            .take(depth)
            .map(LevelView::from)
            .collect();
        let asks = self.asks.values().take(depth).map(LevelView::from).collect();
        BookSnapshot {
            instrument: self.instrument.clone(),
            bids,
            asks,
            snapshot_time: Utc::now(),
        }
    }

    fn side_mut(&mut self, side: OrderSide) -> &mut BTreeMap<PriceKey, PriceLevel> {
        match side {
            OrderSide::Buy => &mut self.bids,
            OrderSide::Sell => &mut self.asks,
        }
    }
}

/// One aggregated level in a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct LevelView {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl From<&PriceLevel> for LevelView {
    fn from(level: &PriceLevel) -> Self {
        Self {
            price: level.price(),
            quantity: level.total_qty(),
        }
    }
}

/// Immutable book view published after each mutation.
#[derive(Debug, Clone, Serialize)]
pub struct BookSnapshot {
    pub instrument: String,
    pub bids: Vec<LevelView>,
    pub asks: Vec<LevelView>,
    #[serde(serialize_with = "datetime_as_millis::serialize")]
    pub snapshot_time: DateTime<Utc>,
}

impl BookSnapshot {
    pub fn empty(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            bids: Vec::new(),
            asks: Vec::new(),
            snapshot_time: Utc::now(),
        }
    }

    /// A copy truncated to `depth` levels per side.
    pub fn truncated(&self, depth: usize) -> BookSnapshot {
        BookSnapshot {
            instrument: self.instrument.clone(),
            bids: self.bids.iter().take(depth).cloned().collect(),
            asks: self.asks.iter().take(depth).cloned().collect(),
            snapshot_time: self.snapshot_time,
        }
    }
}

/// Cross-thread registry of the most recently published snapshot per
/// instrument. The worker replaces entries wholesale; readers clone the Arc
/// and never synchronize with the writer.
#[derive(Clone, Default)]
pub struct SnapshotRegistry {
    inner: Arc<DashMap<String, Arc<BookSnapshot>>>,
}

impl SnapshotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: BookSnapshot) {
        self.inner
            .insert(snapshot.instrument.clone(), Arc::new(snapshot));
    }

    pub fn get(&self, instrument: &str) -> Option<Arc<BookSnapshot>> {
        self.inner.get(instrument).map(|s| Arc::clone(s.value()))
    }
}
