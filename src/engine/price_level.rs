//! A single price level: FIFO queue of resting entries plus a running total.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use uuid::Uuid;

/// A resting order's footprint in the book. The full order row lives in the
/// engine's resting map; the entry carries only what matching needs.
#[derive(Debug, Clone)]
pub struct BookEntry {
    pub order_id: Uuid,
    pub client_id: String,
    pub price: Option<Decimal>,
    pub remaining_qty: Decimal,
    pub created_at: DateTime<Utc>,
}

/// FIFO queue of entries at one price. `total_qty` is maintained
/// incrementally and always equals the sum of entry remainders.
#[derive(Debug)]
pub struct PriceLevel {
    price: Decimal,
    total_qty: Decimal,
    entries: VecDeque<BookEntry>,
}

impl PriceLevel {
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            total_qty: Decimal::ZERO,
            entries: VecDeque::new(),
        }
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn total_qty(&self) -> Decimal {
        self.total_qty
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry, preserving arrival order.
    pub fn push_back(&mut self, entry: BookEntry) {
        self.total_qty += entry.remaining_qty;
        self.entries.push_back(entry);
    }

    /// Oldest entry at this level, without removing it.
    pub fn head(&self) -> Option<&BookEntry> {
        self.entries.front()
    }

    /// Remove an entry by order id (cancellation path). Linear in the number
    /// of entries at the level.
    pub fn remove(&mut self, order_id: Uuid) -> Option<BookEntry> {
        let pos = self.entries.iter().position(|e| e.order_id == order_id)?;
        let entry = self.entries.remove(pos)?;
        self.total_qty -= entry.remaining_qty;
        Some(entry)
    }

    /// Reduce the head entry by `qty` after a partial or full fill. Returns
    /// the removed entry when the head is depleted, `None` while it still
    /// has quantity remaining.
    pub fn fill_head(&mut self, qty: Decimal) -> Option<BookEntry> {
        let head = self.entries.front_mut()?;
        debug_assert!(qty <= head.remaining_qty);
        head.remaining_qty -= qty;
        self.total_qty -= qty;
        if head.remaining_qty.is_zero() {
            self.entries.pop_front()
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &BookEntry> {
        self.entries.iter()
    }
}
