//! Matching engine internal types.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use uuid::Uuid;

use crate::models::Order;

const PRICE_SCALE: i64 = 100_000_000;

/// Map key for price levels: price scaled to 8 decimal places for exact
/// ordering and equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PriceKey(i64);

impl PriceKey {
    /// Build a key from a Decimal price. Prices are validated upstream to
    /// scale <= 8 and to fit NUMERIC(18,8), so the scaled value fits i64.
    pub fn from_decimal(price: Decimal) -> Self {
        let scaled = (price * Decimal::from(PRICE_SCALE)).trunc();
        PriceKey(scaled.to_i64().unwrap_or(i64::MAX))
    }

    pub fn to_decimal(&self) -> Decimal {
        Decimal::from(self.0) / Decimal::from(PRICE_SCALE)
    }

    pub fn raw(&self) -> i64 {
        self.0
    }
}

impl Ord for PriceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for PriceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Commands consumed by the matching worker. The order in a `Place` has
/// already been persisted with status `Open` by intake.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    Place(Order),
    Cancel(Uuid),
}
