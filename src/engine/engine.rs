//! Single-writer matching core.
//!
//! One worker task owns every order book and the resting-order map, and
//! drains the bounded command queue in FIFO order. Each command runs to
//! completion: match in memory, commit trades and order mutations in one
//! store transaction, then emit events and republish the book snapshot.
//! Nothing outside the worker ever mutates a book.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::events::{BookDelta, EventHub};
use crate::metrics;
use crate::models::{Order, OrderSide, OrderStatus, OrderType, Trade};
use crate::store::OrderStore;

use super::book::{OrderBook, SnapshotRegistry};
use super::queue::QueueReceiver;
use super::types::EngineCommand;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Levels per side retained in published snapshots.
    pub snapshot_depth: usize,
    /// Levels per side carried by broadcast deltas.
    pub delta_depth: usize,
    pub commit_retry_initial: Duration,
    pub commit_retry_cap: Duration,
    pub commit_retry_attempts: u32,
    pub pause_initial: Duration,
    pub pause_cap: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snapshot_depth: 1000,
            delta_depth: 20,
            commit_retry_initial: Duration::from_millis(100),
            commit_retry_cap: Duration::from_secs(5),
            commit_retry_attempts: 5,
            pause_initial: Duration::from_secs(1),
            pause_cap: Duration::from_secs(10),
        }
    }
}

pub struct MatchingEngine<S> {
    store: Arc<S>,
    books: HashMap<String, OrderBook>,
    /// Full rows of orders currently present in a book, keyed by id. The
    /// books hold lightweight entries; mutations to order state happen here.
    resting: HashMap<Uuid, Order>,
    snapshots: SnapshotRegistry,
    events: EventHub,
    config: EngineConfig,
}

impl<S: OrderStore> MatchingEngine<S> {
    pub fn new(
        store: Arc<S>,
        snapshots: SnapshotRegistry,
        events: EventHub,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            books: HashMap::new(),
            resting: HashMap::new(),
            snapshots,
            events,
            config,
        }
    }

    pub fn book(&self, instrument: &str) -> Option<&OrderBook> {
        self.books.get(instrument)
    }

    pub fn resting_count(&self) -> usize {
        self.resting.len()
    }

    pub(crate) fn snapshots(&self) -> &SnapshotRegistry {
        &self.snapshots
    }

    pub(crate) fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub(crate) fn books_mut(
        &mut self,
    ) -> (&mut HashMap<String, OrderBook>, &mut HashMap<Uuid, Order>) {
        (&mut self.books, &mut self.resting)
    }

    /// Apply one command to completion. Errors never escape: defensive
    /// failures reject the order, store failures retry until they clear.
    pub async fn process(&mut self, cmd: EngineCommand) {
        let started = Instant::now();
        match cmd {
            EngineCommand::Place(order) => self.handle_place(order).await,
            EngineCommand::Cancel(order_id) => self.handle_cancel(order_id).await,
        }
        metrics::record_command_duration(started.elapsed().as_secs_f64());
    }

    async fn handle_place(&mut self, mut order: Order) {
        if let Err(reason) = validate_place(&order) {
            warn!(order_id = %order.id, %reason, "rejecting order on defensive validation");
            order.status = OrderStatus::Rejected;
            order.updated_at = Utc::now();
            self.commit_with_retry(&[], std::slice::from_ref(&order)).await;
            self.events.publish_order(&order);
            metrics::record_order_rejected();
            return;
        }

        let now = Utc::now();
        let status_before = order.status;
        let limit_price = match order.order_type {
            OrderType::Limit => order.price,
            OrderType::Market => None,
        };

        let (trades, mut updates, rested) = {
            let book = self
                .books
                .entry(order.instrument.clone())
                .or_insert_with(|| OrderBook::new(order.instrument.clone()));

            let (trades, touched) = sweep(book, &mut self.resting, &mut order, limit_price, now);

            let mut rested = false;
            match order.order_type {
                OrderType::Limit => {
                    if order.remaining() > Decimal::ZERO {
                        order.status = if order.filled_quantity > Decimal::ZERO {
                            OrderStatus::PartiallyFilled
                        } else {
                            OrderStatus::Open
                        };
                        book.add_limit(&order);
                        rested = true;
                    } else {
                        order.status = OrderStatus::Filled;
                    }
                }
                OrderType::Market => {
                    if order.remaining() > Decimal::ZERO {
                        // Market orders never rest; the unfilled remainder is
                        // abandoned and the order stays partially_filled.
                        order.status = OrderStatus::PartiallyFilled;
                        if order.filled_quantity.is_zero() {
                            debug!(order_id = %order.id, "market order found no liquidity");
                        } else {
                            warn!(
                                order_id = %order.id,
                                remaining = %order.remaining(),
                                "market order exhausted the book; abandoning remainder"
                            );
                        }
                    } else {
                        order.status = OrderStatus::Filled;
                    }
                }
            }
            (trades, touched, rested)
        };

        let aggressor_changed = !trades.is_empty() || order.status != status_before;
        if aggressor_changed {
            order.updated_at = now;
            updates.push(order.clone());
        }
        if rested {
            self.resting.insert(order.id, order.clone());
        }

        if !trades.is_empty() || !updates.is_empty() {
            self.commit_with_retry(&trades, &updates).await;
        }

        for trade in &trades {
            debug!(
                trade_id = %trade.id,
                instrument = %trade.instrument,
                price = %trade.price,
                quantity = %trade.quantity,
                "trade executed"
            );
            self.events.publish_trade(trade);
            metrics::record_trade_executed();
        }
        for updated in &updates {
            self.events.publish_order(updated);
        }
        if !trades.is_empty() || rested {
            self.publish_book(&order.instrument);
        }
        metrics::record_order_placed(&order.side, &order.order_type);
    }

    async fn handle_cancel(&mut self, order_id: Uuid) {
        let Some(mut order) = self.resting.remove(&order_id) else {
            // Not resting: either unknown or already terminal. Queue FIFO
            // guarantees any cancel racing a fill was sequenced after it.
            match self.store.find_by_id(order_id).await {
                Ok(Some(existing)) => {
                    debug!(order_id = %order_id, status = %existing.status, "cancel is a no-op")
                }
                Ok(None) => warn!(order_id = %order_id, "cancel for unknown order"),
                Err(e) => {
                    warn!(order_id = %order_id, error = %e, "store lookup failed during cancel")
                }
            }
            return;
        };

        if let Some(book) = self.books.get_mut(&order.instrument) {
            book.cancel(order_id);
        }
        order.status = OrderStatus::Cancelled;
        order.updated_at = Utc::now();

        self.commit_with_retry(&[], std::slice::from_ref(&order)).await;
        self.events.publish_order(&order);
        self.publish_book(&order.instrument);
        metrics::record_order_cancelled();
        info!(order_id = %order_id, instrument = %order.instrument, "order cancelled");
    }

    /// Commit one command's writes, retrying transient store failures with
    /// exponential backoff and falling back to a pause loop that holds the
    /// worker until the store recovers. The book has already been mutated,
    /// so dropping the writes is not an option.
    async fn commit_with_retry(&self, trades: &[Trade], orders: &[Order]) {
        if trades.is_empty() && orders.is_empty() {
            return;
        }

        let mut delay = self.config.commit_retry_initial;
        let mut attempt: u32 = 1;
        loop {
            match self.store.commit_execution(trades, orders).await {
                Ok(()) => return,
                Err(e) => {
                    if attempt >= self.config.commit_retry_attempts {
                        warn!(error = %e, attempt, "commit retries exhausted; pausing engine");
                        metrics::record_engine_pause();
                        self.pause_until_committed(trades, orders).await;
                        return;
                    }
                    debug!(error = %e, attempt, "commit failed; backing off");
                    metrics::record_commit_retry();
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.config.commit_retry_cap);
                    attempt += 1;
                }
            }
        }
    }

    async fn pause_until_committed(&self, trades: &[Trade], orders: &[Order]) {
        let mut pause = self.config.pause_initial;
        loop {
            tokio::time::sleep(pause).await;
            match self.store.commit_execution(trades, orders).await {
                Ok(()) => {
                    info!("store recovered; matching resumes");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, pause_secs = pause.as_secs_f64(), "store still unavailable");
                    pause = (pause * 2).min(self.config.pause_cap);
                }
            }
        }
    }

    pub(crate) fn publish_book(&self, instrument: &str) {
        let Some(book) = self.books.get(instrument) else {
            return;
        };
        let snapshot = book.snapshot(self.config.snapshot_depth);
        let delta = BookDelta {
            instrument: snapshot.instrument.clone(),
            bids: snapshot
                .bids
                .iter()
                .take(self.config.delta_depth)
                .cloned()
                .collect(),
            asks: snapshot
                .asks
                .iter()
                .take(self.config.delta_depth)
                .cloned()
                .collect(),
            snapshot_time: snapshot.snapshot_time,
        };
        self.snapshots.publish(snapshot);
        self.events.publish_book_delta(delta);
    }
}

/// Walk the opposite side from the best level inward, filling level heads
/// in FIFO order. `limit_price` of `None` disables the cross check (market
/// orders). Returns the trades produced and the resting orders whose state
/// changed, in match order.
fn sweep(
    book: &mut OrderBook,
    resting: &mut HashMap<Uuid, Order>,
    order: &mut Order,
    limit_price: Option<Decimal>,
    now: DateTime<Utc>,
) -> (Vec<Trade>, Vec<Order>) {
    let opposite = order.side.opposite();
    let mut trades = Vec::new();
    let mut touched = Vec::new();

    while order.remaining() > Decimal::ZERO {
        let Some((level_price, head_id, head_qty)) = book
            .best_level(opposite)
            .and_then(|level| level.head().map(|h| (level.price(), h.order_id, h.remaining_qty)))
        else {
            break;
        };

        if let Some(limit) = limit_price {
            let crossed = match order.side {
                OrderSide::Buy => level_price <= limit,
                OrderSide::Sell => level_price >= limit,
            };
            if !crossed {
                break;
            }
        }

        if !resting.contains_key(&head_id) {
            // Index out of sync with the book; evict the stray entry.
            error!(order_id = %head_id, "book entry without a resting order row; evicting");
            book.cancel(head_id);
            continue;
        }

        let trade_qty = order.remaining().min(head_qty);
        let depleted = trade_qty == head_qty;

        let (buy_order_id, sell_order_id) = match order.side {
            OrderSide::Buy => (order.id, head_id),
            OrderSide::Sell => (head_id, order.id),
        };
        trades.push(Trade {
            id: Uuid::new_v4(),
            buy_order_id,
            sell_order_id,
            instrument: order.instrument.clone(),
            price: level_price,
            quantity: trade_qty,
            executed_at: now,
        });

        order.filled_quantity += trade_qty;
        if let Some(resting_order) = resting.get_mut(&head_id) {
            resting_order.filled_quantity += trade_qty;
            resting_order.updated_at = now;
            resting_order.status = if depleted {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
            touched.push(resting_order.clone());
        }
        if depleted {
            resting.remove(&head_id);
        }
        if book.fill_best(opposite, trade_qty).is_none() {
            error!(instrument = %order.instrument, "best level vanished mid-sweep");
            break;
        }
    }

    (trades, touched)
}

fn validate_place(order: &Order) -> Result<(), String> {
    if order.instrument.trim().is_empty() {
        return Err("instrument is empty".to_string());
    }
    if order.quantity <= Decimal::ZERO {
        return Err("quantity must be positive".to_string());
    }
    if order.order_type == OrderType::Limit {
        match order.price {
            Some(price) if price > Decimal::ZERO => {}
            _ => return Err("limit order requires a positive price".to_string()),
        }
    }
    Ok(())
}

/// Running worker: consume commands until shutdown or queue closure.
pub struct EngineHandle {
    stop: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

impl EngineHandle {
    /// Start the single consumer of the command queue.
    pub fn spawn<S: OrderStore>(mut engine: MatchingEngine<S>, mut receiver: QueueReceiver) -> Self {
        let (stop, mut stop_rx) = watch::channel(false);
        let worker = tokio::spawn(async move {
            info!("matching worker running");
            loop {
                tokio::select! {
                    biased;
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    cmd = receiver.recv() => {
                        match cmd {
                            Some(cmd) => engine.process(cmd).await,
                            None => break,
                        }
                    }
                }
            }
            info!("matching worker stopped");
        });
        Self { stop, worker }
    }

    /// Signal the worker and wait up to five seconds for the in-flight
    /// command to finish before aborting. Commands still queued are lost;
    /// their rows remain open and re-enter the books through recovery.
    pub async fn shutdown(mut self) {
        let _ = self.stop.send(true);
        match tokio::time::timeout(Duration::from_secs(5), &mut self.worker).await {
            Ok(_) => {}
            Err(_) => {
                warn!("matching worker did not stop in time; aborting");
                self.worker.abort();
            }
        }
    }
}
