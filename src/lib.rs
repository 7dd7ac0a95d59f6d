//! Real-time limit-order matching engine backend.
//!
//! A continuous double-auction market: orders are durably accepted over
//! HTTP, serialized through a bounded command queue, matched by a
//! single-writer engine with price-time priority, persisted
//! transactionally, and fanned out as server-sent events.

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod events;
pub mod intake;
pub mod metrics;
pub mod models;
pub mod store;
pub mod utils;

use crate::config::AppConfig;
use crate::db::Database;
use crate::engine::SnapshotRegistry;
use crate::events::EventHub;
use crate::intake::Intake;
use crate::store::PgOrderStore;

pub struct AppState {
    pub config: AppConfig,
    pub db: Database,
    pub store: Arc<PgOrderStore>,
    pub intake: Intake<PgOrderStore>,
    pub snapshots: SnapshotRegistry,
    pub events: EventHub,
    pub metrics: PrometheusHandle,
}
