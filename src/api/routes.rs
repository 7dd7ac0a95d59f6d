use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::api::handlers;
use crate::AppState;

pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        // Orders
        .route("/orders", post(handlers::order::create_order))
        .route("/orders/:order_id", get(handlers::order::get_order))
        .route("/orders/:order_id/cancel", post(handlers::order::cancel_order))
        // Market data
        .route("/orderbook", get(handlers::market::get_orderbook))
        .route("/trades", get(handlers::market::get_trades))
        // Event streams
        .route("/events/:channel", get(handlers::events::subscribe))
        // Operations
        .route("/healthz", get(handlers::health::healthz))
        .route("/metrics", get(handlers::health::metrics))
}
