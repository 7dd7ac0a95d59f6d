//! Market data handlers: book snapshots and recent trades.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::engine::BookSnapshot;
use crate::models::TradeResponse;
use crate::store::OrderStore;
use crate::utils::AppError;
use crate::AppState;

const DEFAULT_BOOK_LEVELS: usize = 20;
const MAX_BOOK_LEVELS: usize = 1000;
const DEFAULT_TRADE_LIMIT: i64 = 100;
const MAX_TRADE_LIMIT: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct OrderbookQuery {
    pub instrument: String,
    pub levels: Option<usize>,
}

/// Get the order book snapshot for an instrument
/// GET /orderbook?instrument=X&levels=N
pub async fn get_orderbook(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OrderbookQuery>,
) -> Result<Json<BookSnapshot>, AppError> {
    if query.instrument.trim().is_empty() {
        return Err(AppError::bad_request("instrument must not be empty"));
    }
    let levels = query.levels.unwrap_or(DEFAULT_BOOK_LEVELS);
    if levels == 0 || levels > MAX_BOOK_LEVELS {
        return Err(AppError::bad_request("levels must be between 1 and 1000"));
    }

    // Readers may lag the writer by at most one command; that is the
    // contract of the published snapshot.
    let snapshot = state
        .snapshots
        .get(&query.instrument)
        .map(|s| s.truncated(levels))
        .unwrap_or_else(|| BookSnapshot::empty(query.instrument.clone()));

    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
pub struct TradesQuery {
    pub limit: Option<i64>,
}

/// Get recent trades, newest first
/// GET /trades?limit=N
pub async fn get_trades(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TradesQuery>,
) -> Result<Json<Vec<TradeResponse>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_TRADE_LIMIT);
    if limit <= 0 || limit > MAX_TRADE_LIMIT {
        return Err(AppError::bad_request("limit must be between 1 and 1000"));
    }

    let trades = state.store.recent_trades(limit).await.map_err(|e| {
        tracing::error!("Failed to fetch trades: {}", e);
        AppError::store_unavailable()
    })?;

    Ok(Json(trades.into_iter().map(TradeResponse::from).collect()))
}
