//! Order API handlers: accept, cancel, fetch.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::intake::IntakeError;
use crate::models::{CreateOrderRequest, OrderResponse};
use crate::store::OrderStore;
use crate::utils::AppError;
use crate::AppState;

/// Create a new order
/// POST /orders
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    let order = state
        .intake
        .place_order(req)
        .await
        .map_err(map_intake_error)?;

    // Replayed idempotency keys also answer 201 with the original record.
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// Request cancellation of an order
/// POST /orders/:order_id/cancel
///
/// Terminal orders are a silent no-op; the current record is returned
/// either way.
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .intake
        .cancel_order(order_id)
        .await
        .map_err(map_intake_error)?;
    Ok(Json(order.into()))
}

/// Get a single order by ID
/// GET /orders/:order_id
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state
        .store
        .find_by_id(order_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch order: {}", e);
            AppError::store_unavailable()
        })?
        .ok_or_else(|| AppError::not_found("order not found"))?;

    Ok(Json(order.into()))
}

fn map_intake_error(err: IntakeError) -> AppError {
    match err {
        IntakeError::Validation(errors) => AppError::validation(errors),
        IntakeError::StoreUnavailable => AppError::store_unavailable(),
        IntakeError::QueueFull => AppError::queue_full(),
        IntakeError::NotFound => AppError::not_found("order not found"),
    }
}
