//! Health and metrics endpoints.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct QueueHealth {
    pub depth: usize,
    pub capacity: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub queue: QueueHealth,
}

/// GET /healthz
pub async fn healthz(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let database_up = state.db.ping().await;
    let queue = QueueHealth {
        depth: state.intake.queue().depth(),
        capacity: state.intake.queue().capacity(),
    };

    let body = HealthResponse {
        status: if database_up { "UP" } else { "DOWN" },
        database: if database_up { "UP" } else { "DOWN" },
        queue,
    };

    if database_up {
        Ok(Json(body))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(body)))
    }
}

/// GET /metrics
pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics.render()
}
