//! Server-sent event streams for trades, order state changes, and book
//! deltas.

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::events::EventChannel;
use crate::utils::AppError;
use crate::AppState;

/// Subscribe to an event channel
/// GET /events/:channel  (channel = trades | orderbook | orders)
///
/// Delivery is best-effort: subscribers that fall behind the broadcast
/// buffer are disconnected rather than replayed.
pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let channel: EventChannel = channel
        .parse()
        .map_err(|_| AppError::not_found("unknown event channel"))?;

    let receiver = state.events.subscribe(channel);
    let stream = futures::stream::unfold(receiver, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => match Event::default().json_data(&event) {
                    Ok(sse_event) => return Some((Ok::<_, Infallible>(sse_event), rx)),
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to serialize stream event");
                        continue;
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "dropping lagged event subscriber");
                    return None;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
