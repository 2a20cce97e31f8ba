//! WebSocket handlers for real-time seating notifications
//!
//! - `/ws/events` streams every [`SeatingEvent`](crate::events::SeatingEvent), optionally filtered by
//!   owning event and entity type.
//! - `/ws/events/{event_id}/optimize/{job_id}` follows one optimization job:
//!   `progress` messages while it runs, then a single `complete` (with the
//!   stored candidates) or `error` message before the server closes.

use super::handlers::{AppError, AppState};
use crate::events::EventFilter;
use crate::jobs::{JobState, JobStatus};
use crate::service::SeatingService;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration};
use tracing::{debug, warn};
use uuid::Uuid;

const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Query parameters for filtering WebSocket events
#[derive(Debug, Deserialize, Default)]
pub struct WsQuery {
    /// Comma-separated entity types to subscribe to (e.g. "arrangement,job")
    pub entity_types: Option<String>,
    /// Only events of this seating event
    pub event_id: Option<Uuid>,
}

/// WebSocket upgrade handler for `/ws/events`
pub async fn ws_events(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let filter = query.filter();
    ws.on_upgrade(move |socket| handle_ws(socket, state, filter))
}

impl WsQuery {
    fn filter(&self) -> EventFilter {
        let filter = EventFilter {
            event_id: self.event_id,
            entity_types: None,
        };
        match self.entity_types.as_deref() {
            Some(list) => filter.with_entity_list(list),
            None => filter,
        }
    }
}

/// Handle an individual WebSocket connection
async fn handle_ws(socket: WebSocket, state: AppState, filter: EventFilter) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    debug!(filter = ?filter, "WebSocket events client connected");
    let mut events = state.service.bus().subscribe_filtered(filter);

    let mut ping_interval = interval(PING_INTERVAL);
    // Skip the first immediate tick
    ping_interval.tick().await;

    loop {
        tokio::select! {
            result = events.recv() => {
                match result {
                    Ok(event) => {
                        match serde_json::to_string(&event) {
                            Ok(json) => {
                                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                                    debug!("WebSocket send failed, client disconnected");
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!("Failed to serialize SeatingEvent: {}", e);
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "WebSocket client lagged, skipping events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        debug!("Event bus closed, shutting down WebSocket");
                        break;
                    }
                }
            }

            _ = ping_interval.tick() => {
                if ws_sender.send(Message::Ping(vec![].into())).await.is_err() {
                    debug!("Ping failed, client disconnected");
                    break;
                }
            }

            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                    // Pong and client text are ignored
                    _ => {}
                }
            }
        }
    }

    debug!("WebSocket connection closed");
}

// ============================================================================
// Per-job progress
// ============================================================================

/// WebSocket upgrade handler for `/ws/events/{event_id}/optimize/{job_id}`.
/// Unknown jobs are rejected before the upgrade.
pub async fn ws_job_progress(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path((event_id, job_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    state.service.event_job_status(event_id, job_id).await?;
    let rx = state.service.subscribe_job(job_id).await?;
    let service = Arc::clone(&state.service);
    Ok(ws.on_upgrade(move |socket| handle_job_ws(socket, service, job_id, rx)))
}

/// Progress message for a running job, or the terminal message.
async fn job_message(service: &SeatingService, status: &JobStatus) -> serde_json::Value {
    match status.state {
        JobState::Complete | JobState::Cancelled => {
            let arrangements = service.job_result(status.job_id).await.unwrap_or_default();
            serde_json::json!({
                "type": "complete",
                "status": status,
                "arrangements": arrangements,
            })
        }
        JobState::Failed => serde_json::json!({
            "type": "error",
            "status": status,
            "error": status.error.clone().unwrap_or_else(|| status.message.clone()),
        }),
        JobState::Idle | JobState::Running => serde_json::json!({
            "type": "progress",
            "status": status,
        }),
    }
}

async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    value: &serde_json::Value,
) -> bool {
    sender
        .send(Message::Text(value.to_string().into()))
        .await
        .is_ok()
}

async fn handle_job_ws(
    socket: WebSocket,
    service: Arc<SeatingService>,
    job_id: Uuid,
    mut rx: watch::Receiver<JobStatus>,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut ping_interval = interval(PING_INTERVAL);
    ping_interval.tick().await;
    debug!(%job_id, "Job progress client connected");

    loop {
        let status = rx.borrow_and_update().clone();
        let message = job_message(&service, &status).await;
        if !send_json(&mut ws_sender, &message).await {
            debug!(%job_id, "Job progress client disconnected");
            return;
        }
        if status.state.is_finished() {
            break;
        }

        let mut closed = false;
        loop {
            tokio::select! {
                changed = rx.changed() => {
                    // A dropped sender means the job record is gone; report the last state
                    if changed.is_err() {
                        closed = true;
                    }
                    break;
                }
                _ = ping_interval.tick() => {
                    if ws_sender.send(Message::Ping(vec![].into())).await.is_err() {
                        return;
                    }
                }
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                            debug!(%job_id, "Job progress client left");
                            return;
                        }
                        _ => {}
                    }
                }
            }
        }
        if closed {
            let status = rx.borrow().clone();
            let message = job_message(&service, &status).await;
            send_json(&mut ws_sender, &message).await;
            break;
        }
    }

    let _ = ws_sender.send(Message::Close(None)).await;
    debug!(%job_id, "Job progress stream finished");
}
