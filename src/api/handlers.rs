//! API request handlers

use crate::arrangement::{
    Arrangement, ArrangementDiff, ArrangementStatus, Comparison, GuestMatch, StoreError, Table,
    TableId, TableSeating,
};
use crate::constraints::Violation;
use crate::export::EventDocument;
use crate::graph::{GraphError, Guest, GuestAttributes, GuestId, Relationship, RelationshipSummary};
use crate::jobs::{JobError, JobStatus};
use crate::scoring::ScoreSettings;
use crate::service::{
    CreateArrangementRequest, CreateEventRequest, EventSummary, Neighbor, NewGuest,
    OptimizeRequest, RelationshipInput, ScoreReport, ScoreRequest, SeatingService, ServiceError,
};
use crate::suggest::SuggestionOutcome;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Shared server state
pub struct ServerState {
    pub service: Arc<SeatingService>,
}

pub type AppState = Arc<ServerState>;

// ============================================================================
// Health check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub events: usize,
    pub suggestions: bool,
    pub subscribers: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        events: state.service.list_events().await.len(),
        suggestions: state.service.has_suggester(),
        subscribers: state.service.bus().subscriber_count(),
    })
}

// ============================================================================
// Events
// ============================================================================

pub async fn list_events(State(state): State<AppState>) -> Json<Vec<EventSummary>> {
    Json(state.service.list_events().await)
}

pub async fn create_event(
    State(state): State<AppState>,
    Json(req): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<EventSummary>), AppError> {
    let summary = state.service.create_event(req).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<EventSummary>, AppError> {
    Ok(Json(state.service.event_summary(event_id).await?))
}

pub async fn delete_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.service.delete_event(event_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_settings(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(settings): Json<ScoreSettings>,
) -> Result<Json<EventSummary>, AppError> {
    Ok(Json(state.service.update_settings(event_id, settings).await?))
}

pub async fn set_tables(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(tables): Json<Vec<Table>>,
) -> Result<Json<EventSummary>, AppError> {
    Ok(Json(state.service.set_tables(event_id, tables).await?))
}

pub async fn export_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<EventDocument>, AppError> {
    Ok(Json(state.service.export_event(event_id).await?))
}

pub async fn import_event(
    State(state): State<AppState>,
    Json(document): Json<EventDocument>,
) -> Result<(StatusCode, Json<EventSummary>), AppError> {
    let summary = state.service.import_event(document).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

// ============================================================================
// Guests
// ============================================================================

pub async fn list_guests(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<Vec<Guest>>, AppError> {
    Ok(Json(state.service.list_guests(event_id).await?))
}

pub async fn add_guest(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(req): Json<NewGuest>,
) -> Result<(StatusCode, Json<Guest>), AppError> {
    let guest = state.service.add_guest(event_id, req).await?;
    Ok((StatusCode::CREATED, Json(guest)))
}

pub async fn get_guest(
    State(state): State<AppState>,
    Path((event_id, guest_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Guest>, AppError> {
    Ok(Json(state.service.get_guest(event_id, guest_id).await?))
}

pub async fn update_guest_attributes(
    State(state): State<AppState>,
    Path((event_id, guest_id)): Path<(Uuid, Uuid)>,
    Json(attributes): Json<GuestAttributes>,
) -> Result<Json<Guest>, AppError> {
    Ok(Json(
        state
            .service
            .update_guest_attributes(event_id, guest_id, attributes)
            .await?,
    ))
}

pub async fn remove_guest(
    State(state): State<AppState>,
    Path((event_id, guest_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    state.service.remove_guest(event_id, guest_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn guest_neighbors(
    State(state): State<AppState>,
    Path((event_id, guest_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<Neighbor>>, AppError> {
    Ok(Json(state.service.neighbors(event_id, guest_id).await?))
}

pub async fn guest_conflicts(
    State(state): State<AppState>,
    Path((event_id, guest_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<GuestId>>, AppError> {
    Ok(Json(state.service.conflicts_of(event_id, guest_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct FindGuestQuery {
    pub q: String,
}

/// Where a guest (by name fragment) sits in every arrangement
pub async fn find_guest(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Query(query): Query<FindGuestQuery>,
) -> Result<Json<Vec<GuestMatch>>, AppError> {
    Ok(Json(state.service.find_guest(event_id, &query.q).await?))
}

#[derive(Debug, Deserialize)]
pub struct SuggestRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SuggestResponse {
    pub outcomes: Vec<SuggestionOutcome>,
}

/// Derive relationships for a guest from free-text survey answers
pub async fn suggest_relationships(
    State(state): State<AppState>,
    Path((event_id, guest_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<SuggestRequest>,
) -> Result<Json<SuggestResponse>, AppError> {
    let outcomes = state
        .service
        .suggest_relationships(event_id, guest_id, &req.text)
        .await?;
    Ok(Json(SuggestResponse { outcomes }))
}

// ============================================================================
// Relationships
// ============================================================================

pub async fn list_relationships(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<Vec<Relationship>>, AppError> {
    Ok(Json(state.service.list_relationships(event_id).await?))
}

pub async fn upsert_relationship(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(input): Json<RelationshipInput>,
) -> Result<Json<Relationship>, AppError> {
    Ok(Json(state.service.upsert_relationship(event_id, input).await?))
}

pub async fn remove_relationship(
    State(state): State<AppState>,
    Path((event_id, a, b)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    state.service.remove_relationship(event_id, a, b).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn relationship_summary(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<RelationshipSummary>, AppError> {
    Ok(Json(state.service.relationship_summary(event_id).await?))
}

// ============================================================================
// Arrangements
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ArrangementQuery {
    pub status: Option<ArrangementStatus>,
}

pub async fn list_arrangements(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Query(query): Query<ArrangementQuery>,
) -> Result<Json<Vec<Arrangement>>, AppError> {
    Ok(Json(
        state
            .service
            .list_arrangements(event_id, query.status)
            .await?,
    ))
}

pub async fn create_arrangement(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(req): Json<CreateArrangementRequest>,
) -> Result<(StatusCode, Json<Arrangement>), AppError> {
    let arrangement = state.service.create_arrangement(event_id, req).await?;
    Ok((StatusCode::CREATED, Json(arrangement)))
}

pub async fn get_arrangement(
    State(state): State<AppState>,
    Path((event_id, arrangement_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Arrangement>, AppError> {
    Ok(Json(
        state
            .service
            .get_arrangement(event_id, arrangement_id)
            .await?,
    ))
}

pub async fn delete_arrangement(
    State(state): State<AppState>,
    Path((event_id, arrangement_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    state
        .service
        .delete_arrangement(event_id, arrangement_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

pub async fn rename_arrangement(
    State(state): State<AppState>,
    Path((event_id, arrangement_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<Arrangement>, AppError> {
    Ok(Json(
        state
            .service
            .rename_arrangement(event_id, arrangement_id, &req.name)
            .await?,
    ))
}

pub async fn save_arrangement(
    State(state): State<AppState>,
    Path((event_id, arrangement_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Arrangement>, AppError> {
    Ok(Json(
        state
            .service
            .save_arrangement(event_id, arrangement_id)
            .await?,
    ))
}

pub async fn set_current(
    State(state): State<AppState>,
    Path((event_id, arrangement_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Arrangement>, AppError> {
    Ok(Json(
        state.service.set_current(event_id, arrangement_id).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub guest: GuestId,
    pub table: TableId,
}

pub async fn assign_guest(
    State(state): State<AppState>,
    Path((event_id, arrangement_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<AssignRequest>,
) -> Result<Json<Arrangement>, AppError> {
    Ok(Json(
        state
            .service
            .assign(event_id, arrangement_id, req.guest, req.table)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct UnassignRequest {
    pub guest: GuestId,
}

pub async fn unassign_guest(
    State(state): State<AppState>,
    Path((event_id, arrangement_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UnassignRequest>,
) -> Result<Json<Arrangement>, AppError> {
    Ok(Json(
        state
            .service
            .unassign(event_id, arrangement_id, req.guest)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct SwapRequest {
    pub a: GuestId,
    pub b: GuestId,
}

pub async fn swap_guests(
    State(state): State<AppState>,
    Path((event_id, arrangement_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<SwapRequest>,
) -> Result<Json<Arrangement>, AppError> {
    Ok(Json(
        state
            .service
            .swap(event_id, arrangement_id, req.a, req.b)
            .await?,
    ))
}

/// Replace the whole seating with a table → guests view (drag and drop saves)
pub async fn replace_seating(
    State(state): State<AppState>,
    Path((event_id, arrangement_id)): Path<(Uuid, Uuid)>,
    Json(seating): Json<Vec<TableSeating>>,
) -> Result<Json<Arrangement>, AppError> {
    Ok(Json(
        state
            .service
            .replace_seating(event_id, arrangement_id, seating)
            .await?,
    ))
}

pub async fn clear_arrangement(
    State(state): State<AppState>,
    Path((event_id, arrangement_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Arrangement>, AppError> {
    Ok(Json(
        state
            .service
            .clear_arrangement(event_id, arrangement_id)
            .await?,
    ))
}

pub async fn unassigned_guests(
    State(state): State<AppState>,
    Path((event_id, arrangement_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<Guest>>, AppError> {
    Ok(Json(
        state
            .service
            .unassigned_guests(event_id, arrangement_id)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct DiffQuery {
    pub a: Uuid,
    pub b: Uuid,
}

pub async fn diff_arrangements(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Query(query): Query<DiffQuery>,
) -> Result<Json<ArrangementDiff>, AppError> {
    Ok(Json(state.service.diff(event_id, query.a, query.b).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct CompareQuery {
    /// Comma-separated arrangement ids; all arrangements when absent
    pub ids: Option<String>,
}

impl CompareQuery {
    fn parse_ids(&self) -> Result<Vec<Uuid>, AppError> {
        let Some(raw) = &self.ids else {
            return Ok(Vec::new());
        };
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<Uuid>()
                    .map_err(|_| AppError::BadRequest(format!("invalid arrangement id: {}", s)))
            })
            .collect()
    }
}

pub async fn compare_arrangements(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Query(query): Query<CompareQuery>,
) -> Result<Json<Comparison>, AppError> {
    let ids = query.parse_ids()?;
    Ok(Json(state.service.compare(event_id, &ids).await?))
}

/// Score an assignment without storing it
pub async fn score_arrangement(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(req): Json<ScoreRequest>,
) -> Result<Json<ScoreReport>, AppError> {
    Ok(Json(state.service.score_adhoc(event_id, req).await?))
}

// ============================================================================
// Optimization jobs
// ============================================================================

pub async fn start_optimization(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(req): Json<OptimizeRequest>,
) -> Result<(StatusCode, Json<JobStatus>), AppError> {
    let status = state.service.start_optimization(event_id, req).await?;
    Ok((StatusCode::ACCEPTED, Json(status)))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<Vec<JobStatus>>, AppError> {
    Ok(Json(state.service.list_jobs(event_id).await?))
}

pub async fn job_status(
    State(state): State<AppState>,
    Path((event_id, job_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<JobStatus>, AppError> {
    Ok(Json(
        state.service.event_job_status(event_id, job_id).await?,
    ))
}

pub async fn job_results(
    State(state): State<AppState>,
    Path((event_id, job_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<Arrangement>>, AppError> {
    state.service.event_job_status(event_id, job_id).await?;
    Ok(Json(state.service.job_result(job_id).await?))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path((event_id, job_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<JobStatus>, AppError> {
    state.service.event_job_status(event_id, job_id).await?;
    Ok(Json(state.service.cancel_job(job_id).await?))
}

// ============================================================================
// Error handling
// ============================================================================

/// Application error type
#[derive(Debug)]
pub enum AppError {
    Internal(anyhow::Error),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    /// A seating edit that would break a hard constraint
    Rejected {
        message: String,
        violations: Vec<Violation>,
    },
    Unavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message, violations) = match self {
            AppError::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e), None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
            AppError::Rejected {
                message,
                violations,
            } => (StatusCode::UNPROCESSABLE_ENTITY, message, Some(violations)),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg, None),
        };

        let body = match violations {
            Some(violations) => Json(serde_json::json!({
                "error": message,
                "violations": violations,
            })),
            None => Json(serde_json::json!({
                "error": message
            })),
        };

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::EventNotFound(_)
            | ServiceError::RelationshipNotFound(..)
            | ServiceError::Graph(GraphError::UnknownGuest(_))
            | ServiceError::Store(StoreError::NotFound(_))
            | ServiceError::Job(JobError::NotFound(_)) => AppError::NotFound(message),
            ServiceError::EventExists(_)
            | ServiceError::Store(StoreError::AlreadyExists(_))
            | ServiceError::Job(
                JobError::JobAlreadyRunning(_) | JobError::NotFinished(_) | JobError::Cancelled(_),
            ) => AppError::Conflict(message),
            ServiceError::Store(StoreError::Rejected(violations)) => AppError::Rejected {
                message,
                violations,
            },
            ServiceError::Job(JobError::Failed(_)) => AppError::Rejected {
                message,
                violations: Vec::new(),
            },
            ServiceError::SuggestionsUnavailable => AppError::Unavailable(message),
            ServiceError::Internal(e) => AppError::Internal(e),
            ServiceError::Invalid(_)
            | ServiceError::Graph(_)
            | ServiceError::Store(_)
            | ServiceError::Optimize(_)
            | ServiceError::Import(_) => AppError::BadRequest(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::OptimizeError;

    fn status_of(err: ServiceError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_service_errors_map_to_status_codes() {
        let id = Uuid::new_v4();
        assert_eq!(status_of(ServiceError::EventNotFound(id)), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(ServiceError::Graph(GraphError::UnknownGuest(id))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ServiceError::Graph(GraphError::DuplicateGuest(id))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ServiceError::Job(JobError::JobAlreadyRunning(id))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ServiceError::Optimize(OptimizeError::InsufficientCapacity {
                capacity: 8,
                guests: 10
            })),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ServiceError::SuggestionsUnavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_rejected_edit_lists_violations() {
        let guest = Uuid::new_v4();
        let err = ServiceError::Store(StoreError::Rejected(vec![Violation::UnknownGuest { guest }]));
        let resp = AppError::from(err).into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("edit rejected"));
        assert_eq!(json["violations"][0]["kind"], "unknown_guest");
        assert_eq!(json["violations"][0]["guest"], guest.to_string());
    }

    #[test]
    fn test_compare_query_ids() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let query = CompareQuery {
            ids: Some(format!("{}, {}", a, b)),
        };
        assert_eq!(query.parse_ids().unwrap(), vec![a, b]);
        assert!(CompareQuery::default().parse_ids().unwrap().is_empty());

        let bad = CompareQuery {
            ids: Some("not-an-id".into()),
        };
        assert!(matches!(bad.parse_ids(), Err(AppError::BadRequest(_))));
    }
}
