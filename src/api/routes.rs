//! API route definitions

use super::handlers::{self, AppState};
use super::ws_handlers;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // ====================================================================
        // Events
        // ====================================================================
        .route(
            "/api/events",
            get(handlers::list_events).post(handlers::create_event),
        )
        .route("/api/events/import", post(handlers::import_event))
        .route(
            "/api/events/{event_id}",
            get(handlers::get_event).delete(handlers::delete_event),
        )
        .route(
            "/api/events/{event_id}/settings",
            put(handlers::update_settings),
        )
        .route("/api/events/{event_id}/tables", put(handlers::set_tables))
        .route("/api/events/{event_id}/export", get(handlers::export_event))
        // ====================================================================
        // Guests
        // ====================================================================
        .route(
            "/api/events/{event_id}/guests",
            get(handlers::list_guests).post(handlers::add_guest),
        )
        .route(
            "/api/events/{event_id}/guests/search",
            get(handlers::find_guest),
        )
        .route(
            "/api/events/{event_id}/guests/{guest_id}",
            get(handlers::get_guest)
                .patch(handlers::update_guest_attributes)
                .delete(handlers::remove_guest),
        )
        .route(
            "/api/events/{event_id}/guests/{guest_id}/neighbors",
            get(handlers::guest_neighbors),
        )
        .route(
            "/api/events/{event_id}/guests/{guest_id}/conflicts",
            get(handlers::guest_conflicts),
        )
        .route(
            "/api/events/{event_id}/guests/{guest_id}/suggestions",
            post(handlers::suggest_relationships),
        )
        // ====================================================================
        // Relationships
        // ====================================================================
        .route(
            "/api/events/{event_id}/relationships",
            get(handlers::list_relationships).put(handlers::upsert_relationship),
        )
        .route(
            "/api/events/{event_id}/relationships/summary",
            get(handlers::relationship_summary),
        )
        .route(
            "/api/events/{event_id}/relationships/{a}/{b}",
            delete(handlers::remove_relationship),
        )
        // ====================================================================
        // Arrangements
        // ====================================================================
        .route(
            "/api/events/{event_id}/arrangements",
            get(handlers::list_arrangements).post(handlers::create_arrangement),
        )
        .route(
            "/api/events/{event_id}/arrangements/diff",
            get(handlers::diff_arrangements),
        )
        .route(
            "/api/events/{event_id}/arrangements/compare",
            get(handlers::compare_arrangements),
        )
        .route(
            "/api/events/{event_id}/arrangements/{arrangement_id}",
            get(handlers::get_arrangement)
                .patch(handlers::rename_arrangement)
                .delete(handlers::delete_arrangement),
        )
        .route(
            "/api/events/{event_id}/arrangements/{arrangement_id}/save",
            post(handlers::save_arrangement),
        )
        .route(
            "/api/events/{event_id}/arrangements/{arrangement_id}/current",
            post(handlers::set_current),
        )
        .route(
            "/api/events/{event_id}/arrangements/{arrangement_id}/assign",
            post(handlers::assign_guest),
        )
        .route(
            "/api/events/{event_id}/arrangements/{arrangement_id}/unassign",
            post(handlers::unassign_guest),
        )
        .route(
            "/api/events/{event_id}/arrangements/{arrangement_id}/swap",
            post(handlers::swap_guests),
        )
        .route(
            "/api/events/{event_id}/arrangements/{arrangement_id}/seating",
            put(handlers::replace_seating),
        )
        .route(
            "/api/events/{event_id}/arrangements/{arrangement_id}/clear",
            post(handlers::clear_arrangement),
        )
        .route(
            "/api/events/{event_id}/arrangements/{arrangement_id}/unassigned",
            get(handlers::unassigned_guests),
        )
        .route(
            "/api/events/{event_id}/score",
            post(handlers::score_arrangement),
        )
        // ====================================================================
        // Optimization jobs
        // ====================================================================
        .route(
            "/api/events/{event_id}/optimize",
            get(handlers::list_jobs).post(handlers::start_optimization),
        )
        .route(
            "/api/events/{event_id}/optimize/{job_id}/status",
            get(handlers::job_status),
        )
        .route(
            "/api/events/{event_id}/optimize/{job_id}/results",
            get(handlers::job_results),
        )
        .route(
            "/api/events/{event_id}/optimize/{job_id}/cancel",
            post(handlers::cancel_job),
        )
        // ====================================================================
        // WebSocket
        // ====================================================================
        .route("/ws/events", get(ws_handlers::ws_events))
        .route(
            "/ws/events/{event_id}/optimize/{job_id}",
            get(ws_handlers::ws_job_progress),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
