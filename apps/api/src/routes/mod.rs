pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::screening::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/screenings/analyze", post(handlers::handle_analyze))
        .route("/api/v1/screenings", get(handlers::handle_history))
        .route("/api/v1/screenings/send-link", post(handlers::handle_send_link))
        .route(
            "/api/v1/screenings/send-bulk-links",
            post(handlers::handle_send_bulk_links),
        )
        .route("/api/v1/screenings/:id", get(handlers::handle_detail))
        .route(
            "/api/v1/screenings/:id/candidates/with-email",
            get(handlers::handle_candidates_with_email),
        )
        .route(
            "/api/v1/screenings/:id/candidates/without-email",
            get(handlers::handle_candidates_without_email),
        )
        .route("/api/v1/screenings/:id/report", post(handlers::handle_report))
        .route(
            "/api/v1/cv-files/:id/download",
            get(handlers::handle_download),
        )
        .with_state(state)
}
