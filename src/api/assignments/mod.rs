mod handlers;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_assignment))
        .route("/:assignment_id", get(handlers::get_assignment))
        .route("/:assignment_id/close", post(handlers::close_assignment))
        .route("/:assignment_id/attempts", get(handlers::list_attempts))
        .route("/:assignment_id/my-status", get(handlers::my_status))
        .route("/:assignment_id/start", post(handlers::start_attempt))
}
