mod handlers;

use axum::{routing::get, routing::post, routing::put, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:attempt_id", get(handlers::get_attempt))
        .route("/:attempt_id/answers", post(handlers::save_answers))
        .route("/:attempt_id/answers/:question_id", put(handlers::save_answer))
        .route("/:attempt_id/violations", post(handlers::report_violation))
        .route("/:attempt_id/submit", post(handlers::submit_attempt))
        .route("/:attempt_id/grade", post(handlers::grade_attempt))
}

pub(crate) fn answers_router() -> Router<AppState> {
    Router::new().route("/:answer_id/grade", post(handlers::grade_answer))
}

#[cfg(test)]
mod tests;
