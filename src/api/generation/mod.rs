mod handlers;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/tests", post(handlers::generate_test))
        .route("/tests/:test_id", get(handlers::get_generated_test))
}

#[cfg(test)]
mod tests;
