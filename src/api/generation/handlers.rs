use axum::extract::{Path, State};
use axum::Json;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAuthor;
use crate::core::state::AppState;
use crate::schemas::generation::{GenerateTestRequest, GeneratedTestResponse};
use crate::services::generation;

pub(super) async fn generate_test(
    CurrentAuthor(user): CurrentAuthor,
    State(state): State<AppState>,
    Json(payload): Json<GenerateTestRequest>,
) -> Result<Json<GeneratedTestResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let request = payload.into_request().map_err(ApiError::BadRequest)?;

    let outcome = generation::generate(&state, &user.id, request).await?;
    Ok(Json(GeneratedTestResponse::from(outcome)))
}

pub(super) async fn get_generated_test(
    Path(test_id): Path<String>,
    CurrentAuthor(user): CurrentAuthor,
    State(state): State<AppState>,
) -> Result<Json<GeneratedTestResponse>, ApiError> {
    let outcome = generation::load(&state, &user.id, user.is_admin(), &test_id).await?;
    Ok(Json(GeneratedTestResponse::from(outcome)))
}
