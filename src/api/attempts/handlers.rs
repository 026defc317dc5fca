use axum::extract::{Path, State};
use axum::Json;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentAuthor, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::schemas::attempt::{
    AnswerResponse, AnswerSaveRequest, AttemptDetailResponse, AttemptResponse,
    BatchAnswerRequest, BatchAnswerResponse, ManualGradeRequest, ManualGradeResponse,
    ViolationResponse,
};
use crate::services::attempt_grading::{self, ManualGrade};
use crate::services::attempts;

pub(super) async fn get_attempt(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptDetailResponse>, ApiError> {
    let snapshot = attempts::get(&state, &user, &attempt_id).await?;
    Ok(Json(AttemptDetailResponse::from_snapshot(&snapshot, primitive_now_utc(), None)))
}

pub(super) async fn save_answer(
    Path((attempt_id, question_id)): Path<(String, String)>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<AnswerSaveRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let saved =
        attempts::save_answer(&state, &user, &attempt_id, payload.into_input(question_id)).await?;
    Ok(Json(AnswerResponse::from_db(&saved, false)))
}

pub(super) async fn save_answers(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<BatchAnswerRequest>,
) -> Result<Json<BatchAnswerResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let outcome = attempts::save_answers(&state, &user, &attempt_id, payload.into_inputs()).await?;
    Ok(Json(BatchAnswerResponse::from(outcome)))
}

pub(super) async fn report_violation(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ViolationResponse>, ApiError> {
    let outcome = attempts::report_violation(&state, &user, &attempt_id).await?;
    Ok(Json(ViolationResponse::from_outcome(&outcome, primitive_now_utc())))
}

pub(super) async fn submit_attempt(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptDetailResponse>, ApiError> {
    let submitted = attempts::submit(&state, &user, &attempt_id).await?;
    let snapshot = attempts::load_snapshot(&state, submitted).await?;
    Ok(Json(AttemptDetailResponse::from_snapshot(&snapshot, primitive_now_utc(), None)))
}

pub(super) async fn grade_attempt(
    Path(attempt_id): Path<String>,
    CurrentAuthor(user): CurrentAuthor,
    State(state): State<AppState>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let graded = attempt_grading::grade(&state, &user, &attempt_id).await?;
    Ok(Json(AttemptResponse::from_db(&graded, primitive_now_utc())))
}

pub(super) async fn grade_answer(
    Path(answer_id): Path<String>,
    CurrentAuthor(user): CurrentAuthor,
    State(state): State<AppState>,
    Json(payload): Json<ManualGradeRequest>,
) -> Result<Json<ManualGradeResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let (answer, attempt) = attempt_grading::manual_grade(
        &state,
        &user,
        &answer_id,
        ManualGrade { score: payload.score, feedback: payload.feedback.as_deref() },
    )
    .await?;

    Ok(Json(ManualGradeResponse {
        answer: AnswerResponse::from_db(&answer, true),
        attempt: AttemptResponse::from_db(&attempt, primitive_now_utc()),
    }))
}
