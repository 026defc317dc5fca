use axum::extract::{Path, Query, State};
use axum::Json;
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentAuthor, CurrentUser};
use crate::api::pagination::PaginatedResponse;
use crate::core::security::AuthUser;
use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc, to_primitive_utc};
use crate::db::models::Assignment;
use crate::repositories;
use crate::schemas::assignment::{
    AssignmentCreate, AssignmentResponse, AttemptListQuery, MyStatusResponse,
    StartAttemptRequest, StudentProgressState,
};
use crate::schemas::attempt::{AttemptDetailResponse, AttemptResponse};
use crate::services::access_codes;
use crate::services::attempts::{self, StudentStatus};

pub(super) async fn create_assignment(
    CurrentAuthor(user): CurrentAuthor,
    State(state): State<AppState>,
    Json(payload): Json<AssignmentCreate>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let starts_at = to_primitive_utc(payload.starts_at);
    let ends_at = to_primitive_utc(payload.ends_at);
    if ends_at <= starts_at {
        return Err(ApiError::BadRequest("ends_at must be after starts_at".to_string()));
    }

    let test = repositories::generated_tests::find_by_id(state.db(), &payload.generated_test_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch generated test"))?
        .ok_or_else(|| ApiError::NotFound("Generated test not found".to_string()))?;
    if test.owner_id != user.id && !user.is_admin() {
        return Err(ApiError::Forbidden("Not allowed to assign this test".to_string()));
    }

    let access_code = match (payload.access_code.as_deref(), payload.generate_access_code) {
        (Some(code), _) => Some(code.trim().to_uppercase()),
        (None, true) => Some(access_codes::generate_access_code()),
        (None, false) => None,
    };
    let access_code_hash = access_code.as_deref().map(access_codes::hash_access_code);

    let mut student_ids: Vec<String> = payload
        .student_ids
        .iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    student_ids.sort();
    student_ids.dedup();
    if student_ids.is_empty() {
        return Err(ApiError::BadRequest("student_ids must not be blank".to_string()));
    }

    let assignment_id = Uuid::new_v4().to_string();
    let now = primitive_now_utc();

    let mut tx =
        state.db().begin().await.map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;
    let assignment = repositories::assignments::create(
        &mut *tx,
        repositories::assignments::CreateAssignment {
            id: &assignment_id,
            generated_test_id: &test.id,
            owner_id: &user.id,
            title: payload.title.trim(),
            status: payload.status,
            starts_at,
            ends_at,
            duration_minutes: payload.duration_minutes,
            max_attempts: payload.max_attempts,
            shuffle_per_student: payload.shuffle_per_student,
            access_code_hash: access_code_hash.as_deref(),
            tab_switch_threshold: payload.tab_switch_threshold,
            tab_switch_action: payload.tab_switch_action,
            created_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create assignment"))?;

    repositories::assignments::add_students(&mut *tx, &assignment.id, &student_ids)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to store assignment roster"))?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit assignment"))?;

    tracing::info!(
        assignment_id = %assignment.id,
        generated_test_id = %test.id,
        owner_id = %user.id,
        students = student_ids.len(),
        "Assignment created"
    );

    let mut response = AssignmentResponse::from_db(assignment, student_ids);
    response.access_code = access_code;
    Ok(Json(response))
}

pub(super) async fn get_assignment(
    Path(assignment_id): Path<String>,
    CurrentAuthor(user): CurrentAuthor,
    State(state): State<AppState>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    let assignment = owned_assignment(&state, &user, &assignment_id).await?;
    let students = repositories::assignments::list_students(state.db(), &assignment.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch assignment roster"))?;

    Ok(Json(AssignmentResponse::from_db(assignment, students)))
}

pub(super) async fn close_assignment(
    Path(assignment_id): Path<String>,
    CurrentAuthor(user): CurrentAuthor,
    State(state): State<AppState>,
) -> Result<Json<AssignmentResponse>, ApiError> {
    owned_assignment(&state, &user, &assignment_id).await?;

    let closed = repositories::assignments::close(state.db(), &assignment_id, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to close assignment"))?
        .ok_or_else(|| ApiError::Conflict("Assignment is already closed".to_string()))?;
    let students = repositories::assignments::list_students(state.db(), &closed.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch assignment roster"))?;

    tracing::info!(assignment_id = %closed.id, owner_id = %user.id, "Assignment closed");
    Ok(Json(AssignmentResponse::from_db(closed, students)))
}

pub(super) async fn list_attempts(
    Path(assignment_id): Path<String>,
    Query(params): Query<AttemptListQuery>,
    CurrentAuthor(user): CurrentAuthor,
    State(state): State<AppState>,
) -> Result<Json<PaginatedResponse<AttemptResponse>>, ApiError> {
    let assignment = owned_assignment(&state, &user, &assignment_id).await?;
    let skip = params.skip.max(0);
    let limit = params.limit.clamp(1, 1000);

    let rows = repositories::attempts::list_by_assignment(
        state.db(),
        &assignment.id,
        params.status,
        skip,
        limit,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to list attempts"))?;
    let total_count =
        repositories::attempts::count_by_assignment(state.db(), &assignment.id, params.status)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to count attempts"))?;

    let now = primitive_now_utc();
    Ok(Json(PaginatedResponse {
        items: rows.iter().map(|attempt| AttemptResponse::from_db(attempt, now)).collect(),
        total_count,
        skip,
        limit,
    }))
}

pub(super) async fn my_status(
    Path(assignment_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<MyStatusResponse>, ApiError> {
    let status = attempts::student_status(&state, &user, &assignment_id).await?;
    let now = primitive_now_utc();

    let response = match status {
        StudentStatus::NotStarted { remaining_attempts } => MyStatusResponse {
            assignment_id,
            state: StudentProgressState::NotStarted,
            remaining_attempts,
            attempt: None,
        },
        StudentStatus::Attempted { latest, remaining_attempts } => MyStatusResponse {
            assignment_id,
            state: StudentProgressState::Attempted,
            remaining_attempts,
            attempt: Some(AttemptResponse::from_db(&latest, now)),
        },
    };
    Ok(Json(response))
}

pub(super) async fn start_attempt(
    Path(assignment_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    payload: Option<Json<StartAttemptRequest>>,
) -> Result<Json<AttemptDetailResponse>, ApiError> {
    let Json(payload) = payload.unwrap_or_default();
    let outcome =
        attempts::start(&state, &user, &assignment_id, payload.access_code.as_deref()).await?;

    Ok(Json(AttemptDetailResponse::from_snapshot(
        &outcome.snapshot,
        primitive_now_utc(),
        Some(outcome.resumed),
    )))
}

async fn owned_assignment(
    state: &AppState,
    user: &AuthUser,
    assignment_id: &str,
) -> Result<Assignment, ApiError> {
    Ok(attempts::ensure_assignment_owner(state, user, assignment_id).await?)
}
