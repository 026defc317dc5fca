use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::db::models::Attempt;
use crate::db::types::AttemptStatus;

pub(crate) const COLUMNS: &str = "\
    id, assignment_id, student_id, attempt_number, variant_id, variant_index, status, \
    started_at, deadline_at, submitted_at, graded_at, raw_score, max_score, percentage, \
    violation_count, flagged, flag_reason, created_at, updated_at";

pub(crate) struct CreateAttempt<'a> {
    pub(crate) id: &'a str,
    pub(crate) assignment_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) attempt_number: i32,
    pub(crate) variant_id: &'a str,
    pub(crate) variant_index: i32,
    pub(crate) started_at: time::PrimitiveDateTime,
    pub(crate) deadline_at: time::PrimitiveDateTime,
    pub(crate) max_score: Decimal,
}

pub(crate) struct ScoreUpdate {
    pub(crate) raw_score: Decimal,
    pub(crate) max_score: Decimal,
    pub(crate) percentage: Decimal,
    pub(crate) status: AttemptStatus,
    pub(crate) graded_at: time::PrimitiveDateTime,
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!("SELECT {COLUMNS} FROM attempts WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Row-locks the attempt until the surrounding transaction ends.
pub(crate) async fn lock_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Serialises start requests of one student on one assignment.
pub(crate) async fn acquire_student_lock(
    executor: impl sqlx::PgExecutor<'_>,
    assignment_id: &str,
    student_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(format!("attempt-start:{assignment_id}:{student_id}"))
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn find_in_progress(
    executor: impl sqlx::PgExecutor<'_>,
    assignment_id: &str,
    student_id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts \
         WHERE assignment_id = $1 AND student_id = $2 AND status = $3"
    ))
    .bind(assignment_id)
    .bind(student_id)
    .bind(AttemptStatus::InProgress)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_latest_for_student(
    executor: impl sqlx::PgExecutor<'_>,
    assignment_id: &str,
    student_id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts \
         WHERE assignment_id = $1 AND student_id = $2 \
         ORDER BY attempt_number DESC LIMIT 1"
    ))
    .bind(assignment_id)
    .bind(student_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn count_for_student(
    executor: impl sqlx::PgExecutor<'_>,
    assignment_id: &str,
    student_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM attempts WHERE assignment_id = $1 AND student_id = $2")
        .bind(assignment_id)
        .bind(student_id)
        .fetch_one(executor)
        .await
}

/// Inserts a new in-progress attempt. `None` means a concurrent start won.
pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    attempt: CreateAttempt<'_>,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "INSERT INTO attempts (
            id, assignment_id, student_id, attempt_number, variant_id, variant_index, status,
            started_at, deadline_at, max_score, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$8,$8)
        ON CONFLICT DO NOTHING
        RETURNING {COLUMNS}"
    ))
    .bind(attempt.id)
    .bind(attempt.assignment_id)
    .bind(attempt.student_id)
    .bind(attempt.attempt_number)
    .bind(attempt.variant_id)
    .bind(attempt.variant_index)
    .bind(AttemptStatus::InProgress)
    .bind(attempt.started_at)
    .bind(attempt.deadline_at)
    .bind(attempt.max_score)
    .fetch_optional(executor)
    .await
}

/// Moves an in-progress attempt to `submitted`. Exactly one caller can win;
/// everyone else gets `None`.
pub(crate) async fn mark_submitted(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    submitted_at: time::PrimitiveDateTime,
    now: time::PrimitiveDateTime,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "UPDATE attempts SET status = $1, submitted_at = $2, updated_at = $3 \
         WHERE id = $4 AND status = $5 \
         RETURNING {COLUMNS}"
    ))
    .bind(AttemptStatus::Submitted)
    .bind(submitted_at)
    .bind(now)
    .bind(id)
    .bind(AttemptStatus::InProgress)
    .fetch_optional(executor)
    .await
}

/// Writes scores if the attempt is still in `expected` status.
pub(crate) async fn record_scores(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    expected: AttemptStatus,
    update: ScoreUpdate,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "UPDATE attempts \
         SET raw_score = $1, max_score = $2, percentage = $3, status = $4, \
             graded_at = $5, updated_at = $5 \
         WHERE id = $6 AND status = $7 \
         RETURNING {COLUMNS}"
    ))
    .bind(update.raw_score)
    .bind(update.max_score)
    .bind(update.percentage)
    .bind(update.status)
    .bind(update.graded_at)
    .bind(id)
    .bind(expected)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn increment_violations(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    now: time::PrimitiveDateTime,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "UPDATE attempts SET violation_count = violation_count + 1, updated_at = $1 \
         WHERE id = $2 AND status = $3 \
         RETURNING {COLUMNS}"
    ))
    .bind(now)
    .bind(id)
    .bind(AttemptStatus::InProgress)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn set_flag(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    reason: &str,
    now: time::PrimitiveDateTime,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "UPDATE attempts SET flagged = TRUE, flag_reason = $1, updated_at = $2 \
         WHERE id = $3 \
         RETURNING {COLUMNS}"
    ))
    .bind(reason)
    .bind(now)
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// In-progress attempts whose deadline has passed, oldest deadline first.
pub(crate) async fn list_expired(
    pool: &PgPool,
    now: time::PrimitiveDateTime,
    limit: i64,
) -> Result<Vec<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts \
         WHERE status = $1 AND deadline_at <= $2 \
         ORDER BY deadline_at LIMIT $3"
    ))
    .bind(AttemptStatus::InProgress)
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Submitted attempts that never received scores.
pub(crate) async fn list_stalled(
    pool: &PgPool,
    submitted_before: time::PrimitiveDateTime,
    limit: i64,
) -> Result<Vec<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts \
         WHERE status = $1 AND submitted_at <= $2 \
         ORDER BY submitted_at LIMIT $3"
    ))
    .bind(AttemptStatus::Submitted)
    .bind(submitted_before)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_by_assignment(
    pool: &PgPool,
    assignment_id: &str,
    status: Option<AttemptStatus>,
    skip: i64,
    limit: i64,
) -> Result<Vec<Attempt>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {COLUMNS} FROM attempts WHERE assignment_id = "
    ));
    builder.push_bind(assignment_id);

    if let Some(status) = status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }

    builder.push(" ORDER BY started_at DESC, id OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder.build_query_as::<Attempt>().fetch_all(pool).await
}

pub(crate) async fn count_by_assignment(
    pool: &PgPool,
    assignment_id: &str,
    status: Option<AttemptStatus>,
) -> Result<i64, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM attempts WHERE assignment_id = ");
    builder.push_bind(assignment_id);

    if let Some(status) = status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }

    builder.build_query_scalar::<i64>().fetch_one(pool).await
}
