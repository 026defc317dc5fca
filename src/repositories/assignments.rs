use sqlx::PgPool;

use crate::db::models::Assignment;
use crate::db::types::{AssignmentStatus, IntegrityAction};

pub(crate) const COLUMNS: &str = "\
    id, generated_test_id, owner_id, title, status, starts_at, ends_at, duration_minutes, \
    max_attempts, shuffle_per_student, access_code_hash, tab_switch_threshold, \
    tab_switch_action, created_at, updated_at, closed_at";

pub(crate) struct CreateAssignment<'a> {
    pub(crate) id: &'a str,
    pub(crate) generated_test_id: &'a str,
    pub(crate) owner_id: &'a str,
    pub(crate) title: &'a str,
    pub(crate) status: AssignmentStatus,
    pub(crate) starts_at: time::PrimitiveDateTime,
    pub(crate) ends_at: time::PrimitiveDateTime,
    pub(crate) duration_minutes: i32,
    pub(crate) max_attempts: i32,
    pub(crate) shuffle_per_student: bool,
    pub(crate) access_code_hash: Option<&'a str>,
    pub(crate) tab_switch_threshold: i32,
    pub(crate) tab_switch_action: IntegrityAction,
    pub(crate) created_at: time::PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    assignment: CreateAssignment<'_>,
) -> Result<Assignment, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!(
        "INSERT INTO assignments (
            id, generated_test_id, owner_id, title, status, starts_at, ends_at,
            duration_minutes, max_attempts, shuffle_per_student, access_code_hash,
            tab_switch_threshold, tab_switch_action, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$14)
        RETURNING {COLUMNS}"
    ))
    .bind(assignment.id)
    .bind(assignment.generated_test_id)
    .bind(assignment.owner_id)
    .bind(assignment.title)
    .bind(assignment.status)
    .bind(assignment.starts_at)
    .bind(assignment.ends_at)
    .bind(assignment.duration_minutes)
    .bind(assignment.max_attempts)
    .bind(assignment.shuffle_per_student)
    .bind(assignment.access_code_hash)
    .bind(assignment.tab_switch_threshold)
    .bind(assignment.tab_switch_action)
    .bind(assignment.created_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn add_students(
    executor: impl sqlx::PgExecutor<'_>,
    assignment_id: &str,
    student_ids: &[String],
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO assignment_students (assignment_id, student_id)
         SELECT $1, UNNEST($2::varchar[])
         ON CONFLICT DO NOTHING",
    )
    .bind(assignment_id)
    .bind(student_ids)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!("SELECT {COLUMNS} FROM assignments WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn fetch_one_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Assignment, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!("SELECT {COLUMNS} FROM assignments WHERE id = $1"))
        .bind(id)
        .fetch_one(executor)
        .await
}

pub(crate) async fn list_students(
    pool: &PgPool,
    assignment_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT student_id FROM assignment_students WHERE assignment_id = $1 ORDER BY student_id",
    )
    .bind(assignment_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn is_on_roster(
    executor: impl sqlx::PgExecutor<'_>,
    assignment_id: &str,
    student_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS(
            SELECT 1 FROM assignment_students WHERE assignment_id = $1 AND student_id = $2
        )",
    )
    .bind(assignment_id)
    .bind(student_id)
    .fetch_one(executor)
    .await
}

/// Closes an active or draft assignment. Returns `None` if it was already closed.
pub(crate) async fn close(
    pool: &PgPool,
    id: &str,
    now: time::PrimitiveDateTime,
) -> Result<Option<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!(
        "UPDATE assignments SET status = $1, closed_at = $2, updated_at = $2 \
         WHERE id = $3 AND status <> $1 \
         RETURNING {COLUMNS}"
    ))
    .bind(AssignmentStatus::Closed)
    .bind(now)
    .bind(id)
    .fetch_optional(pool)
    .await
}
