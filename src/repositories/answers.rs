use rust_decimal::Decimal;
use sqlx::types::Json;

use crate::db::models::AttemptAnswer;
use crate::db::payloads::AnswerValue;

pub(crate) const COLUMNS: &str = "\
    id, attempt_id, question_id, value, is_correct, is_partial, needs_manual, \
    earned_points, max_points, time_spent_seconds, bookmarked, feedback, graded_by, \
    saved_at, graded_at";

pub(crate) struct UpsertAnswer<'a> {
    pub(crate) id: &'a str,
    pub(crate) attempt_id: &'a str,
    pub(crate) question_id: &'a str,
    pub(crate) value: Option<&'a AnswerValue>,
    pub(crate) max_points: Decimal,
    pub(crate) time_spent_seconds: Option<i32>,
    pub(crate) bookmarked: bool,
    pub(crate) saved_at: time::PrimitiveDateTime,
}

pub(crate) struct AnswerScore {
    pub(crate) earned_points: Decimal,
    pub(crate) max_points: Decimal,
    pub(crate) is_correct: bool,
    pub(crate) is_partial: bool,
    pub(crate) needs_manual: bool,
    pub(crate) graded_at: time::PrimitiveDateTime,
}

pub(crate) struct ManualScore<'a> {
    pub(crate) earned_points: Decimal,
    pub(crate) is_correct: bool,
    pub(crate) is_partial: bool,
    pub(crate) feedback: Option<&'a str>,
    pub(crate) graded_by: &'a str,
    pub(crate) graded_at: time::PrimitiveDateTime,
}

/// Last write wins per (attempt, question).
pub(crate) async fn upsert(
    executor: impl sqlx::PgExecutor<'_>,
    answer: UpsertAnswer<'_>,
) -> Result<AttemptAnswer, sqlx::Error> {
    sqlx::query_as::<_, AttemptAnswer>(&format!(
        "INSERT INTO attempt_answers (
            id, attempt_id, question_id, value, max_points, time_spent_seconds, bookmarked,
            saved_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
        ON CONFLICT (attempt_id, question_id) DO UPDATE SET
            value = EXCLUDED.value,
            time_spent_seconds = COALESCE(
                EXCLUDED.time_spent_seconds, attempt_answers.time_spent_seconds
            ),
            bookmarked = EXCLUDED.bookmarked,
            saved_at = EXCLUDED.saved_at
        RETURNING {COLUMNS}"
    ))
    .bind(answer.id)
    .bind(answer.attempt_id)
    .bind(answer.question_id)
    .bind(answer.value.map(Json))
    .bind(answer.max_points)
    .bind(answer.time_spent_seconds)
    .bind(answer.bookmarked)
    .bind(answer.saved_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn list_by_attempt(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
) -> Result<Vec<AttemptAnswer>, sqlx::Error> {
    sqlx::query_as::<_, AttemptAnswer>(&format!(
        "SELECT {COLUMNS} FROM attempt_answers WHERE attempt_id = $1 ORDER BY question_id"
    ))
    .bind(attempt_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn count_answered(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM attempt_answers WHERE attempt_id = $1 AND value IS NOT NULL",
    )
    .bind(attempt_id)
    .fetch_one(executor)
    .await
}

/// Materialises unanswered rows so every variant question carries a score.
pub(crate) async fn insert_unanswered(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
    question_ids: &[String],
    max_points: &[Decimal],
    saved_at: time::PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let ids: Vec<String> =
        question_ids.iter().map(|_| uuid::Uuid::new_v4().to_string()).collect();

    let result = sqlx::query(
        "INSERT INTO attempt_answers (id, attempt_id, question_id, max_points, saved_at)
         SELECT item.id, $1, item.question_id, item.max_points, $5
         FROM UNNEST($2::varchar[], $3::varchar[], $4::numeric[])
              AS item(id, question_id, max_points)
         ON CONFLICT (attempt_id, question_id) DO NOTHING",
    )
    .bind(attempt_id)
    .bind(&ids)
    .bind(question_ids)
    .bind(max_points)
    .bind(saved_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

pub(crate) async fn record_score(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    score: AnswerScore,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE attempt_answers
         SET earned_points = $1, max_points = $2, is_correct = $3, is_partial = $4,
             needs_manual = $5, graded_at = $6
         WHERE id = $7",
    )
    .bind(score.earned_points)
    .bind(score.max_points)
    .bind(score.is_correct)
    .bind(score.is_partial)
    .bind(score.needs_manual)
    .bind(score.graded_at)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn find_attempt_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT attempt_id FROM attempt_answers WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn lock_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<AttemptAnswer>, sqlx::Error> {
    sqlx::query_as::<_, AttemptAnswer>(&format!(
        "SELECT {COLUMNS} FROM attempt_answers WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn record_manual_score(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    score: ManualScore<'_>,
) -> Result<AttemptAnswer, sqlx::Error> {
    sqlx::query_as::<_, AttemptAnswer>(&format!(
        "UPDATE attempt_answers
         SET earned_points = $1, is_correct = $2, is_partial = $3, needs_manual = FALSE,
             feedback = $4, graded_by = $5, graded_at = $6
         WHERE id = $7
         RETURNING {COLUMNS}"
    ))
    .bind(score.earned_points)
    .bind(score.is_correct)
    .bind(score.is_partial)
    .bind(score.feedback)
    .bind(score.graded_by)
    .bind(score.graded_at)
    .bind(id)
    .fetch_one(executor)
    .await
}
