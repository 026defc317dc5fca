use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::db::models::Question;
pub(crate) const COLUMNS: &str = "\
    id, owner_id, subject_id, topic_id, prompt, question_type, difficulty, points, \
    payload, version, is_public, created_at, updated_at";

pub(crate) struct CandidateScope<'a> {
    pub(crate) requester_id: &'a str,
    pub(crate) subject_id: Option<&'a str>,
    pub(crate) topic_id: Option<&'a str>,
}

/// Closed-option questions visible to the requester inside the scope, ordered by id.
pub(crate) async fn list_candidates(
    pool: &PgPool,
    scope: CandidateScope<'_>,
) -> Result<Vec<Question>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {COLUMNS} FROM questions WHERE (owner_id = "
    ));
    builder.push_bind(scope.requester_id);
    builder.push(
        " OR is_public) AND question_type IN ('single_choice', 'multi_choice', 'true_false')",
    );

    if let Some(subject_id) = scope.subject_id {
        builder.push(" AND subject_id = ");
        builder.push_bind(subject_id);
    }
    if let Some(topic_id) = scope.topic_id {
        builder.push(" AND topic_id = ");
        builder.push_bind(topic_id);
    }

    builder.push(" ORDER BY id");
    builder.build_query_as::<Question>().fetch_all(pool).await
}

pub(crate) async fn find_by_ids(pool: &PgPool, ids: &[String]) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!("SELECT {COLUMNS} FROM questions WHERE id = ANY($1)"))
        .bind(ids)
        .fetch_all(pool)
        .await
}

#[cfg(test)]
pub(crate) struct CreateQuestion<'a> {
    pub(crate) id: &'a str,
    pub(crate) owner_id: &'a str,
    pub(crate) subject_id: Option<&'a str>,
    pub(crate) topic_id: Option<&'a str>,
    pub(crate) prompt: &'a str,
    pub(crate) difficulty: crate::db::types::DifficultyLevel,
    pub(crate) points: rust_decimal::Decimal,
    pub(crate) payload: crate::db::payloads::QuestionPayload,
    pub(crate) is_public: bool,
    pub(crate) created_at: time::PrimitiveDateTime,
}

/// Questions are authored by the question-bank service; tests seed them directly.
#[cfg(test)]
pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    question: CreateQuestion<'_>,
) -> Result<Question, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "INSERT INTO questions (
            id, owner_id, subject_id, topic_id, prompt, question_type, difficulty, points,
            payload, version, is_public, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,1,$10,$11,$11)
        RETURNING {COLUMNS}"
    ))
    .bind(question.id)
    .bind(question.owner_id)
    .bind(question.subject_id)
    .bind(question.topic_id)
    .bind(question.prompt)
    .bind(question.payload.question_type())
    .bind(question.difficulty)
    .bind(question.points)
    .bind(sqlx::types::Json(question.payload))
    .bind(question.is_public)
    .bind(question.created_at)
    .fetch_one(executor)
    .await
}
