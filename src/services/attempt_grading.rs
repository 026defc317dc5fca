use std::collections::HashSet;
use std::time::Instant;

use anyhow::{Context, Result};
use rust_decimal::Decimal;

use crate::core::security::AuthUser;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Attempt, AttemptAnswer};
use crate::db::types::AttemptStatus;
use crate::repositories;
use crate::services::attempts::{self, AttemptError, SubmitTrigger};
use crate::services::grading::{self, aggregate};
use crate::services::progress::ProgressEventKind;

/// Moves an attempt to `submitted` and grades it.
///
/// Returns `None` when another caller already moved it out of
/// `in_progress`; that caller owns the grading.
pub(crate) async fn finalize(
    state: &AppState,
    attempt_id: &str,
    submitted_at: time::PrimitiveDateTime,
    trigger: SubmitTrigger,
) -> Result<Option<Attempt>, AttemptError> {
    let now = primitive_now_utc();
    let submitted =
        repositories::attempts::mark_submitted(state.db(), attempt_id, submitted_at, now).await?;

    let Some(submitted) = submitted else {
        tracing::debug!(attempt_id, trigger = trigger.as_str(), "Attempt already closed; skipping");
        return Ok(None);
    };

    Ok(Some(complete(state, submitted, trigger).await))
}

/// Grades an attempt this caller just moved to `submitted`.
///
/// A grading failure leaves the attempt in `submitted`, where the worker
/// picks it up again; the submitted attempt is returned in that case.
pub(crate) async fn complete(state: &AppState, submitted: Attempt, trigger: SubmitTrigger) -> Attempt {
    metrics::counter!("attempts_submitted_total", "trigger" => trigger.as_str()).increment(1);
    tracing::info!(
        attempt_id = %submitted.id,
        assignment_id = %submitted.assignment_id,
        student_id = %submitted.student_id,
        trigger = trigger.as_str(),
        "Attempt submitted"
    );

    match repositories::generated_tests::fetch_variant(state.db(), &submitted.variant_id).await {
        Ok(variant) => {
            attempts::notify_progress(state, ProgressEventKind::Submitted, &submitted, &variant)
                .await
        }
        Err(err) => tracing::warn!(
            error = %err,
            attempt_id = %submitted.id,
            "Failed to load variant for submit notification"
        ),
    }

    match grade_submitted(state, &submitted.id).await {
        Ok(Some(graded)) => graded,
        Ok(None) => submitted,
        Err(err) => {
            tracing::error!(
                error = %format!("{err:#}"),
                attempt_id = %submitted.id,
                "Grading failed; attempt left submitted for retry"
            );
            submitted
        }
    }
}

/// Scores every question of a submitted attempt and stores the totals.
///
/// Runs in one transaction with the attempt row locked; `None` means the
/// attempt was not in `submitted` (already graded or still open).
pub(crate) async fn grade_submitted(state: &AppState, attempt_id: &str) -> Result<Option<Attempt>> {
    let started = Instant::now();
    let mut tx = state.db().begin().await.context("Failed to begin grading transaction")?;

    let Some(attempt) = repositories::attempts::lock_by_id(&mut *tx, attempt_id)
        .await
        .context("Failed to lock attempt")?
    else {
        return Ok(None);
    };
    if attempt.status != AttemptStatus::Submitted {
        return Ok(None);
    }

    let variant = repositories::generated_tests::fetch_variant(&mut *tx, &attempt.variant_id)
        .await
        .context("Failed to load attempt variant")?;
    let existing = repositories::answers::list_by_attempt(&mut *tx, &attempt.id)
        .await
        .context("Failed to load answers")?;

    let answered: HashSet<&str> =
        existing.iter().map(|answer| answer.question_id.as_str()).collect();
    let (missing_ids, missing_points): (Vec<String>, Vec<Decimal>) = variant
        .questions
        .0
        .iter()
        .filter(|question| !answered.contains(question.question_id.as_str()))
        .map(|question| (question.question_id.clone(), question.points))
        .unzip();

    let now = primitive_now_utc();
    if !missing_ids.is_empty() {
        repositories::answers::insert_unanswered(
            &mut *tx,
            &attempt.id,
            &missing_ids,
            &missing_points,
            now,
        )
        .await
        .context("Failed to materialise unanswered questions")?;
    }

    let answers = repositories::answers::list_by_attempt(&mut *tx, &attempt.id)
        .await
        .context("Failed to reload answers")?;

    let mut tallies = Vec::with_capacity(answers.len());
    for answer in &answers {
        let Some(question) = variant.question(&answer.question_id) else {
            tracing::warn!(
                attempt_id = %attempt.id,
                question_id = %answer.question_id,
                "Answer does not belong to the attempt variant; ignored"
            );
            continue;
        };

        let outcome = grading::grade_answer(&question.payload, question.points, answer.answer());
        let max_points = grading::round_points(question.points);
        repositories::answers::record_score(
            &mut *tx,
            &answer.id,
            repositories::answers::AnswerScore {
                earned_points: outcome.earned,
                max_points,
                is_correct: outcome.is_correct,
                is_partial: outcome.is_partial,
                needs_manual: outcome.needs_manual,
                graded_at: now,
            },
        )
        .await
        .context("Failed to store answer score")?;

        tallies.push(aggregate::AnswerTally {
            earned: outcome.earned,
            max: max_points,
            needs_manual: outcome.needs_manual,
        });
    }

    let totals = aggregate::totals(tallies);
    let status = aggregate::status_after_auto(&totals);
    let graded = repositories::attempts::record_scores(
        &mut *tx,
        &attempt.id,
        AttemptStatus::Submitted,
        repositories::attempts::ScoreUpdate {
            raw_score: totals.raw_score,
            max_score: totals.max_score,
            percentage: totals.percentage,
            status,
            graded_at: now,
        },
    )
    .await
    .context("Failed to store attempt totals")?;

    tx.commit().await.context("Failed to commit grading")?;

    metrics::histogram!("grading_duration_seconds").record(started.elapsed().as_secs_f64());
    let Some(graded) = graded else {
        return Ok(None);
    };

    metrics::counter!("attempts_graded_total", "status" => graded.status.as_str()).increment(1);
    tracing::info!(
        attempt_id = %graded.id,
        raw_score = %totals.raw_score,
        max_score = %totals.max_score,
        percentage = %totals.percentage,
        status = graded.status.as_str(),
        "Attempt graded"
    );

    attempts::notify_progress(state, ProgressEventKind::Graded, &graded, &variant).await;
    Ok(Some(graded))
}

/// Callback surface: grades a submitted attempt on request.
///
/// Already graded attempts are returned unchanged.
pub(crate) async fn grade(
    state: &AppState,
    viewer: &AuthUser,
    attempt_id: &str,
) -> Result<Attempt, AttemptError> {
    let attempt = repositories::attempts::find_by_id(state.db(), attempt_id)
        .await?
        .ok_or(AttemptError::NotFound("Attempt not found"))?;
    attempts::ensure_assignment_owner(state, viewer, &attempt.assignment_id).await?;

    match attempt.status {
        AttemptStatus::InProgress => {
            Err(AttemptError::Conflict("Attempt has not been submitted yet".to_string()))
        }
        AttemptStatus::Submitted => {
            let graded = grade_submitted(state, &attempt.id)
                .await
                .map_err(|err| AttemptError::Internal(format!("{err:#}")))?;
            match graded {
                Some(graded) => Ok(graded),
                None => reload(state, &attempt.id).await,
            }
        }
        _ => Ok(attempt),
    }
}

pub(crate) struct ManualGrade<'a> {
    pub(crate) score: Decimal,
    pub(crate) feedback: Option<&'a str>,
}

/// Stores a reviewer's score for one answer and recomputes the whole attempt.
pub(crate) async fn manual_grade(
    state: &AppState,
    reviewer: &AuthUser,
    answer_id: &str,
    grade: ManualGrade<'_>,
) -> Result<(AttemptAnswer, Attempt), AttemptError> {
    let attempt_id = repositories::answers::find_attempt_id(state.db(), answer_id)
        .await?
        .ok_or(AttemptError::NotFound("Answer not found"))?;

    let mut tx = state.db().begin().await?;
    // Attempt before answer, the same order grading locks in.
    let attempt = repositories::attempts::lock_by_id(&mut *tx, &attempt_id)
        .await?
        .ok_or(AttemptError::NotFound("Attempt not found"))?;
    attempts::ensure_assignment_owner(state, reviewer, &attempt.assignment_id).await?;

    if !attempt.status.is_scored() {
        return Err(AttemptError::Conflict(format!(
            "Attempt is {}; only graded attempts can be reviewed",
            attempt.status.as_str()
        )));
    }

    let answer = repositories::answers::lock_by_id(&mut *tx, answer_id)
        .await?
        .ok_or(AttemptError::NotFound("Answer not found"))?;

    let outcome = grading::manual_outcome(answer.max_points, grade.score)?;
    let now = primitive_now_utc();
    let updated = repositories::answers::record_manual_score(
        &mut *tx,
        &answer.id,
        repositories::answers::ManualScore {
            earned_points: outcome.earned,
            is_correct: outcome.is_correct,
            is_partial: outcome.is_partial,
            feedback: grade.feedback,
            graded_by: &reviewer.id,
            graded_at: now,
        },
    )
    .await?;

    let answers = repositories::answers::list_by_attempt(&mut *tx, &attempt.id).await?;
    let totals = aggregate::totals(answers.iter().map(aggregate::AnswerTally::from));
    let status = aggregate::status_after_manual(&totals);

    let regraded = repositories::attempts::record_scores(
        &mut *tx,
        &attempt.id,
        attempt.status,
        repositories::attempts::ScoreUpdate {
            raw_score: totals.raw_score,
            max_score: totals.max_score,
            percentage: totals.percentage,
            status,
            graded_at: now,
        },
    )
    .await?
    .ok_or_else(|| AttemptError::Conflict("Attempt changed during review".to_string()))?;

    tx.commit().await?;

    metrics::counter!("attempts_graded_total", "status" => regraded.status.as_str()).increment(1);
    tracing::info!(
        attempt_id = %regraded.id,
        answer_id = %updated.id,
        reviewer_id = %reviewer.id,
        score = %outcome.earned,
        status = regraded.status.as_str(),
        "Answer graded manually"
    );

    Ok((updated, regraded))
}

async fn reload(state: &AppState, attempt_id: &str) -> Result<Attempt, AttemptError> {
    repositories::attempts::find_by_id(state.db(), attempt_id)
        .await?
        .ok_or(AttemptError::NotFound("Attempt not found"))
}
