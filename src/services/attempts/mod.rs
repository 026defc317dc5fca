//! Timed attempt lifecycle: start/resume, answer saves, integrity reports and
//! submission.
//!
//! Status changes out of `in_progress` always go through the conditional
//! update in `repositories::attempts::mark_submitted`, so a student submit, a
//! deadline hit and the expiry sweep can race without double grading.

pub(crate) mod policy;
pub(crate) mod timing;

use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::core::security::AuthUser;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Assignment, Attempt, AttemptAnswer, GeneratedTestVariant};
use crate::db::payloads::AnswerValue;
use crate::db::types::AttemptStatus;
use crate::repositories;
use crate::services::access_codes;
use crate::services::attempt_grading;
use crate::services::attempts::policy::{Escalation, WindowState};
use crate::services::grading::{round_points, GradingError};
use crate::services::progress::{ProgressEvent, ProgressEventKind};

#[derive(Debug, Error)]
pub(crate) enum AttemptError {
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("time expired; the attempt was submitted at its deadline")]
    TimeExpired,
    #[error(transparent)]
    Grading(#[from] GradingError),
    #[error("{0}")]
    Internal(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubmitTrigger {
    Student,
    Deadline,
    Integrity,
    Sweep,
}

impl SubmitTrigger {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Deadline => "deadline",
            Self::Integrity => "integrity",
            Self::Sweep => "sweep",
        }
    }
}

/// An attempt with the variant it was dealt and the answers saved so far.
#[derive(Debug, Clone)]
pub(crate) struct AttemptSnapshot {
    pub(crate) attempt: Attempt,
    pub(crate) variant: GeneratedTestVariant,
    pub(crate) answers: Vec<AttemptAnswer>,
}

#[derive(Debug, Clone)]
pub(crate) struct StartOutcome {
    pub(crate) snapshot: AttemptSnapshot,
    pub(crate) resumed: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct AnswerInput {
    pub(crate) question_id: String,
    pub(crate) value: Value,
    pub(crate) time_spent_seconds: Option<i32>,
    pub(crate) bookmarked: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct BatchFailure {
    pub(crate) question_id: String,
    pub(crate) detail: String,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct BatchOutcome {
    pub(crate) saved: Vec<AttemptAnswer>,
    pub(crate) failed: Vec<BatchFailure>,
}

#[derive(Debug, Clone)]
pub(crate) struct ViolationOutcome {
    pub(crate) attempt: Attempt,
    pub(crate) escalation: Escalation,
}

#[derive(Debug, Clone)]
pub(crate) enum StudentStatus {
    NotStarted { remaining_attempts: i64 },
    Attempted { latest: Attempt, remaining_attempts: i64 },
}

pub(crate) async fn start(
    state: &AppState,
    student: &AuthUser,
    assignment_id: &str,
    access_code: Option<&str>,
) -> Result<StartOutcome, AttemptError> {
    let assignment = repositories::assignments::find_by_id(state.db(), assignment_id)
        .await?
        .ok_or(AttemptError::NotFound("Assignment not found"))?;

    let now = primitive_now_utc();
    match policy::window_state(&assignment, now) {
        WindowState::Open => {}
        WindowState::NotActive => {
            return Err(AttemptError::Conflict("Assignment is not active".to_string()))
        }
        WindowState::NotOpenYet => {
            return Err(AttemptError::Conflict("Assignment has not started yet".to_string()))
        }
        WindowState::Closed => {
            return Err(AttemptError::Conflict("Assignment window has ended".to_string()))
        }
    }

    if !repositories::assignments::is_on_roster(state.db(), &assignment.id, &student.id).await? {
        return Err(AttemptError::Forbidden("You are not assigned to this test"));
    }

    if !access_codes::matches(assignment.access_code_hash.as_deref(), access_code) {
        return Err(AttemptError::Forbidden("Invalid access code"));
    }

    let mut tx = state.db().begin().await?;
    repositories::attempts::acquire_student_lock(&mut *tx, &assignment.id, &student.id).await?;

    let mut timed_out = None;
    if let Some(existing) =
        repositories::attempts::find_in_progress(&mut *tx, &assignment.id, &student.id).await?
    {
        if !timing::is_expired(existing.deadline_at, now) {
            tx.commit().await?;
            tracing::info!(
                attempt_id = %existing.id,
                assignment_id = %assignment.id,
                student_id = %student.id,
                "Resumed in-progress attempt"
            );
            let snapshot = load_snapshot(state, existing).await?;
            return Ok(StartOutcome { snapshot, resumed: true });
        }

        timed_out = repositories::attempts::mark_submitted(
            &mut *tx,
            &existing.id,
            existing.deadline_at,
            now,
        )
        .await?;
    }

    let used = repositories::attempts::count_for_student(&mut *tx, &assignment.id, &student.id)
        .await?;
    if used >= i64::from(assignment.max_attempts) {
        tx.commit().await?;
        if let Some(submitted) = timed_out {
            attempt_grading::complete(state, submitted, SubmitTrigger::Deadline).await;
        }
        return Err(AttemptError::Conflict("Maximum number of attempts reached".to_string()));
    }

    let ordinal = used + 1;
    let variant = pick_variant(&mut tx, &assignment, &student.id, ordinal).await?;
    let max_score = round_points(
        variant.questions.0.iter().map(|question| question.points).sum::<Decimal>(),
    );

    let attempt_id = Uuid::new_v4().to_string();
    let created = repositories::attempts::create(
        &mut *tx,
        repositories::attempts::CreateAttempt {
            id: &attempt_id,
            assignment_id: &assignment.id,
            student_id: &student.id,
            attempt_number: ordinal as i32,
            variant_id: &variant.id,
            variant_index: variant.position,
            started_at: now,
            deadline_at: timing::deadline(now, assignment.duration_minutes),
            max_score,
        },
    )
    .await?
    .ok_or_else(|| AttemptError::Conflict("Attempt was started concurrently".to_string()))?;

    tx.commit().await?;

    if let Some(submitted) = timed_out {
        attempt_grading::complete(state, submitted, SubmitTrigger::Deadline).await;
    }

    metrics::counter!("attempts_started_total").increment(1);
    tracing::info!(
        attempt_id = %created.id,
        assignment_id = %assignment.id,
        student_id = %student.id,
        attempt_number = created.attempt_number,
        variant = %variant.label,
        "Attempt started"
    );

    let question_count = variant.questions.0.len() as i64;
    state
        .progress()
        .notify(ProgressEvent::for_attempt(ProgressEventKind::Started, &created, 0, question_count))
        .await;

    Ok(StartOutcome {
        snapshot: AttemptSnapshot { attempt: created, variant, answers: Vec::new() },
        resumed: false,
    })
}

async fn pick_variant(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    assignment: &Assignment,
    student_id: &str,
    ordinal: i64,
) -> Result<GeneratedTestVariant, AttemptError> {
    let variant_count =
        repositories::generated_tests::count_variants(&mut **tx, &assignment.generated_test_id)
            .await?;
    if variant_count <= 0 {
        return Err(AttemptError::Conflict("Generated test has no variants".to_string()));
    }

    let index = policy::variant_index(
        student_id,
        &assignment.id,
        ordinal as u32,
        variant_count as u32,
        assignment.shuffle_per_student,
    );

    repositories::generated_tests::find_variant_by_position(
        &mut **tx,
        &assignment.generated_test_id,
        index as i32,
    )
    .await?
    .ok_or_else(|| AttemptError::Conflict(format!("Variant {index} is missing")))
}

/// Loads an attempt for its owner, the assignment owner or an admin.
pub(crate) async fn get(
    state: &AppState,
    viewer: &AuthUser,
    attempt_id: &str,
) -> Result<AttemptSnapshot, AttemptError> {
    let attempt = repositories::attempts::find_by_id(state.db(), attempt_id)
        .await?
        .ok_or(AttemptError::NotFound("Attempt not found"))?;

    if attempt.student_id != viewer.id {
        ensure_assignment_owner(state, viewer, &attempt.assignment_id).await?;
    }

    load_snapshot(state, attempt).await
}

pub(crate) async fn load_snapshot(
    state: &AppState,
    attempt: Attempt,
) -> Result<AttemptSnapshot, AttemptError> {
    let variant = repositories::generated_tests::fetch_variant(state.db(), &attempt.variant_id)
        .await?;
    let answers = repositories::answers::list_by_attempt(state.db(), &attempt.id).await?;
    Ok(AttemptSnapshot { attempt, variant, answers })
}

pub(crate) async fn ensure_assignment_owner(
    state: &AppState,
    viewer: &AuthUser,
    assignment_id: &str,
) -> Result<Assignment, AttemptError> {
    let assignment = repositories::assignments::find_by_id(state.db(), assignment_id)
        .await?
        .ok_or(AttemptError::NotFound("Assignment not found"))?;

    if assignment.owner_id != viewer.id && !viewer.is_admin() {
        return Err(AttemptError::Forbidden("Not allowed to access this attempt"));
    }
    Ok(assignment)
}

/// Locks the attempt and checks it still accepts student input. An attempt
/// past its deadline is submitted at the deadline, graded, and reported as
/// `TimeExpired`.
async fn begin_write(
    state: &AppState,
    student: &AuthUser,
    attempt_id: &str,
) -> Result<(sqlx::Transaction<'static, sqlx::Postgres>, Attempt), AttemptError> {
    let mut tx = state.db().begin().await?;
    let attempt = repositories::attempts::lock_by_id(&mut *tx, attempt_id)
        .await?
        .ok_or(AttemptError::NotFound("Attempt not found"))?;

    if attempt.student_id != student.id {
        return Err(AttemptError::Forbidden("Not your attempt"));
    }
    ensure_in_progress(&attempt)?;

    let now = primitive_now_utc();
    if timing::is_expired(attempt.deadline_at, now) {
        let submitted =
            repositories::attempts::mark_submitted(&mut *tx, &attempt.id, attempt.deadline_at, now)
                .await?;
        tx.commit().await?;

        if let Some(submitted) = submitted {
            tracing::info!(
                attempt_id = %submitted.id,
                deadline_at = %submitted.deadline_at,
                "Write arrived after deadline; attempt closed"
            );
            attempt_grading::complete(state, submitted, SubmitTrigger::Deadline).await;
        }
        return Err(AttemptError::TimeExpired);
    }

    Ok((tx, attempt))
}

fn ensure_in_progress(attempt: &Attempt) -> Result<(), AttemptError> {
    if attempt.status == AttemptStatus::InProgress {
        Ok(())
    } else {
        Err(AttemptError::Conflict(format!(
            "Attempt is {}, not in progress",
            attempt.status.as_str()
        )))
    }
}

async fn upsert_one(
    executor: impl sqlx::PgExecutor<'_>,
    attempt: &Attempt,
    variant: &GeneratedTestVariant,
    input: &AnswerInput,
) -> Result<AttemptAnswer, AttemptError> {
    let question = variant.question(&input.question_id).ok_or_else(|| {
        AttemptError::Validation(format!(
            "Question {} is not part of this attempt",
            input.question_id
        ))
    })?;

    if input.time_spent_seconds.is_some_and(|seconds| seconds < 0) {
        return Err(AttemptError::Validation("time_spent_seconds must not be negative".into()));
    }

    let value = AnswerValue::parse(question.payload.question_type(), &input.value)
        .map_err(|err| AttemptError::Validation(err.to_string()))?;

    let answer_id = Uuid::new_v4().to_string();
    let saved = repositories::answers::upsert(
        executor,
        repositories::answers::UpsertAnswer {
            id: &answer_id,
            attempt_id: &attempt.id,
            question_id: &question.question_id,
            value: value.as_ref(),
            max_points: question.points,
            time_spent_seconds: input.time_spent_seconds,
            bookmarked: input.bookmarked,
            saved_at: primitive_now_utc(),
        },
    )
    .await?;
    Ok(saved)
}

pub(crate) async fn save_answer(
    state: &AppState,
    student: &AuthUser,
    attempt_id: &str,
    input: AnswerInput,
) -> Result<AttemptAnswer, AttemptError> {
    let (mut tx, attempt) = begin_write(state, student, attempt_id).await?;
    let variant = repositories::generated_tests::fetch_variant(&mut *tx, &attempt.variant_id).await?;

    let saved = match upsert_one(&mut *tx, &attempt, &variant, &input).await {
        Ok(saved) => saved,
        Err(err) => {
            metrics::counter!("answers_saved_total", "result" => "rejected").increment(1);
            return Err(err);
        }
    };
    tx.commit().await?;

    metrics::counter!("answers_saved_total", "result" => "ok").increment(1);
    tracing::debug!(attempt_id = %attempt.id, question_id = %saved.question_id, "Answer saved");
    notify_progress(state, ProgressEventKind::AnswerSaved, &attempt, &variant).await;

    Ok(saved)
}

/// Saves several answers; a malformed entry is reported and skipped without
/// affecting its siblings.
pub(crate) async fn save_answers(
    state: &AppState,
    student: &AuthUser,
    attempt_id: &str,
    inputs: Vec<AnswerInput>,
) -> Result<BatchOutcome, AttemptError> {
    let (mut tx, attempt) = begin_write(state, student, attempt_id).await?;
    let variant = repositories::generated_tests::fetch_variant(&mut *tx, &attempt.variant_id).await?;

    let mut outcome = BatchOutcome::default();
    for input in &inputs {
        let mut savepoint = tx.begin().await?;
        match upsert_one(&mut *savepoint, &attempt, &variant, input).await {
            Ok(saved) => {
                savepoint.commit().await?;
                outcome.saved.push(saved);
            }
            Err(err) => {
                savepoint.rollback().await?;
                outcome
                    .failed
                    .push(BatchFailure { question_id: input.question_id.clone(), detail: err.to_string() });
            }
        }
    }
    tx.commit().await?;

    metrics::counter!("answers_saved_total", "result" => "ok")
        .increment(outcome.saved.len() as u64);
    metrics::counter!("answers_saved_total", "result" => "rejected")
        .increment(outcome.failed.len() as u64);
    tracing::info!(
        attempt_id = %attempt.id,
        saved = outcome.saved.len(),
        failed = outcome.failed.len(),
        "Answer batch processed"
    );

    if !outcome.saved.is_empty() {
        notify_progress(state, ProgressEventKind::AnswerSaved, &attempt, &variant).await;
    }
    Ok(outcome)
}

pub(crate) async fn report_violation(
    state: &AppState,
    student: &AuthUser,
    attempt_id: &str,
) -> Result<ViolationOutcome, AttemptError> {
    let (mut tx, attempt) = begin_write(state, student, attempt_id).await?;
    let assignment =
        repositories::assignments::fetch_one_by_id(&mut *tx, &attempt.assignment_id).await?;

    let now = primitive_now_utc();
    let counted = repositories::attempts::increment_violations(&mut *tx, &attempt.id, now)
        .await?
        .ok_or_else(|| AttemptError::Conflict("Attempt is no longer in progress".into()))?;

    let escalation = policy::escalation(
        counted.violation_count,
        assignment.tab_switch_threshold,
        assignment.tab_switch_action,
    );

    let mut current = counted;
    let mut auto_submitted = None;
    match escalation {
        Escalation::None | Escalation::Warn => {}
        Escalation::Flag => {
            let reason =
                policy::flag_reason(current.violation_count, assignment.tab_switch_threshold);
            if let Some(flagged) =
                repositories::attempts::set_flag(&mut *tx, &current.id, &reason, now).await?
            {
                current = flagged;
            }
        }
        Escalation::AutoSubmit => {
            let reason =
                policy::flag_reason(current.violation_count, assignment.tab_switch_threshold);
            repositories::attempts::set_flag(&mut *tx, &current.id, &reason, now).await?;
            auto_submitted =
                repositories::attempts::mark_submitted(&mut *tx, &current.id, now, now).await?;
        }
    }
    tx.commit().await?;

    metrics::counter!("integrity_violations_total", "action" => escalation.as_str()).increment(1);
    tracing::info!(
        attempt_id = %current.id,
        violations = current.violation_count,
        threshold = assignment.tab_switch_threshold,
        action = escalation.as_str(),
        "Integrity violation recorded"
    );

    let variant =
        repositories::generated_tests::fetch_variant(state.db(), &current.variant_id).await?;
    match auto_submitted {
        Some(submitted) => {
            notify_progress(state, ProgressEventKind::Violation, &submitted, &variant).await;
            current = attempt_grading::complete(state, submitted, SubmitTrigger::Integrity).await;
        }
        None => notify_progress(state, ProgressEventKind::Violation, &current, &variant).await,
    }

    Ok(ViolationOutcome { attempt: current, escalation })
}

pub(crate) async fn submit(
    state: &AppState,
    student: &AuthUser,
    attempt_id: &str,
) -> Result<Attempt, AttemptError> {
    let attempt = repositories::attempts::find_by_id(state.db(), attempt_id)
        .await?
        .ok_or(AttemptError::NotFound("Attempt not found"))?;

    if attempt.student_id != student.id {
        return Err(AttemptError::Forbidden("Not your attempt"));
    }
    ensure_in_progress(&attempt)?;

    let now = primitive_now_utc();
    let (submitted_at, trigger) = if timing::is_expired(attempt.deadline_at, now) {
        (attempt.deadline_at, SubmitTrigger::Deadline)
    } else {
        (now, SubmitTrigger::Student)
    };

    attempt_grading::finalize(state, &attempt.id, submitted_at, trigger)
        .await?
        .ok_or_else(|| AttemptError::Conflict("Attempt was already submitted".to_string()))
}

pub(crate) async fn student_status(
    state: &AppState,
    student: &AuthUser,
    assignment_id: &str,
) -> Result<StudentStatus, AttemptError> {
    let assignment = repositories::assignments::find_by_id(state.db(), assignment_id)
        .await?
        .ok_or(AttemptError::NotFound("Assignment not found"))?;

    if !repositories::assignments::is_on_roster(state.db(), &assignment.id, &student.id).await? {
        return Err(AttemptError::Forbidden("You are not assigned to this test"));
    }

    let used =
        repositories::attempts::count_for_student(state.db(), &assignment.id, &student.id).await?;
    let remaining_attempts = (i64::from(assignment.max_attempts) - used).max(0);

    let latest =
        repositories::attempts::find_latest_for_student(state.db(), &assignment.id, &student.id)
            .await?;
    Ok(match latest {
        None => StudentStatus::NotStarted { remaining_attempts },
        Some(latest) => StudentStatus::Attempted { latest, remaining_attempts },
    })
}

pub(crate) async fn notify_progress(
    state: &AppState,
    kind: ProgressEventKind,
    attempt: &Attempt,
    variant: &GeneratedTestVariant,
) {
    let answered = match repositories::answers::count_answered(state.db(), &attempt.id).await {
        Ok(count) => count,
        Err(err) => {
            tracing::warn!(error = %err, attempt_id = %attempt.id, "Failed to count answers");
            0
        }
    };
    let question_count = variant.questions.0.len() as i64;
    state
        .progress()
        .notify(ProgressEvent::for_attempt(kind, attempt, answered, question_count))
        .await;
}
