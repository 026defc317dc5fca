use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::PrimitiveDateTime;
use validator::Validate;

use crate::core::time::{format_optional, format_primitive};
use crate::db::models::{Attempt, AttemptAnswer, VariantQuestion};
use crate::db::payloads::QuestionPayload;
use crate::db::types::{AttemptStatus, QuestionType};
use crate::services::attempts::timing::remaining_seconds;
use crate::services::grading::round_points;
use crate::services::attempts::{AnswerInput, AttemptSnapshot, BatchOutcome, ViolationOutcome};

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResponse {
    pub(crate) id: String,
    pub(crate) assignment_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) variant_index: i32,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: String,
    pub(crate) deadline_at: String,
    pub(crate) submitted_at: Option<String>,
    pub(crate) graded_at: Option<String>,
    pub(crate) remaining_seconds: i64,
    pub(crate) raw_score: Option<Decimal>,
    pub(crate) max_score: Decimal,
    pub(crate) percentage: Option<Decimal>,
    pub(crate) violation_count: i32,
    pub(crate) flagged: bool,
    pub(crate) flag_reason: Option<String>,
}

impl AttemptResponse {
    /// `remaining_seconds` is derived from `now`; it is zero once the attempt
    /// has left `in_progress`.
    pub(crate) fn from_db(attempt: &Attempt, now: PrimitiveDateTime) -> Self {
        let remaining = if attempt.status == AttemptStatus::InProgress {
            remaining_seconds(attempt.deadline_at, now)
        } else {
            0
        };

        Self {
            id: attempt.id.clone(),
            assignment_id: attempt.assignment_id.clone(),
            student_id: attempt.student_id.clone(),
            attempt_number: attempt.attempt_number,
            variant_index: attempt.variant_index,
            status: attempt.status,
            started_at: format_primitive(attempt.started_at),
            deadline_at: format_primitive(attempt.deadline_at),
            submitted_at: format_optional(attempt.submitted_at),
            graded_at: format_optional(attempt.graded_at),
            remaining_seconds: remaining,
            raw_score: attempt.raw_score.map(round_points),
            max_score: round_points(attempt.max_score),
            percentage: attempt.percentage.map(round_points),
            violation_count: attempt.violation_count,
            flagged: attempt.flagged,
            flag_reason: attempt.flag_reason.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ChoiceView {
    pub(crate) id: String,
    pub(crate) text: String,
}

/// Question content with every correctness marker removed.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum QuestionContent {
    Choices { options: Vec<ChoiceView>, multiple: bool },
    TrueFalse,
    Matching { left: Vec<String>, right: Vec<String> },
    Ordering { items: Vec<String> },
    FreeText,
}

impl From<&QuestionPayload> for QuestionContent {
    fn from(payload: &QuestionPayload) -> Self {
        match payload {
            QuestionPayload::SingleChoice(choices) | QuestionPayload::MultiChoice(choices) => {
                Self::Choices {
                    options: choices
                        .options
                        .iter()
                        .map(|option| ChoiceView { id: option.id.clone(), text: option.text.clone() })
                        .collect(),
                    multiple: matches!(payload, QuestionPayload::MultiChoice(_)),
                }
            }
            QuestionPayload::TrueFalse(_) => Self::TrueFalse,
            QuestionPayload::Matching(matching) => {
                let left = matching.pairs.iter().map(|pair| pair.left.clone()).collect();
                let mut right: Vec<String> =
                    matching.pairs.iter().map(|pair| pair.right.clone()).collect();
                right.sort();
                Self::Matching { left, right }
            }
            QuestionPayload::Ordering(ordering) => {
                let mut items = ordering.sequence.clone();
                items.sort();
                Self::Ordering { items }
            }
            QuestionPayload::ShortAnswer(_)
            | QuestionPayload::Essay(_)
            | QuestionPayload::FillBlank(_) => Self::FreeText,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptQuestionResponse {
    pub(crate) question_id: String,
    pub(crate) position: usize,
    pub(crate) prompt: String,
    pub(crate) question_type: QuestionType,
    pub(crate) points: Decimal,
    pub(crate) content: QuestionContent,
}

impl AttemptQuestionResponse {
    fn from_variant(position: usize, question: &VariantQuestion) -> Self {
        Self {
            question_id: question.question_id.clone(),
            position,
            prompt: question.prompt.clone(),
            question_type: question.payload.question_type(),
            points: round_points(question.points),
            content: QuestionContent::from(&question.payload),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerResponse {
    pub(crate) id: String,
    pub(crate) question_id: String,
    pub(crate) value: Option<Value>,
    pub(crate) time_spent_seconds: Option<i32>,
    pub(crate) bookmarked: bool,
    pub(crate) saved_at: String,
    pub(crate) max_points: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) score: Option<AnswerScoreResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerScoreResponse {
    pub(crate) earned_points: Decimal,
    pub(crate) is_correct: bool,
    pub(crate) is_partial: bool,
    pub(crate) needs_manual: bool,
    pub(crate) feedback: Option<String>,
    pub(crate) graded_at: Option<String>,
}

impl AnswerResponse {
    /// Scores are only included once grading has produced them.
    pub(crate) fn from_db(answer: &AttemptAnswer, reveal_scores: bool) -> Self {
        let score = (reveal_scores && answer.graded_at.is_some()).then(|| AnswerScoreResponse {
            earned_points: round_points(answer.earned_points),
            is_correct: answer.is_correct,
            is_partial: answer.is_partial,
            needs_manual: answer.needs_manual,
            feedback: answer.feedback.clone(),
            graded_at: format_optional(answer.graded_at),
        });

        Self {
            id: answer.id.clone(),
            question_id: answer.question_id.clone(),
            value: answer.answer().map(|value| value.to_client_json()),
            time_spent_seconds: answer.time_spent_seconds,
            bookmarked: answer.bookmarked,
            saved_at: format_primitive(answer.saved_at),
            max_points: round_points(answer.max_points),
            score,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptDetailResponse {
    #[serde(flatten)]
    pub(crate) attempt: AttemptResponse,
    pub(crate) variant_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) resumed: Option<bool>,
    pub(crate) questions: Vec<AttemptQuestionResponse>,
    pub(crate) answers: Vec<AnswerResponse>,
}

impl AttemptDetailResponse {
    pub(crate) fn from_snapshot(
        snapshot: &AttemptSnapshot,
        now: PrimitiveDateTime,
        resumed: Option<bool>,
    ) -> Self {
        let reveal = snapshot.attempt.status.is_scored();
        Self {
            attempt: AttemptResponse::from_db(&snapshot.attempt, now),
            variant_label: snapshot.variant.label.clone(),
            resumed,
            questions: snapshot
                .variant
                .questions
                .0
                .iter()
                .enumerate()
                .map(|(position, question)| AttemptQuestionResponse::from_variant(position, question))
                .collect(),
            answers: snapshot.answers.iter().map(|answer| AnswerResponse::from_db(answer, reveal)).collect(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AnswerSaveRequest {
    #[serde(default)]
    pub(crate) value: Value,
    #[serde(default)]
    #[validate(range(min = 0, message = "time_spent_seconds must be non-negative"))]
    pub(crate) time_spent_seconds: Option<i32>,
    #[serde(default)]
    pub(crate) bookmarked: bool,
}

impl AnswerSaveRequest {
    pub(crate) fn into_input(self, question_id: String) -> AnswerInput {
        AnswerInput {
            question_id,
            value: self.value,
            time_spent_seconds: self.time_spent_seconds,
            bookmarked: self.bookmarked,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct BatchAnswerItem {
    pub(crate) question_id: String,
    #[serde(default)]
    pub(crate) value: Value,
    #[serde(default)]
    pub(crate) time_spent_seconds: Option<i32>,
    #[serde(default)]
    pub(crate) bookmarked: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct BatchAnswerRequest {
    #[validate(length(min = 1, max = 200, message = "answers must hold 1..=200 entries"))]
    pub(crate) answers: Vec<BatchAnswerItem>,
}

impl BatchAnswerRequest {
    pub(crate) fn into_inputs(self) -> Vec<AnswerInput> {
        self.answers
            .into_iter()
            .map(|item| AnswerInput {
                question_id: item.question_id,
                value: item.value,
                time_spent_seconds: item.time_spent_seconds,
                bookmarked: item.bookmarked,
            })
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct BatchFailureResponse {
    pub(crate) question_id: String,
    pub(crate) detail: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct BatchAnswerResponse {
    pub(crate) saved_count: usize,
    pub(crate) failed_count: usize,
    pub(crate) answers: Vec<AnswerResponse>,
    pub(crate) failures: Vec<BatchFailureResponse>,
}

impl From<BatchOutcome> for BatchAnswerResponse {
    fn from(outcome: BatchOutcome) -> Self {
        Self {
            saved_count: outcome.saved.len(),
            failed_count: outcome.failed.len(),
            answers: outcome.saved.iter().map(|answer| AnswerResponse::from_db(answer, false)).collect(),
            failures: outcome
                .failed
                .into_iter()
                .map(|failure| BatchFailureResponse {
                    question_id: failure.question_id,
                    detail: failure.detail,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ViolationResponse {
    pub(crate) violation_count: i32,
    pub(crate) action: &'static str,
    pub(crate) auto_submitted: bool,
    pub(crate) attempt: AttemptResponse,
}

impl ViolationResponse {
    pub(crate) fn from_outcome(outcome: &ViolationOutcome, now: PrimitiveDateTime) -> Self {
        Self {
            violation_count: outcome.attempt.violation_count,
            action: outcome.escalation.as_str(),
            auto_submitted: outcome.attempt.status != AttemptStatus::InProgress,
            attempt: AttemptResponse::from_db(&outcome.attempt, now),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ManualGradeRequest {
    pub(crate) score: Decimal,
    #[serde(default)]
    #[validate(length(max = 5000, message = "feedback must be at most 5000 characters"))]
    pub(crate) feedback: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ManualGradeResponse {
    pub(crate) answer: AnswerResponse,
    pub(crate) attempt: AttemptResponse,
}
