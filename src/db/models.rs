use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::payloads::{AnswerValue, QuestionPayload};
use crate::db::types::{
    AssignmentStatus, AttemptStatus, DifficultyLevel, GenerationMode, IntegrityAction,
    QuestionType,
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) owner_id: String,
    pub(crate) subject_id: Option<String>,
    pub(crate) topic_id: Option<String>,
    pub(crate) prompt: String,
    pub(crate) question_type: QuestionType,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) points: Decimal,
    pub(crate) payload: Json<QuestionPayload>,
    pub(crate) version: i32,
    pub(crate) is_public: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct GeneratedTest {
    pub(crate) id: String,
    pub(crate) owner_id: String,
    pub(crate) title: String,
    pub(crate) mode: GenerationMode,
    pub(crate) subject_id: Option<String>,
    pub(crate) topic_id: Option<String>,
    pub(crate) requested_count: i32,
    pub(crate) easy_pct: i32,
    pub(crate) medium_pct: i32,
    pub(crate) hard_pct: i32,
    pub(crate) easy_count: i32,
    pub(crate) medium_count: i32,
    pub(crate) hard_count: i32,
    pub(crate) shuffle_questions: bool,
    pub(crate) shuffle_options: bool,
    pub(crate) variant_count: i32,
    pub(crate) seed: i64,
    pub(crate) created_at: PrimitiveDateTime,
}

/// A question as it was frozen into a variant at generation time.
///
/// `payload` holds the options in the order shown to students, so
/// `answer_key` labels index straight into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct VariantQuestion {
    pub(crate) question_id: String,
    pub(crate) version: i32,
    pub(crate) prompt: String,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) points: Decimal,
    pub(crate) payload: QuestionPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) option_order: Option<Vec<String>>,
    pub(crate) answer_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct GeneratedTestVariant {
    pub(crate) id: String,
    pub(crate) generated_test_id: String,
    pub(crate) label: String,
    pub(crate) position: i32,
    pub(crate) questions: Json<Vec<VariantQuestion>>,
    pub(crate) created_at: PrimitiveDateTime,
}

impl GeneratedTestVariant {
    pub(crate) fn question(&self, question_id: &str) -> Option<&VariantQuestion> {
        self.questions.0.iter().find(|question| question.question_id == question_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Assignment {
    pub(crate) id: String,
    pub(crate) generated_test_id: String,
    pub(crate) owner_id: String,
    pub(crate) title: String,
    pub(crate) status: AssignmentStatus,
    pub(crate) starts_at: PrimitiveDateTime,
    pub(crate) ends_at: PrimitiveDateTime,
    pub(crate) duration_minutes: i32,
    pub(crate) max_attempts: i32,
    pub(crate) shuffle_per_student: bool,
    pub(crate) access_code_hash: Option<String>,
    pub(crate) tab_switch_threshold: i32,
    pub(crate) tab_switch_action: IntegrityAction,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) closed_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Attempt {
    pub(crate) id: String,
    pub(crate) assignment_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) variant_id: String,
    pub(crate) variant_index: i32,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) deadline_at: PrimitiveDateTime,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) graded_at: Option<PrimitiveDateTime>,
    pub(crate) raw_score: Option<Decimal>,
    pub(crate) max_score: Decimal,
    pub(crate) percentage: Option<Decimal>,
    pub(crate) violation_count: i32,
    pub(crate) flagged: bool,
    pub(crate) flag_reason: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct AttemptAnswer {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) value: Option<Json<AnswerValue>>,
    pub(crate) is_correct: bool,
    pub(crate) is_partial: bool,
    pub(crate) needs_manual: bool,
    pub(crate) earned_points: Decimal,
    pub(crate) max_points: Decimal,
    pub(crate) time_spent_seconds: Option<i32>,
    pub(crate) bookmarked: bool,
    pub(crate) feedback: Option<String>,
    pub(crate) graded_by: Option<String>,
    pub(crate) saved_at: PrimitiveDateTime,
    pub(crate) graded_at: Option<PrimitiveDateTime>,
}

impl AttemptAnswer {
    pub(crate) fn answer(&self) -> Option<&AnswerValue> {
        self.value.as_ref().map(|value| &value.0)
    }
}
