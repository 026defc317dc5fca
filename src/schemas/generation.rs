use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_optional;
use crate::db::models::VariantQuestion;
use crate::db::payloads::QuestionPayload;
use crate::db::types::{DifficultyLevel, GenerationMode, QuestionType};
use crate::services::generation::variants::GeneratedVariant;
use crate::services::generation::{GenerationOutcome, GenerationRequest, QuestionSource};
use crate::services::grading::round_points;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub(crate) struct DifficultySplit {
    pub(crate) easy: u32,
    pub(crate) medium: u32,
    pub(crate) hard: u32,
}

impl DifficultySplit {
    fn from_array(values: [u32; 3]) -> Self {
        Self { easy: values[0], medium: values[1], hard: values[2] }
    }

    fn to_array(self) -> [u32; 3] {
        [self.easy, self.medium, self.hard]
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct GenerateTestRequest {
    #[serde(default)]
    #[validate(length(max = 255, message = "title must be at most 255 characters"))]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) subject_id: Option<String>,
    #[serde(default)]
    pub(crate) topic_id: Option<String>,
    #[serde(default)]
    pub(crate) count: Option<u32>,
    #[serde(default)]
    pub(crate) distribution: Option<DifficultySplit>,
    #[serde(default)]
    pub(crate) question_ids: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub(crate) shuffle_questions: bool,
    #[serde(default = "default_true")]
    pub(crate) shuffle_options: bool,
    #[serde(default = "default_variant_count")]
    #[validate(range(min = 1, max = 10, message = "variant_count must be between 1 and 10"))]
    pub(crate) variant_count: u32,
    #[serde(default)]
    pub(crate) seed: Option<u64>,
    #[serde(default)]
    pub(crate) preview: bool,
}

fn default_true() -> bool {
    true
}

fn default_variant_count() -> u32 {
    1
}

impl GenerateTestRequest {
    pub(crate) fn into_request(self) -> Result<GenerationRequest, String> {
        let source = match self.question_ids {
            Some(question_ids) => {
                if self.count.is_some() || self.distribution.is_some() {
                    return Err(
                        "question_ids cannot be combined with count or distribution".to_string()
                    );
                }
                QuestionSource::Manual { question_ids }
            }
            None => {
                let count = self.count.ok_or("count is required without question_ids")?;
                let distribution =
                    self.distribution.ok_or("distribution is required without question_ids")?;
                QuestionSource::Scope {
                    subject_id: self.subject_id,
                    topic_id: self.topic_id,
                    count,
                    percentages: distribution.to_array(),
                }
            }
        };

        Ok(GenerationRequest {
            title: self.title,
            source,
            shuffle_questions: self.shuffle_questions,
            shuffle_options: self.shuffle_options,
            variant_count: self.variant_count,
            seed: self.seed,
            preview: self.preview,
        })
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct VariantQuestionResponse {
    pub(crate) question_id: String,
    pub(crate) version: i32,
    pub(crate) prompt: String,
    pub(crate) question_type: QuestionType,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) points: Decimal,
    pub(crate) payload: QuestionPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) option_order: Option<Vec<String>>,
    pub(crate) answer_key: String,
}

impl From<VariantQuestion> for VariantQuestionResponse {
    fn from(question: VariantQuestion) -> Self {
        Self {
            question_type: question.payload.question_type(),
            question_id: question.question_id,
            version: question.version,
            prompt: question.prompt,
            difficulty: question.difficulty,
            points: round_points(question.points),
            payload: question.payload,
            option_order: question.option_order,
            answer_key: question.answer_key,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct VariantResponse {
    pub(crate) id: Option<String>,
    pub(crate) label: String,
    pub(crate) answer_key: Vec<String>,
    pub(crate) questions: Vec<VariantQuestionResponse>,
}

impl From<GeneratedVariant> for VariantResponse {
    fn from(variant: GeneratedVariant) -> Self {
        Self {
            id: variant.id,
            label: variant.label,
            answer_key: variant.questions.iter().map(|q| q.answer_key.clone()).collect(),
            questions: variant.questions.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct GeneratedTestResponse {
    pub(crate) id: Option<String>,
    pub(crate) title: String,
    pub(crate) mode: GenerationMode,
    pub(crate) preview: bool,
    pub(crate) requested_count: u32,
    pub(crate) distribution: DifficultySplit,
    pub(crate) counts: DifficultySplit,
    pub(crate) seed: u64,
    pub(crate) shuffle_questions: bool,
    pub(crate) shuffle_options: bool,
    pub(crate) created_at: Option<String>,
    pub(crate) variants: Vec<VariantResponse>,
}

impl From<GenerationOutcome> for GeneratedTestResponse {
    fn from(outcome: GenerationOutcome) -> Self {
        Self {
            preview: outcome.generated_test_id.is_none(),
            id: outcome.generated_test_id,
            title: outcome.title,
            mode: outcome.mode,
            requested_count: outcome.requested_count,
            distribution: DifficultySplit::from_array(outcome.percentages),
            counts: DifficultySplit::from_array(outcome.counts),
            seed: outcome.seed,
            shuffle_questions: outcome.shuffle_questions,
            shuffle_options: outcome.shuffle_options,
            created_at: format_optional(outcome.created_at),
            variants: outcome.variants.into_iter().map(Into::into).collect(),
        }
    }
}
