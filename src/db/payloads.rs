//! Typed question and answer payloads stored in JSONB columns.
//!
//! Every question type has its own payload shape, validated when the row is
//! decoded, so generation and grading never parse raw JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::db::types::QuestionType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum QuestionPayload {
    SingleChoice(ChoiceOptions),
    MultiChoice(ChoiceOptions),
    TrueFalse(TrueFalseKey),
    Matching(MatchingPairs),
    Ordering(OrderingSequence),
    ShortAnswer(FreeText),
    Essay(FreeText),
    FillBlank(FreeText),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ChoiceOptions {
    pub(crate) options: Vec<QuestionOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct QuestionOption {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) text: String,
    #[serde(default)]
    pub(crate) is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TrueFalseKey {
    pub(crate) correct: TruthValue,
}

/// Question banks store the key either as a JSON boolean or as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum TruthValue {
    Bool(bool),
    Text(String),
}

impl TruthValue {
    pub(crate) fn normalized(&self) -> String {
        match self {
            Self::Bool(value) => value.to_string(),
            Self::Text(value) => value.trim().to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct MatchingPairs {
    pub(crate) pairs: Vec<MatchingPair>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct MatchingPair {
    pub(crate) left: String,
    pub(crate) right: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct OrderingSequence {
    pub(crate) sequence: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub(crate) struct FreeText {
    #[serde(default)]
    pub(crate) reference_answer: Option<String>,
}

impl QuestionPayload {
    pub(crate) fn question_type(&self) -> QuestionType {
        match self {
            Self::SingleChoice(_) => QuestionType::SingleChoice,
            Self::MultiChoice(_) => QuestionType::MultiChoice,
            Self::TrueFalse(_) => QuestionType::TrueFalse,
            Self::Matching(_) => QuestionType::Matching,
            Self::Ordering(_) => QuestionType::Ordering,
            Self::ShortAnswer(_) => QuestionType::ShortAnswer,
            Self::Essay(_) => QuestionType::Essay,
            Self::FillBlank(_) => QuestionType::FillBlank,
        }
    }

    #[cfg(test)]
    pub(crate) fn choice_options(&self) -> Option<&ChoiceOptions> {
        match self {
            Self::SingleChoice(choices) | Self::MultiChoice(choices) => Some(choices),
            _ => None,
        }
    }

    pub(crate) fn choice_options_mut(&mut self) -> Option<&mut ChoiceOptions> {
        match self {
            Self::SingleChoice(choices) | Self::MultiChoice(choices) => Some(choices),
            _ => None,
        }
    }

    /// Closed-option payloads the variant generator can key automatically.
    pub(crate) fn is_generator_usable(&self) -> bool {
        match self {
            Self::SingleChoice(choices) | Self::MultiChoice(choices) => choices.is_well_formed(),
            Self::TrueFalse(key) => matches!(key.correct.normalized().as_str(), "true" | "false"),
            _ => false,
        }
    }
}

impl ChoiceOptions {
    pub(crate) fn is_well_formed(&self) -> bool {
        self.options.len() >= 2
            && self.options.iter().all(|option| !option.text.trim().is_empty())
            && self.options.iter().any(|option| option.is_correct)
    }

    pub(crate) fn correct_ids(&self) -> impl Iterator<Item = &str> {
        self.options.iter().filter(|option| option.is_correct).map(|option| option.id.as_str())
    }
}

/// A student's response, normalised for the question type it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub(crate) enum AnswerValue {
    Choice(String),
    Choices(Vec<String>),
    Truth(String),
    Pairs(BTreeMap<String, String>),
    Sequence(Vec<String>),
    Text(String),
}

#[derive(Debug, Error, PartialEq)]
#[error("expected {expected} for a {question_type:?} question")]
pub(crate) struct AnswerParseError {
    pub(crate) question_type: QuestionType,
    pub(crate) expected: &'static str,
}

impl AnswerValue {
    /// Parses a raw client value. `Ok(None)` means the question was left unanswered.
    pub(crate) fn parse(
        question_type: QuestionType,
        raw: &Value,
    ) -> Result<Option<Self>, AnswerParseError> {
        if raw.is_null() {
            return Ok(None);
        }

        let fail = |expected| AnswerParseError { question_type, expected };

        let parsed = match question_type {
            QuestionType::SingleChoice => {
                let id = raw.as_str().ok_or_else(|| fail("an option id string"))?;
                Self::Choice(id.to_string())
            }
            QuestionType::MultiChoice => {
                Self::Choices(string_list(raw).ok_or_else(|| fail("a list of option ids"))?)
            }
            QuestionType::TrueFalse => match raw {
                Value::Bool(value) => Self::Truth(value.to_string()),
                Value::String(text) => Self::Truth(text.trim().to_lowercase()),
                _ => return Err(fail("a boolean or \"true\"/\"false\"")),
            },
            QuestionType::Matching => {
                let object = raw.as_object().ok_or_else(|| fail("an object of pairs"))?;
                let mut pairs = BTreeMap::new();
                for (left, right) in object {
                    let right = right.as_str().ok_or_else(|| fail("string pair values"))?;
                    pairs.insert(left.clone(), right.to_string());
                }
                Self::Pairs(pairs)
            }
            QuestionType::Ordering => {
                Self::Sequence(string_list(raw).ok_or_else(|| fail("a list of item ids"))?)
            }
            QuestionType::ShortAnswer | QuestionType::Essay | QuestionType::FillBlank => {
                let text = raw.as_str().ok_or_else(|| fail("a text answer"))?;
                Self::Text(text.to_string())
            }
        };

        Ok(Some(parsed))
    }

    /// The value as the client submitted it, without the storage tag.
    pub(crate) fn to_client_json(&self) -> Value {
        match self {
            Self::Choice(value) | Self::Truth(value) | Self::Text(value) => {
                Value::String(value.clone())
            }
            Self::Choices(values) | Self::Sequence(values) => {
                Value::Array(values.iter().cloned().map(Value::String).collect())
            }
            Self::Pairs(pairs) => Value::Object(
                pairs.iter().map(|(left, right)| (left.clone(), Value::String(right.clone()))).collect(),
            ),
        }
    }
}

fn string_list(raw: &Value) -> Option<Vec<String>> {
    raw.as_array()?.iter().map(|item| item.as_str().map(str::to_string)).collect()
}
