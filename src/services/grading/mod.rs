//! Per-question scoring rules and attempt aggregation.
//!
//! Everything here is pure; persistence lives in `services::attempt_grading`.

pub(crate) mod aggregate;
pub(crate) mod rules;

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

use crate::db::payloads::{AnswerValue, QuestionPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GradeOutcome {
    pub(crate) earned: Decimal,
    pub(crate) is_correct: bool,
    pub(crate) is_partial: bool,
    pub(crate) needs_manual: bool,
}

impl GradeOutcome {
    pub(crate) fn unanswered() -> Self {
        Self {
            earned: round_points(Decimal::ZERO),
            is_correct: false,
            is_partial: false,
            needs_manual: false,
        }
    }

    pub(crate) fn full(points: Decimal) -> Self {
        Self {
            earned: round_points(points),
            is_correct: true,
            is_partial: false,
            needs_manual: false,
        }
    }

    /// Scales `points` by `ratio` and derives the partial flag from the result.
    pub(crate) fn scaled(points: Decimal, ratio: Decimal) -> Self {
        let earned = round_points(points * ratio);
        let full = round_points(points);
        Self {
            earned,
            is_correct: earned == full && ratio == Decimal::ONE,
            is_partial: earned > Decimal::ZERO && earned < full,
            needs_manual: false,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub(crate) enum GradingError {
    #[error("score {score} must be between 0 and {max}")]
    ScoreOutOfRange { score: Decimal, max: Decimal },
}

/// One rule per question type.
pub(crate) trait GradingRule {
    fn grade(&self, points: Decimal, answer: &AnswerValue) -> GradeOutcome;
}

/// Grades a response against the payload it was given for.
pub(crate) fn grade_answer(
    payload: &QuestionPayload,
    points: Decimal,
    answer: Option<&AnswerValue>,
) -> GradeOutcome {
    let Some(answer) = answer else {
        return GradeOutcome::unanswered();
    };

    match payload {
        QuestionPayload::SingleChoice(choices) => rules::SingleChoice(choices).grade(points, answer),
        QuestionPayload::MultiChoice(choices) => rules::MultiChoice(choices).grade(points, answer),
        QuestionPayload::TrueFalse(key) => key.grade(points, answer),
        QuestionPayload::Matching(pairs) => pairs.grade(points, answer),
        QuestionPayload::Ordering(sequence) => sequence.grade(points, answer),
        QuestionPayload::ShortAnswer(text)
        | QuestionPayload::Essay(text)
        | QuestionPayload::FillBlank(text) => text.grade(points, answer),
    }
}

/// Validates a reviewer's score and derives the flags it implies.
pub(crate) fn manual_outcome(points: Decimal, score: Decimal) -> Result<GradeOutcome, GradingError> {
    let max = round_points(points);
    let score = round_points(score);
    if score < Decimal::ZERO || score > max {
        return Err(GradingError::ScoreOutOfRange { score, max });
    }

    Ok(GradeOutcome {
        earned: score,
        is_correct: score == max,
        is_partial: score > Decimal::ZERO && score < max,
        needs_manual: false,
    })
}

/// Half-up to two decimal places, always carrying scale 2.
pub(crate) fn round_points(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

#[cfg(test)]
pub(crate) fn dec(value: &str) -> Decimal {
    value.parse().expect("decimal literal")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_is_half_up_with_two_places() {
        assert_eq!(round_points(dec("1.005")).to_string(), "1.01");
        assert_eq!(round_points(dec("2.004")).to_string(), "2.00");
        assert_eq!(round_points(dec("3")).to_string(), "3.00");
    }

    #[test]
    fn manual_score_bounds_are_inclusive() {
        let points = dec("5");
        assert!(manual_outcome(points, dec("0")).is_ok());
        assert!(manual_outcome(points, dec("5")).unwrap().is_correct);
        assert_eq!(
            manual_outcome(points, dec("5.01")).unwrap_err(),
            GradingError::ScoreOutOfRange { score: dec("5.01"), max: dec("5.00") }
        );
        assert!(manual_outcome(points, dec("-1")).is_err());
    }

    #[test]
    fn manual_partial_score_sets_partial_flag() {
        let outcome = manual_outcome(dec("4"), dec("2.5")).unwrap();
        assert!(outcome.is_partial);
        assert!(!outcome.is_correct);
        assert!(!outcome.needs_manual);
    }

    #[test]
    fn unanswered_scores_zero_without_review() {
        let outcome = grade_answer(&QuestionPayload::Essay(Default::default()), dec("10"), None);
        assert_eq!(outcome, GradeOutcome::unanswered());
        assert!(!outcome.needs_manual);
    }
}
