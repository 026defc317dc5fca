use std::collections::BTreeSet;

use rust_decimal::Decimal;

use crate::db::payloads::{
    AnswerValue, ChoiceOptions, FreeText, MatchingPairs, OrderingSequence, TrueFalseKey,
};
use crate::services::grading::{GradeOutcome, GradingRule};

/// Single-choice questions share their payload shape with multi-choice ones.
pub(crate) struct SingleChoice<'a>(pub(crate) &'a ChoiceOptions);

pub(crate) struct MultiChoice<'a>(pub(crate) &'a ChoiceOptions);

impl GradingRule for SingleChoice<'_> {
    fn grade(&self, points: Decimal, answer: &AnswerValue) -> GradeOutcome {
        let AnswerValue::Choice(selected) = answer else {
            return GradeOutcome::unanswered();
        };

        match self.0.correct_ids().next() {
            Some(correct) if correct == selected => GradeOutcome::full(points),
            _ => GradeOutcome::unanswered(),
        }
    }
}

impl GradingRule for MultiChoice<'_> {
    fn grade(&self, points: Decimal, answer: &AnswerValue) -> GradeOutcome {
        let AnswerValue::Choices(selected) = answer else {
            return GradeOutcome::unanswered();
        };

        let correct: BTreeSet<&str> = self.0.correct_ids().collect();
        let selected: BTreeSet<&str> = selected.iter().map(String::as_str).collect();
        if selected == correct {
            return GradeOutcome::full(points);
        }

        let hits = selected.intersection(&correct).count() as i64;
        let misses = selected.difference(&correct).count() as i64;
        let denominator = Decimal::from(correct.len().max(1) as i64);
        let ratio = (Decimal::from(hits - misses) / denominator).max(Decimal::ZERO);

        GradeOutcome { is_correct: false, ..GradeOutcome::scaled(points, ratio) }
    }
}

impl GradingRule for TrueFalseKey {
    fn grade(&self, points: Decimal, answer: &AnswerValue) -> GradeOutcome {
        let AnswerValue::Truth(given) = answer else {
            return GradeOutcome::unanswered();
        };

        if given.trim().to_lowercase() == self.correct.normalized() {
            GradeOutcome::full(points)
        } else {
            GradeOutcome::unanswered()
        }
    }
}

impl GradingRule for MatchingPairs {
    fn grade(&self, points: Decimal, answer: &AnswerValue) -> GradeOutcome {
        let AnswerValue::Pairs(given) = answer else {
            return GradeOutcome::unanswered();
        };

        let total = self.pairs.len();
        if total == 0 {
            return GradeOutcome::unanswered();
        }

        let matches = self
            .pairs
            .iter()
            .filter(|pair| given.get(&pair.left).is_some_and(|right| *right == pair.right))
            .count();
        if matches == total {
            return GradeOutcome::full(points);
        }

        let ratio = Decimal::from(matches as i64) / Decimal::from(total as i64);
        let outcome = GradeOutcome::scaled(points, ratio);
        GradeOutcome { is_correct: false, is_partial: matches > 0, ..outcome }
    }
}

impl GradingRule for OrderingSequence {
    fn grade(&self, points: Decimal, answer: &AnswerValue) -> GradeOutcome {
        match answer {
            AnswerValue::Sequence(given) if *given == self.sequence => GradeOutcome::full(points),
            _ => GradeOutcome::unanswered(),
        }
    }
}

impl GradingRule for FreeText {
    fn grade(&self, _points: Decimal, _answer: &AnswerValue) -> GradeOutcome {
        GradeOutcome { needs_manual: true, ..GradeOutcome::unanswered() }
    }
}
