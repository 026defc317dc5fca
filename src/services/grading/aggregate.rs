use rust_decimal::Decimal;

use crate::db::models::AttemptAnswer;
use crate::db::types::AttemptStatus;
use crate::services::grading::round_points;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AttemptTotals {
    pub(crate) raw_score: Decimal,
    pub(crate) max_score: Decimal,
    pub(crate) percentage: Decimal,
    pub(crate) needs_review: bool,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct AnswerTally {
    pub(crate) earned: Decimal,
    pub(crate) max: Decimal,
    pub(crate) needs_manual: bool,
}

impl From<&AttemptAnswer> for AnswerTally {
    fn from(answer: &AttemptAnswer) -> Self {
        Self {
            earned: answer.earned_points,
            max: answer.max_points,
            needs_manual: answer.needs_manual,
        }
    }
}

pub(crate) fn percentage(raw: Decimal, max: Decimal) -> Decimal {
    if max <= Decimal::ZERO {
        return round_points(Decimal::ZERO);
    }
    round_points(raw * Decimal::ONE_HUNDRED / max)
}

/// Recomputes totals from scratch; the review flag is derived from every answer.
pub(crate) fn totals<I>(answers: I) -> AttemptTotals
where
    I: IntoIterator<Item = AnswerTally>,
{
    let mut raw = Decimal::ZERO;
    let mut max = Decimal::ZERO;
    let mut needs_review = false;

    for answer in answers {
        raw += answer.earned;
        max += answer.max;
        needs_review |= answer.needs_manual;
    }

    AttemptTotals {
        raw_score: round_points(raw),
        max_score: round_points(max),
        percentage: percentage(raw, max),
        needs_review,
    }
}

/// Terminal status right after automatic grading.
pub(crate) fn status_after_auto(totals: &AttemptTotals) -> AttemptStatus {
    if totals.needs_review {
        AttemptStatus::NeedsReview
    } else {
        AttemptStatus::AutoGraded
    }
}

/// Status after a reviewer scored one answer.
pub(crate) fn status_after_manual(totals: &AttemptTotals) -> AttemptStatus {
    if totals.needs_review {
        AttemptStatus::NeedsReview
    } else {
        AttemptStatus::Graded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::grading::dec;

    fn tally(earned: &str, max: &str, needs_manual: bool) -> AnswerTally {
        AnswerTally { earned: dec(earned), max: dec(max), needs_manual }
    }

    #[test]
    fn percentage_rounds_half_up() {
        // 1 / 3 * 100 = 33.333..
        assert_eq!(percentage(dec("1"), dec("3")).to_string(), "33.33");
        // 2 / 3 * 100 = 66.666..
        assert_eq!(percentage(dec("2"), dec("3")).to_string(), "66.67");
        // 1 / 8 * 100 = 12.5 exactly
        assert_eq!(percentage(dec("0.125"), dec("1")).to_string(), "12.50");
    }

    #[test]
    fn zero_max_gives_zero_percentage() {
        let totals = totals(vec![tally("0", "0", false)]);
        assert_eq!(totals.percentage, Decimal::ZERO);
        assert_eq!(totals.max_score.to_string(), "0.00");
    }

    #[test]
    fn totals_sum_every_answer() {
        let totals =
            totals(vec![tally("2", "2", false), tally("1.5", "3", false), tally("0", "5", false)]);

        assert_eq!(totals.raw_score, dec("3.5"));
        assert_eq!(totals.max_score, dec("10"));
        assert_eq!(totals.percentage.to_string(), "35.00");
        assert_eq!(status_after_auto(&totals), AttemptStatus::AutoGraded);
    }

    #[test]
    fn any_pending_review_keeps_attempt_in_review() {
        let pending = totals(vec![tally("1", "1", false), tally("0", "4", true)]);
        assert_eq!(status_after_auto(&pending), AttemptStatus::NeedsReview);
        assert_eq!(status_after_manual(&pending), AttemptStatus::NeedsReview);

        let reviewed = totals(vec![tally("1", "1", false), tally("3", "4", false)]);
        assert_eq!(status_after_manual(&reviewed), AttemptStatus::Graded);
    }
}
