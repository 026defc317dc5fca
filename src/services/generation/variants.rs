use rand::rngs::StdRng;

use crate::db::models::{Question, VariantQuestion};
use crate::db::types::DifficultyLevel;
use crate::services::generation::answer_key::{answer_key, VARIANT_LABELS};
use crate::services::generation::shuffle::{select_tail, shuffle_in_place};
use crate::services::grading::round_points;

#[derive(Debug, Clone, Copy)]
pub(crate) struct VariantPlan {
    pub(crate) variant_count: usize,
    pub(crate) shuffle_questions: bool,
    pub(crate) shuffle_options: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GeneratedVariant {
    pub(crate) id: Option<String>,
    pub(crate) label: String,
    pub(crate) questions: Vec<VariantQuestion>,
}

pub(crate) fn snapshot(question: &Question) -> VariantQuestion {
    VariantQuestion {
        question_id: question.id.clone(),
        version: question.version,
        prompt: question.prompt.clone(),
        difficulty: question.difficulty,
        points: round_points(question.points),
        payload: question.payload.0.clone(),
        option_order: None,
        answer_key: String::new(),
    }
}

pub(crate) fn partition(questions: Vec<Question>) -> [Vec<Question>; 3] {
    let mut pools: [Vec<Question>; 3] = Default::default();
    for question in questions {
        pools[question.difficulty.index()].push(question);
    }
    pools
}

/// Draws `counts[bucket]` questions from each pool, easy then medium then hard.
/// Pools are ordered by id first so the draw only depends on the seed.
pub(crate) fn select_by_difficulty(
    rng: &mut StdRng,
    mut pools: [Vec<Question>; 3],
    counts: [u32; 3],
) -> Vec<Question> {
    let mut selected = Vec::with_capacity(counts.iter().sum::<u32>() as usize);
    for difficulty in DifficultyLevel::ALL {
        let pool = &mut pools[difficulty.index()];
        pool.sort_by(|left, right| left.id.cmp(&right.id));
        selected.extend(select_tail(rng, pool, counts[difficulty.index()] as usize));
    }
    selected
}

/// Lays the selected questions out as labelled variants. The answer key is
/// computed after shuffling so labels match what the student sees.
pub(crate) fn arrange(
    rng: &mut StdRng,
    base: &[VariantQuestion],
    plan: VariantPlan,
) -> Vec<GeneratedVariant> {
    VARIANT_LABELS
        .iter()
        .take(plan.variant_count)
        .map(|label| {
            let mut questions = base.to_vec();
            if plan.shuffle_questions {
                shuffle_in_place(rng, &mut questions);
            }

            for question in &mut questions {
                if plan.shuffle_options {
                    if let Some(choices) = question.payload.choice_options_mut() {
                        shuffle_in_place(rng, &mut choices.options);
                        question.option_order =
                            Some(choices.options.iter().map(|option| option.id.clone()).collect());
                    }
                }

                question.answer_key = answer_key(&question.payload).unwrap_or_else(|| {
                    tracing::warn!(
                        question_id = %question.question_id,
                        variant = *label,
                        "Question has no option marked correct; answer key left empty"
                    );
                    String::new()
                });
            }

            GeneratedVariant { id: None, label: (*label).to_string(), questions }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::payloads::{ChoiceOptions, QuestionOption, QuestionPayload, TrueFalseKey, TruthValue};
    use crate::services::generation::answer_key::option_label;
    use rand::SeedableRng;
    use rust_decimal::Decimal;
    use sqlx::types::Json;
    use time::macros::datetime;

    fn question(id: &str, difficulty: DifficultyLevel, payload: QuestionPayload) -> Question {
        Question {
            id: id.to_string(),
            owner_id: "teacher-1".to_string(),
            subject_id: Some("math".to_string()),
            topic_id: None,
            prompt: format!("prompt {id}"),
            question_type: payload.question_type(),
            difficulty,
            points: Decimal::new(200, 2),
            payload: Json(payload),
            version: 3,
            is_public: false,
            created_at: datetime!(2025-01-01 00:00:00),
            updated_at: datetime!(2025-01-01 00:00:00),
        }
    }

    fn choice_question(id: &str, difficulty: DifficultyLevel) -> Question {
        let options = (0..4)
            .map(|index| QuestionOption {
                id: format!("{id}-o{index}"),
                text: format!("option {index}"),
                is_correct: index == 0 || index == 2,
            })
            .collect();
        question(id, difficulty, QuestionPayload::MultiChoice(ChoiceOptions { options }))
    }

    fn pool() -> Vec<Question> {
        let mut questions = Vec::new();
        for index in 0..6 {
            questions.push(choice_question(&format!("e{index}"), DifficultyLevel::Easy));
            questions.push(choice_question(&format!("m{index}"), DifficultyLevel::Medium));
            questions.push(choice_question(&format!("h{index}"), DifficultyLevel::Hard));
        }
        questions
    }

    fn plan(variant_count: usize) -> VariantPlan {
        VariantPlan { variant_count, shuffle_questions: true, shuffle_options: true }
    }

    fn generate(seed: u64, mut questions: Vec<Question>) -> Vec<GeneratedVariant> {
        let mut rng = StdRng::seed_from_u64(seed);
        questions.reverse();
        let selected = select_by_difficulty(&mut rng, partition(questions), [2, 3, 1]);
        let base: Vec<_> = selected.iter().map(snapshot).collect();
        arrange(&mut rng, &base, plan(4))
    }

    #[test]
    fn same_seed_reproduces_identical_variants() {
        let first = generate(1234, pool());
        let mut shuffled_input = pool();
        shuffled_input.rotate_left(5);
        let second = generate(1234, shuffled_input);

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first[0].questions).unwrap(),
            serde_json::to_string(&second[0].questions).unwrap()
        );
    }

    #[test]
    fn different_seeds_diverge() {
        assert_ne!(generate(1, pool()), generate(2, pool()));
    }

    #[test]
    fn selection_honours_bucket_counts() {
        let variants = generate(99, pool());
        let questions = &variants[0].questions;

        let count = |level| questions.iter().filter(|q| q.difficulty == level).count();
        assert_eq!(count(DifficultyLevel::Easy), 2);
        assert_eq!(count(DifficultyLevel::Medium), 3);
        assert_eq!(count(DifficultyLevel::Hard), 1);
        assert_eq!(
            variants.iter().map(|v| v.label.as_str()).collect::<Vec<_>>(),
            vec!["A", "B", "C", "D"]
        );
    }

    #[test]
    fn answer_keys_follow_shuffled_option_order() {
        for seed in [3, 17, 2024] {
            for variant in generate(seed, pool()) {
                for question in &variant.questions {
                    let choices = question.payload.choice_options().expect("choices");
                    let expected: Vec<String> = choices
                        .options
                        .iter()
                        .enumerate()
                        .filter(|(_, option)| option.is_correct)
                        .map(|(index, _)| option_label(index))
                        .collect();
                    assert_eq!(question.answer_key, expected.join(","));

                    let order = question.option_order.as_ref().expect("option order");
                    let shown: Vec<&String> = choices.options.iter().map(|o| &o.id).collect();
                    assert_eq!(order.iter().collect::<Vec<_>>(), shown);
                }
            }
        }
    }

    #[test]
    fn snapshot_keeps_version_and_points() {
        let variants = generate(5, pool());
        let question = &variants[0].questions[0];
        assert_eq!(question.version, 3);
        assert_eq!(question.points, Decimal::new(200, 2));
    }

    #[test]
    fn true_false_is_keyed_without_option_shuffle() {
        let tf = question(
            "tf-1",
            DifficultyLevel::Easy,
            QuestionPayload::TrueFalse(TrueFalseKey { correct: TruthValue::Bool(false) }),
        );
        let mut rng = StdRng::seed_from_u64(8);
        let variants = arrange(&mut rng, &[snapshot(&tf)], plan(2));

        for variant in variants {
            assert_eq!(variant.questions[0].answer_key, "false");
            assert!(variant.questions[0].option_order.is_none());
        }
    }

    #[test]
    fn missing_correct_option_leaves_empty_key() {
        let options = vec![
            QuestionOption { id: "a".into(), text: "x".into(), is_correct: false },
            QuestionOption { id: "b".into(), text: "y".into(), is_correct: false },
        ];
        let broken = question(
            "broken",
            DifficultyLevel::Hard,
            QuestionPayload::SingleChoice(ChoiceOptions { options }),
        );
        let mut rng = StdRng::seed_from_u64(0);

        let variants = arrange(&mut rng, &[snapshot(&broken)], plan(1));
        assert_eq!(variants[0].questions[0].answer_key, "");
    }
}
