//! Seeded variant generation.
//!
//! A single `StdRng` is created per call and threaded through selection and
//! arrangement, so a `(seed, pool, parameters)` triple always yields the same
//! variants and answer keys.

pub(crate) mod answer_key;
pub(crate) mod distribution;
pub(crate) mod shuffle;
pub(crate) mod variants;

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc, unix_nanos_now};
use crate::db::models::{GeneratedTest, Question};
use crate::db::types::GenerationMode;
use crate::repositories;
use crate::services::generation::distribution::BucketShortage;
use crate::services::generation::variants::{GeneratedVariant, VariantPlan};

pub(crate) const MAX_VARIANTS: u32 = 10;

/// Default seeds stay below 2^53 so they survive a round trip through JSON numbers.
const DEFAULT_SEED_MASK: u64 = (1 << 53) - 1;

#[derive(Debug, Error)]
pub(crate) enum GenerationError {
    #[error("{0}")]
    Invalid(String),
    #[error("not enough questions: {}", describe_shortages(.0))]
    InsufficientQuestions(Vec<BucketShortage>),
    #[error("none of the selected questions can be graded automatically")]
    NoUsableQuestions,
    #[error("questions not found: {}", .0.join(", "))]
    QuestionsNotFound(Vec<String>),
    #[error("questions not accessible: {}", .0.join(", "))]
    QuestionsForbidden(Vec<String>),
    #[error("generated test not found")]
    NotFound,
    #[error("not allowed to access this generated test")]
    Forbidden,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

fn describe_shortages(shortages: &[BucketShortage]) -> String {
    shortages
        .iter()
        .map(|shortage| {
            format!(
                "{} has {} of {} required",
                shortage.difficulty.as_str(),
                shortage.available,
                shortage.required
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone)]
pub(crate) enum QuestionSource {
    Scope {
        subject_id: Option<String>,
        topic_id: Option<String>,
        count: u32,
        percentages: [u32; 3],
    },
    Manual {
        question_ids: Vec<String>,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct GenerationRequest {
    pub(crate) title: Option<String>,
    pub(crate) source: QuestionSource,
    pub(crate) shuffle_questions: bool,
    pub(crate) shuffle_options: bool,
    pub(crate) variant_count: u32,
    pub(crate) seed: Option<u64>,
    pub(crate) preview: bool,
}

impl GenerationRequest {
    fn mode(&self) -> GenerationMode {
        match self.source {
            QuestionSource::Scope { .. } => GenerationMode::Auto,
            QuestionSource::Manual { .. } => GenerationMode::Manual,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct GenerationOutcome {
    pub(crate) generated_test_id: Option<String>,
    pub(crate) title: String,
    pub(crate) mode: GenerationMode,
    pub(crate) requested_count: u32,
    pub(crate) percentages: [u32; 3],
    pub(crate) counts: [u32; 3],
    pub(crate) seed: u64,
    pub(crate) shuffle_questions: bool,
    pub(crate) shuffle_options: bool,
    pub(crate) variants: Vec<GeneratedVariant>,
    pub(crate) created_at: Option<PrimitiveDateTime>,
}

struct Selection {
    questions: Vec<Question>,
    requested_count: u32,
    percentages: [u32; 3],
    counts: [u32; 3],
}

pub(crate) async fn generate(
    state: &AppState,
    owner_id: &str,
    request: GenerationRequest,
) -> Result<GenerationOutcome, GenerationError> {
    let mode = request.mode();
    let result = generate_inner(state, owner_id, request).await;

    let label = if result.is_ok() { "ok" } else { "error" };
    metrics::counter!("generation_requests_total", "mode" => mode.as_str(), "result" => label)
        .increment(1);
    result
}

async fn generate_inner(
    state: &AppState,
    owner_id: &str,
    request: GenerationRequest,
) -> Result<GenerationOutcome, GenerationError> {
    if request.variant_count == 0 || request.variant_count > MAX_VARIANTS {
        return Err(GenerationError::Invalid(format!(
            "variant_count must be between 1 and {MAX_VARIANTS}"
        )));
    }

    let mode = request.mode();
    let seed = request.seed.unwrap_or_else(|| unix_nanos_now() & DEFAULT_SEED_MASK);
    let mut rng = StdRng::seed_from_u64(seed);

    let selection = match &request.source {
        QuestionSource::Scope { subject_id, topic_id, count, percentages } => {
            select_from_scope(
                state,
                owner_id,
                subject_id.as_deref(),
                topic_id.as_deref(),
                *count,
                *percentages,
                &mut rng,
            )
            .await?
        }
        QuestionSource::Manual { question_ids } => {
            select_manual(state, owner_id, question_ids).await?
        }
    };

    let base: Vec<_> = selection.questions.iter().map(variants::snapshot).collect();
    let plan = VariantPlan {
        variant_count: request.variant_count as usize,
        shuffle_questions: request.shuffle_questions,
        shuffle_options: request.shuffle_options,
    };
    let generated = variants::arrange(&mut rng, &base, plan);

    let title = request
        .title
        .as_deref()
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default_title(base.len()));

    let mut outcome = GenerationOutcome {
        generated_test_id: None,
        title,
        mode,
        requested_count: selection.requested_count,
        percentages: selection.percentages,
        counts: selection.counts,
        seed,
        shuffle_questions: request.shuffle_questions,
        shuffle_options: request.shuffle_options,
        variants: generated,
        created_at: None,
    };

    if request.preview {
        tracing::info!(owner_id, seed, mode = mode.as_str(), "Generated preview variants");
        return Ok(outcome);
    }

    let (subject_id, topic_id) = match &request.source {
        QuestionSource::Scope { subject_id, topic_id, .. } => {
            (subject_id.as_deref(), topic_id.as_deref())
        }
        QuestionSource::Manual { .. } => (None, None),
    };
    persist(state, owner_id, subject_id, topic_id, &mut outcome).await?;

    tracing::info!(
        generated_test_id = outcome.generated_test_id.as_deref().unwrap_or_default(),
        owner_id,
        seed,
        mode = mode.as_str(),
        variants = outcome.variants.len(),
        questions = base.len(),
        "Generated test persisted"
    );
    Ok(outcome)
}

async fn select_from_scope(
    state: &AppState,
    owner_id: &str,
    subject_id: Option<&str>,
    topic_id: Option<&str>,
    count: u32,
    percentages: [u32; 3],
    rng: &mut StdRng,
) -> Result<Selection, GenerationError> {
    let max_questions = state.settings().generation().max_questions;
    if count == 0 || count > max_questions {
        return Err(GenerationError::Invalid(format!(
            "count must be between 1 and {max_questions}"
        )));
    }
    distribution::validate_percentages(percentages).map_err(GenerationError::Invalid)?;

    let counts = distribution::bucket_counts(count, percentages);
    let candidates = repositories::questions::list_candidates(
        state.db(),
        repositories::questions::CandidateScope { requester_id: owner_id, subject_id, topic_id },
    )
    .await?;

    let usable: Vec<Question> =
        candidates.into_iter().filter(|question| question.payload.0.is_generator_usable()).collect();
    let pools = variants::partition(usable);

    let available = [pools[0].len(), pools[1].len(), pools[2].len()];
    let shortages = distribution::shortages(available, counts);
    if !shortages.is_empty() {
        return Err(GenerationError::InsufficientQuestions(shortages));
    }

    Ok(Selection {
        questions: variants::select_by_difficulty(rng, pools, counts),
        requested_count: count,
        percentages,
        counts,
    })
}

async fn select_manual(
    state: &AppState,
    owner_id: &str,
    question_ids: &[String],
) -> Result<Selection, GenerationError> {
    let ids = dedupe_ids(question_ids);
    if ids.is_empty() {
        return Err(GenerationError::Invalid("question_ids must not be empty".to_string()));
    }

    let max_ids = state.settings().generation().max_manual_ids as usize;
    if ids.len() > max_ids {
        return Err(GenerationError::Invalid(format!(
            "at most {max_ids} question ids can be selected manually"
        )));
    }

    let found = repositories::questions::find_by_ids(state.db(), &ids).await?;
    let mut by_id: HashMap<String, Question> =
        found.into_iter().map(|question| (question.id.clone(), question)).collect();

    let missing: Vec<String> = ids.iter().filter(|id| !by_id.contains_key(*id)).cloned().collect();
    if !missing.is_empty() {
        return Err(GenerationError::QuestionsNotFound(missing));
    }

    let forbidden: Vec<String> = ids
        .iter()
        .filter(|id| {
            by_id.get(*id).is_some_and(|question| {
                question.owner_id != owner_id && !question.is_public
            })
        })
        .cloned()
        .collect();
    if !forbidden.is_empty() {
        return Err(GenerationError::QuestionsForbidden(forbidden));
    }

    let questions: Vec<Question> = ids
        .iter()
        .filter_map(|id| by_id.remove(id))
        .filter(|question| question.payload.0.is_generator_usable())
        .collect();
    if questions.is_empty() {
        return Err(GenerationError::NoUsableQuestions);
    }

    let mut counts = [0u32; 3];
    for question in &questions {
        counts[question.difficulty.index()] += 1;
    }

    Ok(Selection {
        requested_count: questions.len() as u32,
        percentages: distribution::derive_percentages(counts),
        counts,
        questions,
    })
}

async fn persist(
    state: &AppState,
    owner_id: &str,
    subject_id: Option<&str>,
    topic_id: Option<&str>,
    outcome: &mut GenerationOutcome,
) -> Result<(), GenerationError> {
    let now = primitive_now_utc();
    let test_id = Uuid::new_v4().to_string();

    let mut tx = state.db().begin().await?;
    let test = repositories::generated_tests::create(
        &mut *tx,
        repositories::generated_tests::CreateGeneratedTest {
            id: &test_id,
            owner_id,
            title: &outcome.title,
            mode: outcome.mode,
            subject_id,
            topic_id,
            requested_count: outcome.requested_count as i32,
            percentages: outcome.percentages.map(|value| value as i32),
            counts: outcome.counts.map(|value| value as i32),
            shuffle_questions: outcome.shuffle_questions,
            shuffle_options: outcome.shuffle_options,
            variant_count: outcome.variants.len() as i32,
            seed: outcome.seed as i64,
            created_at: now,
        },
    )
    .await?;

    for (position, variant) in outcome.variants.iter_mut().enumerate() {
        let variant_id = Uuid::new_v4().to_string();
        repositories::generated_tests::create_variant(
            &mut *tx,
            &test.id,
            repositories::generated_tests::CreateVariant {
                id: &variant_id,
                label: &variant.label,
                position: position as i32,
                questions: &variant.questions,
            },
            now,
        )
        .await?;
        variant.id = Some(variant_id);
    }

    tx.commit().await?;

    outcome.generated_test_id = Some(test.id);
    outcome.created_at = Some(test.created_at);
    Ok(())
}

/// Loads a persisted generated test with its variants and keys.
pub(crate) async fn load(
    state: &AppState,
    requester_id: &str,
    is_admin: bool,
    id: &str,
) -> Result<GenerationOutcome, GenerationError> {
    let test = repositories::generated_tests::find_by_id(state.db(), id)
        .await?
        .ok_or(GenerationError::NotFound)?;
    if test.owner_id != requester_id && !is_admin {
        return Err(GenerationError::Forbidden);
    }

    let rows = repositories::generated_tests::list_variants(state.db(), &test.id).await?;
    let variants = rows
        .into_iter()
        .map(|row| GeneratedVariant { id: Some(row.id), label: row.label, questions: row.questions.0 })
        .collect();

    Ok(outcome_from_row(test, variants))
}

fn outcome_from_row(test: GeneratedTest, variants: Vec<GeneratedVariant>) -> GenerationOutcome {
    GenerationOutcome {
        generated_test_id: Some(test.id),
        title: test.title,
        mode: test.mode,
        requested_count: test.requested_count.max(0) as u32,
        percentages: [test.easy_pct, test.medium_pct, test.hard_pct].map(|v| v.max(0) as u32),
        counts: [test.easy_count, test.medium_count, test.hard_count].map(|v| v.max(0) as u32),
        seed: test.seed as u64,
        shuffle_questions: test.shuffle_questions,
        shuffle_options: test.shuffle_options,
        variants,
        created_at: Some(test.created_at),
    }
}

fn dedupe_ids(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}

fn default_title(question_count: usize) -> String {
    let stamp = primitive_now_utc()
        .format(time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .unwrap_or_default();
    format!("Generated test ({question_count} questions) {stamp} UTC")
}
