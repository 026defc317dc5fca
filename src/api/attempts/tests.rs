use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::core::security::Role;
use crate::db::types::{AttemptStatus, IntegrityAction};
use crate::repositories;
use crate::services::progress::ProgressEventKind;
use crate::test_support::{self, AssignmentSeed, TestContext};

struct Started {
    attempt_id: String,
    question_ids: Vec<String>,
    student_token: String,
    teacher_token: String,
}

async fn start_attempt(ctx: &TestContext, seed: AssignmentSeed<'_>) -> Started {
    let assignment = test_support::insert_assignment(ctx.state.db(), seed).await;
    let student_token =
        test_support::bearer_token("student-1", Role::Student, ctx.state.settings());
    let teacher_token =
        test_support::bearer_token("teacher-1", Role::Teacher, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/assignments/{}/start", assignment.id),
            Some(&student_token),
            None,
        ))
        .await
        .expect("start attempt");
    let status = response.status();
    let body = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {body}");

    Started {
        attempt_id: body["id"].as_str().expect("attempt id").to_string(),
        question_ids: body["questions"]
            .as_array()
            .expect("questions")
            .iter()
            .filter_map(|question| question["question_id"].as_str().map(str::to_string))
            .collect(),
        student_token,
        teacher_token,
    }
}

async fn call(
    ctx: &TestContext,
    method: Method,
    uri: &str,
    token: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(method, uri, Some(token), body))
        .await
        .expect("response");
    let status = response.status();
    (status, test_support::read_json(response).await)
}

#[tokio::test]
async fn answers_are_saved_and_overwritten() {
    let ctx = test_support::setup_test_context().await;
    let test_id = test_support::seed_generated_test(&ctx.state, "teacher-1", 2, 1).await;
    let started =
        start_attempt(&ctx, AssignmentSeed::new("teacher-1", &test_id, &["student-1"])).await;
    let question_id = &started.question_ids[0];
    let uri = format!("/api/v1/attempts/{}/answers/{question_id}", started.attempt_id);

    let (status, saved) = call(
        &ctx,
        Method::PUT,
        &uri,
        &started.student_token,
        Some(json!({"value": "opt-1", "time_spent_seconds": 12})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {saved}");
    assert_eq!(saved["value"], "opt-1");
    assert!(saved.get("score").is_none());

    let (status, saved) = call(
        &ctx,
        Method::PUT,
        &uri,
        &started.student_token,
        Some(json!({"value": "opt-0", "bookmarked": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {saved}");

    let (_, detail) = call(
        &ctx,
        Method::GET,
        &format!("/api/v1/attempts/{}", started.attempt_id),
        &started.student_token,
        None,
    )
    .await;
    let answers = detail["answers"].as_array().expect("answers");
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0]["value"], "opt-0");
    assert_eq!(answers[0]["bookmarked"], true);

    let (status, _) = call(
        &ctx,
        Method::PUT,
        &uri,
        &started.student_token,
        Some(json!({"value": ["opt-0"]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let other = test_support::bearer_token("student-2", Role::Student, ctx.state.settings());
    let (status, _) = call(&ctx, Method::PUT, &uri, &other, Some(json!({"value": "opt-0"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn batch_save_reports_each_bad_entry() {
    let ctx = test_support::setup_test_context().await;
    let test_id = test_support::seed_generated_test(&ctx.state, "teacher-1", 3, 1).await;
    let started =
        start_attempt(&ctx, AssignmentSeed::new("teacher-1", &test_id, &["student-1"])).await;

    let (status, body) = call(
        &ctx,
        Method::POST,
        &format!("/api/v1/attempts/{}/answers", started.attempt_id),
        &started.student_token,
        Some(json!({
            "answers": [
                {"question_id": started.question_ids[0], "value": "opt-0"},
                {"question_id": "not-in-variant", "value": "opt-0"},
                {"question_id": started.question_ids[1], "value": 7},
                {"question_id": started.question_ids[2], "value": "opt-2"}
            ]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "response: {body}");
    assert_eq!(body["saved_count"], 2);
    assert_eq!(body["failed_count"], 2);
    let failed: Vec<&str> = body["failures"]
        .as_array()
        .expect("failures")
        .iter()
        .filter_map(|failure| failure["question_id"].as_str())
        .collect();
    assert_eq!(failed, ["not-in-variant", started.question_ids[1].as_str()]);

    let stored = repositories::answers::list_by_attempt(ctx.state.db(), &started.attempt_id)
        .await
        .expect("answers");
    assert_eq!(stored.len(), 2);
}

#[tokio::test]
async fn late_write_closes_attempt_at_deadline() {
    let ctx = test_support::setup_test_context().await;
    let test_id = test_support::seed_generated_test(&ctx.state, "teacher-1", 2, 1).await;
    let started =
        start_attempt(&ctx, AssignmentSeed::new("teacher-1", &test_id, &["student-1"])).await;
    test_support::backdate_attempt(ctx.state.db(), &started.attempt_id, 1).await;

    let (status, body) = call(
        &ctx,
        Method::PUT,
        &format!("/api/v1/attempts/{}/answers/{}", started.attempt_id, started.question_ids[0]),
        &started.student_token,
        Some(json!({"value": "opt-0"})),
    )
    .await;
    assert_eq!(status, StatusCode::GONE, "response: {body}");

    let attempt = repositories::attempts::find_by_id(ctx.state.db(), &started.attempt_id)
        .await
        .expect("query")
        .expect("attempt");
    assert_eq!(attempt.status, AttemptStatus::AutoGraded);
    assert_eq!(attempt.submitted_at, Some(attempt.deadline_at));
    assert_eq!(attempt.raw_score, Some(Decimal::ZERO));

    let (_, detail) = call(
        &ctx,
        Method::GET,
        &format!("/api/v1/attempts/{}", started.attempt_id),
        &started.student_token,
        None,
    )
    .await;
    assert_eq!(detail["raw_score"], "0.00");
    assert_eq!(detail["percentage"], "0.00");
    assert_eq!(detail["answers"][0]["score"]["earned_points"], "0.00");

    let answers = repositories::answers::list_by_attempt(ctx.state.db(), &started.attempt_id)
        .await
        .expect("answers");
    assert_eq!(answers.len(), 2);
    assert!(answers.iter().all(|answer| answer.value.is_none()));

    let (status, _) = call(
        &ctx,
        Method::PUT,
        &format!("/api/v1/attempts/{}/answers/{}", started.attempt_id, started.question_ids[0]),
        &started.student_token,
        Some(json!({"value": "opt-0"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn concurrent_submits_grade_once() {
    let ctx = test_support::setup_test_context().await;
    let test_id = test_support::seed_generated_test(&ctx.state, "teacher-1", 2, 1).await;
    let started =
        start_attempt(&ctx, AssignmentSeed::new("teacher-1", &test_id, &["student-1"])).await;

    call(
        &ctx,
        Method::PUT,
        &format!("/api/v1/attempts/{}/answers/{}", started.attempt_id, started.question_ids[0]),
        &started.student_token,
        Some(json!({"value": "opt-0"})),
    )
    .await;

    let uri = format!("/api/v1/attempts/{}/submit", started.attempt_id);
    let (first, second) = tokio::join!(
        call(&ctx, Method::POST, &uri, &started.student_token, None),
        call(&ctx, Method::POST, &uri, &started.student_token, None),
    );

    let mut statuses = [first.0, second.0];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::CONFLICT]);

    let winner = if first.0 == StatusCode::OK { first.1 } else { second.1 };
    assert_eq!(winner["status"], "auto_graded");
    assert_eq!(winner["raw_score"], "1.00");
    assert_eq!(winner["max_score"], "2.00");
    assert_eq!(winner["percentage"], "50.00");
    assert_eq!(winner["remaining_seconds"], 0);

    let scored: Vec<&Value> = winner["answers"]
        .as_array()
        .expect("answers")
        .iter()
        .filter(|answer| answer["score"]["is_correct"] == true)
        .collect();
    assert_eq!(scored.len(), 1);

    assert_eq!(
        ctx.state.progress().sent_kinds(),
        vec![
            ProgressEventKind::Started,
            ProgressEventKind::AnswerSaved,
            ProgressEventKind::Submitted,
            ProgressEventKind::Graded,
        ]
    );
}

#[tokio::test]
async fn violations_flag_after_threshold() {
    let ctx = test_support::setup_test_context().await;
    let test_id = test_support::seed_generated_test(&ctx.state, "teacher-1", 1, 1).await;
    let mut seed = AssignmentSeed::new("teacher-1", &test_id, &["student-1"]);
    seed.tab_switch_threshold = 2;
    seed.tab_switch_action = IntegrityAction::Flag;
    let started = start_attempt(&ctx, seed).await;
    let uri = format!("/api/v1/attempts/{}/violations", started.attempt_id);

    let (status, first) = call(&ctx, Method::POST, &uri, &started.student_token, None).await;
    assert_eq!(status, StatusCode::OK, "response: {first}");
    assert_eq!(first["violation_count"], 1);
    assert_eq!(first["action"], "none");
    assert_eq!(first["attempt"]["flagged"], false);

    let (_, second) = call(&ctx, Method::POST, &uri, &started.student_token, None).await;
    assert_eq!(second["violation_count"], 2);
    assert_eq!(second["action"], "flag");
    assert_eq!(second["auto_submitted"], false);
    assert_eq!(second["attempt"]["flagged"], true);
    assert_eq!(second["attempt"]["status"], "in_progress");
}

#[tokio::test]
async fn violations_auto_submit_at_threshold() {
    let ctx = test_support::setup_test_context().await;
    let test_id = test_support::seed_generated_test(&ctx.state, "teacher-1", 1, 1).await;
    let mut seed = AssignmentSeed::new("teacher-1", &test_id, &["student-1"]);
    seed.tab_switch_threshold = 1;
    seed.tab_switch_action = IntegrityAction::AutoSubmit;
    let started = start_attempt(&ctx, seed).await;
    let uri = format!("/api/v1/attempts/{}/violations", started.attempt_id);

    let (status, body) = call(&ctx, Method::POST, &uri, &started.student_token, None).await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    assert_eq!(body["action"], "auto_submit");
    assert_eq!(body["auto_submitted"], true);
    assert_eq!(body["attempt"]["status"], "auto_graded");
    assert_eq!(body["attempt"]["flagged"], true);
    assert_eq!(
        ctx.state.progress().sent_kinds(),
        vec![
            ProgressEventKind::Started,
            ProgressEventKind::Violation,
            ProgressEventKind::Submitted,
            ProgressEventKind::Graded,
        ]
    );

    let (status, _) = call(&ctx, Method::POST, &uri, &started.student_token, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn manual_grade_recomputes_totals() {
    let ctx = test_support::setup_test_context().await;
    let test_id = test_support::seed_generated_test(&ctx.state, "teacher-1", 2, 1).await;
    let started =
        start_attempt(&ctx, AssignmentSeed::new("teacher-1", &test_id, &["student-1"])).await;

    let (status, _) = call(
        &ctx,
        Method::POST,
        &format!("/api/v1/attempts/{}/grade", started.attempt_id),
        &started.teacher_token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, submitted) = call(
        &ctx,
        Method::POST,
        &format!("/api/v1/attempts/{}/submit", started.attempt_id),
        &started.student_token,
        None,
    )
    .await;
    assert_eq!(submitted["raw_score"], "0.00");
    let answer_id = submitted["answers"][0]["id"].as_str().expect("answer id").to_string();

    let uri = format!("/api/v1/answers/{answer_id}/grade");
    let (status, _) =
        call(&ctx, Method::POST, &uri, &started.teacher_token, Some(json!({"score": "1.5"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) =
        call(&ctx, Method::POST, &uri, &started.student_token, Some(json!({"score": "0.5"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(
        &ctx,
        Method::POST,
        &uri,
        &started.teacher_token,
        Some(json!({"score": "0.5", "feedback": "Half credit for the working"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    assert_eq!(body["answer"]["score"]["earned_points"], "0.50");
    assert_eq!(body["answer"]["score"]["is_partial"], true);
    assert_eq!(body["answer"]["score"]["feedback"], "Half credit for the working");
    assert_eq!(body["attempt"]["status"], "graded");
    assert_eq!(body["attempt"]["raw_score"], "0.50");
    assert_eq!(body["attempt"]["percentage"], "25.00");

    let (status, regraded) = call(
        &ctx,
        Method::POST,
        &format!("/api/v1/attempts/{}/grade", started.attempt_id),
        &started.teacher_token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(regraded["raw_score"], "0.50");
}
