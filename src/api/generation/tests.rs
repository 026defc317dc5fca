use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;
use serde_json::json;
use tower::ServiceExt;

use crate::core::security::Role;
use crate::db::types::DifficultyLevel;
use crate::test_support;

async fn seed_bank(pool: &sqlx::PgPool, owner: &str) -> Vec<String> {
    let mut ids = Vec::new();
    for (difficulty, count) in
        [(DifficultyLevel::Easy, 4), (DifficultyLevel::Medium, 4), (DifficultyLevel::Hard, 2)]
    {
        for index in 0..count {
            let question = test_support::insert_question(
                pool,
                owner,
                "topic-1",
                difficulty,
                Decimal::ONE,
                test_support::single_choice(index % 4, 4),
            )
            .await;
            ids.push(question.id);
        }
    }
    ids
}

#[tokio::test]
async fn scope_generation_persists_and_reloads() {
    let ctx = test_support::setup_test_context().await;
    seed_bank(ctx.state.db(), "teacher-1").await;
    let token = test_support::bearer_token("teacher-1", Role::Teacher, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/generation/tests",
            Some(&token),
            Some(json!({
                "title": "Unit quiz",
                "topic_id": "topic-1",
                "count": 5,
                "distribution": {"easy": 40, "medium": 40, "hard": 20},
                "variant_count": 3,
                "seed": 42
            })),
        ))
        .await
        .expect("generate");

    let status = response.status();
    let body = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    assert_eq!(body["preview"], false);
    assert_eq!(body["mode"], "auto");
    assert_eq!(body["counts"], json!({"easy": 2, "medium": 2, "hard": 1}));
    assert_eq!(body["seed"], 42);

    let variants = body["variants"].as_array().expect("variants");
    assert_eq!(variants.len(), 3);
    let labels: Vec<&str> = variants.iter().filter_map(|v| v["label"].as_str()).collect();
    assert_eq!(labels, ["A", "B", "C"]);
    for variant in variants {
        assert_eq!(variant["questions"].as_array().map(Vec::len), Some(5));
        assert_eq!(variant["answer_key"].as_array().map(Vec::len), Some(5));
    }

    let test_id = body["id"].as_str().expect("test id");
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/generation/tests/{test_id}"),
            Some(&token),
            None,
        ))
        .await
        .expect("fetch");

    let status = response.status();
    let fetched = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {fetched}");
    assert_eq!(fetched["variants"], body["variants"]);

    let other = test_support::bearer_token("teacher-2", Role::Teacher, ctx.state.settings());
    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/generation/tests/{test_id}"),
            Some(&other),
            None,
        ))
        .await
        .expect("fetch as other teacher");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn preview_is_not_persisted_and_same_seed_repeats() {
    let ctx = test_support::setup_test_context().await;
    let ids = seed_bank(ctx.state.db(), "teacher-1").await;
    let token = test_support::bearer_token("teacher-1", Role::Teacher, ctx.state.settings());

    let request = json!({
        "question_ids": &ids[..4],
        "variant_count": 2,
        "seed": 7,
        "preview": true
    });

    let mut bodies = Vec::new();
    for _ in 0..2 {
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                "/api/v1/generation/tests",
                Some(&token),
                Some(request.clone()),
            ))
            .await
            .expect("preview");
        assert_eq!(response.status(), StatusCode::OK);
        bodies.push(test_support::read_json(response).await);
    }

    assert_eq!(bodies[0]["preview"], true);
    assert!(bodies[0]["id"].is_null());
    assert_eq!(bodies[0]["mode"], "manual");
    assert_eq!(bodies[0]["variants"], bodies[1]["variants"]);

    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM generated_tests")
        .fetch_one(ctx.state.db())
        .await
        .expect("count");
    assert_eq!(stored, 0);
}

#[tokio::test]
async fn short_bucket_is_reported() {
    let ctx = test_support::setup_test_context().await;
    seed_bank(ctx.state.db(), "teacher-1").await;
    let token = test_support::bearer_token("teacher-1", Role::Teacher, ctx.state.settings());

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/generation/tests",
            Some(&token),
            Some(json!({
                "count": 6,
                "distribution": {"easy": 0, "medium": 0, "hard": 100}
            })),
        ))
        .await
        .expect("generate");

    let status = response.status();
    let body = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "response: {body}");
    assert!(body["detail"].as_str().unwrap_or_default().contains("hard has 2 of 6"));
}

#[tokio::test]
async fn foreign_private_questions_are_rejected() {
    let ctx = test_support::setup_test_context().await;
    let ids = seed_bank(ctx.state.db(), "teacher-1").await;
    let token = test_support::bearer_token("teacher-2", Role::Teacher, ctx.state.settings());

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/generation/tests",
            Some(&token),
            Some(json!({"question_ids": [ids[0].clone()]})),
        ))
        .await
        .expect("generate");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
