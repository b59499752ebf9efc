use axum::http::StatusCode;
use serde_json::json;
use std::time::Duration;
use ticket_trainer_api::services::ai_gateway::RawResult;

mod common;

use common::{create_session, create_test_app, send, TICKET_JSON};

#[tokio::test]
async fn test_new_session_is_idle() {
    let (app, backend) = create_test_app(vec![]);
    let (status, json) = send(&app, "POST", "/api/v1/sessions", None).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["state"], "idle");
    assert!(json["ticket"].is_null());
    assert_eq!(json["hints"], json!([]));
    assert!(json["next_step"].as_str().unwrap().contains("Generate"));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_full_practice_round() {
    let (app, backend) = create_test_app(vec![
        RawResult::Ok(TICKET_JSON.to_string()),
        RawResult::Ok("- Think about what happens at login\n- Compare with a working colleague".into()),
        RawResult::Ok("NO — the restart does not address the root cause".into()),
    ]);
    let id = create_session(&app).await;

    let (status, json) = send(
        &app,
        "POST",
        &format!("/api/v1/sessions/{}/ticket", id),
        Some(json!({ "difficulty": "simple" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "ticket_ready");
    assert_eq!(json["ticket"]["title"], "Shared drive not mapping at login");
    assert_eq!(json["ticket"]["requester"], "Jordan from Accounting");
    assert_eq!(json["ticket"]["difficulty"], "simple");
    assert_eq!(json["hint_heading"], "Helpful Hints");

    let (status, json) = send(
        &app,
        "PUT",
        &format!("/api/v1/sessions/{}/solution", id),
        Some(json!({ "text": "restart the service" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "solution_pending");
    assert_eq!(json["attempt"]["revision"], 1);

    let (status, json) = send(&app, "POST", &format!("/api/v1/sessions/{}/hints", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "hint_given");
    assert_eq!(json["hints"][0]["tier"], 1);
    assert_eq!(json["hints"][0]["attempt_ref"], 1);

    let (status, json) = send(
        &app,
        "POST",
        &format!("/api/v1/sessions/{}/evaluation", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "evaluated");
    assert_eq!(json["evaluation"]["verdict"], "no");
    assert!(json["evaluation"]["rationale"]
        .as_str()
        .unwrap()
        .contains("root cause"));
    assert!(json["next_step"].as_str().unwrap().contains("hint"));

    let requests = backend.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|r| r.model_id == "gemini-test"));
    assert!(requests[2].prompt.contains("restart the service"));
}

#[tokio::test]
async fn test_hint_without_ticket_is_conflict() {
    let (app, backend) = create_test_app(vec![]);
    let id = create_session(&app).await;

    let (status, json) = send(&app, "POST", &format!("/api/v1/sessions/{}/hints", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["kind"], "no_ticket");
    assert_eq!(json["retryable"], false);

    let (status, json) = send(
        &app,
        "POST",
        &format!("/api/v1/sessions/{}/evaluation", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["kind"], "no_ticket");
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_evaluation_without_solution_is_conflict() {
    let (app, backend) = create_test_app(vec![RawResult::Ok(TICKET_JSON.to_string())]);
    let id = create_session(&app).await;
    send(
        &app,
        "POST",
        &format!("/api/v1/sessions/{}/ticket", id),
        Some(json!({ "difficulty": "medium" })),
    )
    .await;

    let (status, json) = send(
        &app,
        "POST",
        &format!("/api/v1/sessions/{}/evaluation", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["kind"], "no_solution");
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_empty_solution_is_unprocessable() {
    let (app, _) = create_test_app(vec![RawResult::Ok(TICKET_JSON.to_string())]);
    let id = create_session(&app).await;
    send(
        &app,
        "POST",
        &format!("/api/v1/sessions/{}/ticket", id),
        Some(json!({ "difficulty": "simple" })),
    )
    .await;

    let (status, json) = send(
        &app,
        "PUT",
        &format!("/api/v1/sessions/{}/solution", id),
        Some(json!({ "text": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["kind"], "empty_solution");
}

#[tokio::test]
async fn test_timeout_on_hint_leaves_session_unchanged() {
    let (app, backend) = create_test_app(vec![
        RawResult::Ok(TICKET_JSON.to_string()),
        RawResult::Timeout,
        RawResult::Timeout,
    ]);
    let id = create_session(&app).await;
    send(
        &app,
        "POST",
        &format!("/api/v1/sessions/{}/ticket", id),
        Some(json!({ "difficulty": "complex" })),
    )
    .await;
    send(
        &app,
        "PUT",
        &format!("/api/v1/sessions/{}/solution", id),
        Some(json!({ "text": "remap the drive" })),
    )
    .await;

    let (status, json) = send(&app, "POST", &format!("/api/v1/sessions/{}/hints", id), None).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(json["kind"], "timeout");
    assert_eq!(json["retryable"], true);
    // Initial call plus one automatic retry.
    assert_eq!(backend.calls(), 3);

    let (_, view) = send(&app, "GET", &format!("/api/v1/sessions/{}", id), None).await;
    assert_eq!(view["state"], "solution_pending");
    assert_eq!(view["hints"], json!([]));
}

#[tokio::test]
async fn test_rate_limit_returns_retry_after() {
    let (app, backend) = create_test_app(vec![RawResult::RateLimited {
        retry_after: Some(Duration::from_secs(42)),
    }]);
    let id = create_session(&app).await;

    let (status, json) = send(
        &app,
        "POST",
        &format!("/api/v1/sessions/{}/ticket", id),
        Some(json!({ "difficulty": "simple" })),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["kind"], "rate_limited");
    assert_eq!(json["retry_after_secs"], 42);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_unparseable_ticket_returns_excerpt() {
    let (app, _) = create_test_app(vec![RawResult::Ok(
        "Sorry, I cannot help with that request.".to_string(),
    )]);
    let id = create_session(&app).await;

    let (status, json) = send(
        &app,
        "POST",
        &format!("/api/v1/sessions/{}/ticket", id),
        Some(json!({ "difficulty": "simple" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["kind"], "parse");
    assert!(json["excerpt"].as_str().unwrap().starts_with("Sorry"));

    let (_, view) = send(&app, "GET", &format!("/api/v1/sessions/{}", id), None).await;
    assert_eq!(view["state"], "idle");
}

#[tokio::test]
async fn test_new_ticket_clears_previous_work() {
    let (app, _) = create_test_app(vec![
        RawResult::Ok(TICKET_JSON.to_string()),
        RawResult::Ok("VERDICT: YES\nRATIONALE: Remapping restores the drive.".into()),
        RawResult::Ok(TICKET_JSON.to_string()),
    ]);
    let id = create_session(&app).await;
    let ticket_uri = format!("/api/v1/sessions/{}/ticket", id);

    send(&app, "POST", &ticket_uri, Some(json!({ "difficulty": "simple" }))).await;
    send(
        &app,
        "PUT",
        &format!("/api/v1/sessions/{}/solution", id),
        Some(json!({ "text": "remap the drive" })),
    )
    .await;
    let (_, evaluated) = send(
        &app,
        "POST",
        &format!("/api/v1/sessions/{}/evaluation", id),
        None,
    )
    .await;
    assert_eq!(evaluated["evaluation"]["verdict"], "yes");

    let (status, json) = send(&app, "POST", &ticket_uri, Some(json!({ "difficulty": "complex" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "ticket_ready");
    assert!(json["attempt"].is_null());
    assert!(json["evaluation"].is_null());
    assert_eq!(json["hints"], json!([]));
    assert_eq!(json["hint_heading"], "Expert Insights");
    assert_ne!(json["ticket"]["id"], evaluated["ticket"]["id"]);

    let (status, json) = send(&app, "DELETE", &ticket_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "idle");
    assert!(json["ticket"].is_null());
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let (app, _) = create_test_app(vec![]);

    let (status, json) = send(&app, "GET", "/api/v1/sessions/does-not-exist", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["kind"], "not_found");

    let (status, _) = send(&app, "DELETE", "/api/v1/sessions/does-not-exist", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_session() {
    let (app, _) = create_test_app(vec![]);
    let id = create_session(&app).await;

    let (status, _) = send(&app, "DELETE", &format!("/api/v1/sessions/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "GET", &format!("/api/v1/sessions/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bad_difficulty_is_bad_request() {
    let (app, backend) = create_test_app(vec![]);
    let id = create_session(&app).await;

    let (status, json) = send(
        &app,
        "POST",
        &format!("/api/v1/sessions/{}/ticket", id),
        Some(json!({ "difficulty": "impossible" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "bad_request");
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_auth_error_fails_fast_until_key_replaced() {
    let (app, backend) = create_test_app(vec![
        RawResult::AuthError("API key not valid".into()),
        RawResult::Ok(TICKET_JSON.to_string()),
    ]);
    let id = create_session(&app).await;
    let ticket_uri = format!("/api/v1/sessions/{}/ticket", id);

    let (status, json) = send(&app, "POST", &ticket_uri, Some(json!({ "difficulty": "simple" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["kind"], "auth");
    assert_eq!(json["retryable"], false);

    let (status, _) = send(&app, "POST", &ticket_uri, Some(json!({ "difficulty": "simple" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(backend.calls(), 1);

    let response = tower::ServiceExt::oneshot(
        app.clone(),
        axum::http::Request::builder()
            .method("PUT")
            .uri("/api/v1/settings/ai")
            .header("content-type", "application/json")
            .header("authorization", common::basic(common::ADMIN_AUTH))
            .body(axum::body::Body::from(
                json!({ "api_key": "fresh-key" }).to_string(),
            ))
            .unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, json) = send(&app, "POST", &ticket_uri, Some(json!({ "difficulty": "simple" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "ticket_ready");
    assert_eq!(backend.calls(), 2);
}
