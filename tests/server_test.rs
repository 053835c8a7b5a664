// Integration tests for HTTP server

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use lifeline::audit::{AuditRecorder, MemoryAuditRecorder};
use lifeline::config::Config;
use lifeline::crisis::{Language, RegionCode, RegionLocator, SubmissionPolicy, SurfacePolicies};
use lifeline::server::{create_router, SafetyServer};

fn test_config() -> Config {
    let mut config = Config::default();
    config.geolocation.enabled = false;
    config.server.max_sessions = 4;
    config
}

fn test_app(config: Config) -> (Router, Arc<MemoryAuditRecorder>) {
    let recorder = Arc::new(MemoryAuditRecorder::new());
    let server = SafetyServer::new(config, recorder.clone()).expect("server");
    (create_router(Arc::new(server)), recorder)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

async fn open_session(app: &Router, region: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/v1/sessions",
        Some(json!({ "user_id": "user-7", "region": region })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["session_id"].as_str().unwrap().to_string()
}

async fn wait_for_flags(recorder: &MemoryAuditRecorder, expected: usize) {
    for _ in 0..50 {
        if recorder.len() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = test_app(test_config());
    let (status, body) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_detect_endpoint() {
    let (app, _) = test_app(test_config());

    let (status, body) = send(
        &app,
        "POST",
        "/v1/detect",
        Some(json!({ "text": "I feel like giving up and want to die" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["matched"], true);
    assert_eq!(body["fail_safe"], false);
    let phrases: Vec<&str> = body["matched_phrases"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(phrases.contains(&"give up"));
    assert!(phrases.contains(&"want to die"));

    let (_, body) = send(
        &app,
        "POST",
        "/v1/detect",
        Some(json!({ "text": "死にたい", "language": "ja-JP" })),
    )
    .await;
    assert_eq!(body["matched_phrases"], json!(["死にたい"]));
}

#[tokio::test]
async fn test_resource_endpoint_falls_back() {
    let (app, _) = test_app(test_config());

    let (status, body) = send(&app, "GET", "/v1/resources/JP", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hotline_number"], "0570-783-556");

    let (status, body) = send(&app, "GET", "/v1/resources/ZZ", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["region_code"], "US");
    assert_eq!(body["hotline_number"], "988");
}

#[tokio::test]
async fn test_session_escalation_flow() {
    let (app, recorder) = test_app(test_config());
    let id = open_session(&app, "US").await;

    // Live typing opens the modal
    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/sessions/{}/fields", id),
        Some(json!({ "field": "chat_draft", "text": "nobody cares anyway" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"]["is_open"], true);
    assert_eq!(body["state"]["matched_phrases"], json!(["nobody cares"]));

    // Submission is audited and proceeds under the default policy
    let submit = json!({
        "surface": "chat",
        "entry_id": "msg-1",
        "fields": [{ "field": "chat_draft", "text": "nobody cares anyway" }]
    });
    let (status, body) = send(&app, "POST", &format!("/v1/sessions/{}/submit", id), Some(submit)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["decision"], "proceed");
    assert_eq!(body["flagged"], true);
    let attempt_id = body["attempt_id"].as_str().unwrap().to_string();

    // Replaying the attempt is not audited again
    let replay = json!({
        "surface": "chat",
        "entry_id": "msg-1",
        "attempt_id": attempt_id,
        "fields": [{ "field": "chat_draft", "text": "nobody cares anyway" }]
    });
    let (_, body) = send(&app, "POST", &format!("/v1/sessions/{}/submit", id), Some(replay)).await;
    assert_eq!(body["flagged"], false);

    // Contact leaves the modal open
    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/sessions/{}/contact", id),
        Some(json!({ "channel": "call" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"]["uri"], "tel:988");
    assert_eq!(body["state"]["is_open"], true);

    let (status, body) = send(&app, "POST", &format!("/v1/sessions/{}/dismiss", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"]["is_open"], false);
    assert_eq!(body["released"], json!([]));

    wait_for_flags(&recorder, 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(recorder.len(), 1);
}

#[tokio::test]
async fn test_blocking_policy_releases_on_dismiss() {
    let mut config = test_config();
    config.surfaces.journal = SubmissionPolicy::blocking();
    let (app, _) = test_app(config);
    let id = open_session(&app, "GB").await;

    let submit = json!({
        "surface": "journal",
        "entry_id": "entry-3",
        "fields": [
            { "field": "journal_title", "text": "Day 12" },
            { "field": "journal_body", "text": "I feel so hopeless" }
        ]
    });
    let (_, body) = send(&app, "POST", &format!("/v1/sessions/{}/submit", id), Some(submit)).await;
    assert_eq!(body["decision"], "held");
    assert_eq!(body["state"]["resource"]["region_code"], "GB");

    let (_, body) = send(&app, "POST", &format!("/v1/sessions/{}/dismiss", id), None).await;
    assert_eq!(body["released"][0]["entry_id"], "entry-3");
}

#[tokio::test]
async fn test_dismiss_releases_every_held_submission() {
    let mut config = test_config();
    config.surfaces = SurfacePolicies::uniform(SubmissionPolicy::blocking());
    let (app, recorder) = test_app(config);
    let id = open_session(&app, "US").await;

    for (surface, field, entry) in [
        ("journal", "journal_body", "msg-1"),
        ("chat", "chat_draft", "msg-2"),
    ] {
        let submit = json!({
            "surface": surface,
            "entry_id": entry,
            "fields": [{ "field": field, "text": "I want to die" }]
        });
        let (status, body) = send(&app, "POST", &format!("/v1/sessions/{}/submit", id), Some(submit)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["decision"], "held");
    }

    let (status, body) = send(&app, "POST", &format!("/v1/sessions/{}/dismiss", id), None).await;
    assert_eq!(status, StatusCode::OK);
    let released = body["released"].as_array().unwrap();
    assert_eq!(released.len(), 2);
    assert_eq!(released[0]["entry_id"], "msg-1");
    assert_eq!(released[1]["entry_id"], "msg-2");

    wait_for_flags(&recorder, 2).await;
    assert_eq!(recorder.len(), 2);
}

#[tokio::test]
async fn test_unknown_language_uses_configured_default() {
    let mut config = test_config();
    config.default_language = Language::Ja;
    let (app, _) = test_app(config);

    let (status, body) = send(
        &app,
        "POST",
        "/v1/detect",
        Some(json!({ "text": "もう死にたい", "language": "fr" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["matched"], true);

    let (status, body) = send(
        &app,
        "POST",
        "/v1/sessions",
        Some(json!({ "user_id": "user-8", "language": "fr" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["language"], "ja");
}

#[tokio::test]
async fn test_submit_rejects_foreign_fields() {
    let (app, _) = test_app(test_config());
    let id = open_session(&app, "US").await;

    let submit = json!({
        "surface": "journal",
        "entry_id": "entry-1",
        "fields": [{ "field": "chat_draft", "text": "hello" }]
    });
    let (status, body) = send(&app, "POST", &format!("/v1/sessions/{}/submit", id), Some(submit)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_request");
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let (app, _) = test_app(test_config());

    let (status, body) = send(&app, "GET", "/v1/sessions/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "not_found");

    let (status, _) = send(&app, "DELETE", "/v1/sessions/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_session_limit() {
    let (app, _) = test_app(test_config());
    for _ in 0..4 {
        open_session(&app, "US").await;
    }

    let (status, body) = send(
        &app,
        "POST",
        "/v1/sessions",
        Some(json!({ "user_id": "user-8", "region": "US" })),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["type"], "session_limit");
}

#[tokio::test]
async fn test_delete_session() {
    let (app, _) = test_app(test_config());
    let id = open_session(&app, "US").await;

    let (status, _) = send(&app, "DELETE", &format!("/v1/sessions/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "GET", &format!("/v1/sessions/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_flag_review_endpoints() {
    let (app, recorder) = test_app(test_config());
    let flag = recorder
        .record_flag("user-7", "entry-1", &["hopeless".to_string()])
        .await
        .unwrap();
    recorder
        .record_flag("user-9", "entry-2", &["burden".to_string()])
        .await
        .unwrap();

    let (status, body) = send(&app, "GET", "/v1/flags", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (_, body) = send(&app, "GET", "/v1/flags?user_id=user-7", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["entry_id"], "entry-1");

    let (status, _) = send(&app, "POST", &format!("/v1/flags/{}/dismiss", flag), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let flags = recorder.list_flags().await.unwrap();
    assert!(flags.iter().any(|record| record.id == flag && record.dismissed));

    let (status, _) = send(
        &app,
        "POST",
        "/v1/flags/00000000-0000-0000-0000-000000000000/dismiss",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "POST", "/v1/flags/not-a-uuid/dismiss", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = test_app(test_config());
    send(&app, "POST", "/v1/detect", Some(json!({ "text": "pills" }))).await;

    let (status, body) = send(&app, "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    let text = body.as_str().unwrap();
    assert!(text.contains("lifeline_detections_total"));
}

#[tokio::test]
async fn test_geolocated_session_picks_region_and_language() {
    let mut geo = mockito::Server::new_async().await;
    let mock = geo
        .mock("GET", "/json/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"country_code":"JP"}"#)
        .create_async()
        .await;

    let recorder = Arc::new(MemoryAuditRecorder::new());
    let locator = RegionLocator::new(
        format!("{}/json/", geo.url()),
        Duration::from_secs(2),
        RegionCode::us(),
    )
    .unwrap();
    let server = SafetyServer::new(test_config(), recorder)
        .unwrap()
        .with_locator(locator);
    let app = create_router(Arc::new(server));

    let (status, body) = send(&app, "POST", "/v1/sessions", Some(json!({ "user_id": "user-1" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["language"], "ja");
    assert_eq!(body["state"]["resource"]["hotline_number"], "0570-783-556");
    mock.assert_async().await;
}
