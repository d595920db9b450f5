use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;
use uuid::Uuid;

use proctored_exam_backend::config::{EngineConfig, DEFAULT_MAX_FRAME_BYTES};
use proctored_exam_backend::database::memory::InMemoryStore;
use proctored_exam_backend::middleware::auth::issue_token;
use proctored_exam_backend::models::exam::Exam;
use proctored_exam_backend::models::question::Question;
use proctored_exam_backend::routes;
use proctored_exam_backend::services::classifier_service::DisabledClassifier;
use proctored_exam_backend::services::notification_service::LogNotifier;
use proctored_exam_backend::utils::time::SystemClock;
use proctored_exam_backend::{AppState, Ports};

const JWT_SECRET: &str = "test_secret_key";
const INTERNAL_SECRET: &str = "internal_test_secret";

fn app() -> (Router, Uuid) {
    let store = Arc::new(InMemoryStore::new());
    let exam = Exam {
        id: Uuid::new_v4(),
        title: "Public Test".into(),
        duration_minutes: 10,
        max_attempts: None,
        is_active: true,
        questions: vec![Question {
            id: 1,
            content: "2+2?".into(),
            options: vec!["1".into(), "2".into(), "3".into(), "4".into()],
            correct_answer: 3,
            default_score: 1,
        }],
    };
    let exam_id = exam.id;
    store.put_exam(exam);

    let state = AppState::new(
        Ports {
            store: store.clone(),
            catalog: store,
            clock: Arc::new(SystemClock),
            classifier: Arc::new(DisabledClassifier),
            notifier: Arc::new(LogNotifier),
        },
        EngineConfig::default(),
        JWT_SECRET,
        INTERNAL_SECRET,
        100,
    );
    (routes::router(state), exam_id)
}

fn bearer(participant: &str) -> String {
    format!("Bearer {}", issue_token(participant, JWT_SECRET, 3600).expect("token"))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    auth: Option<&str>,
    body: Option<JsonValue>,
) -> (StatusCode, JsonValue) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header("Authorization", auth);
    }
    let req = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null);
    (status, json)
}

#[tokio::test]
async fn public_flow_end_to_end() {
    let (app, exam_id) = app();
    let alice = bearer("alice");

    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let start_uri = format!("/api/exams/{}/sessions", exam_id);
    let (status, body) = send(&app, "POST", &start_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["session"]["status"], "IN_PROGRESS");
    assert!(body["questions"][0].get("correct_answer").is_none());
    let session_id = body["session"]["session_id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "POST", &start_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["session_id"], session_id.as_str());

    let answers_uri = format!("/api/sessions/{}/answers", session_id);
    let (status, body) = send(
        &app,
        "PUT",
        &answers_uri,
        Some(&alice),
        Some(json!({"question_id": 1, "selected_option": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["progress"]["answered"], 1);
    assert_eq!(body["progress"]["percentage"], 100);

    let (status, body) = send(&app, "GET", &answers_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "state_conflict");
    assert_eq!(body["status"], "IN_PROGRESS");

    let submit_uri = format!("/api/sessions/{}/submit", session_id);
    let (status, body) = send(&app, "POST", &submit_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["status"], "FINISHED");
    assert_eq!(body["score"], 1);

    let (status, again) = send(&app, "POST", &submit_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["score"], body["score"]);
    assert_eq!(again["session"]["submitted_at"], body["session"]["submitted_at"]);

    let (status, body) = send(
        &app,
        "PUT",
        &answers_uri,
        Some(&alice),
        Some(json!({"question_id": 1, "selected_option": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "FINISHED");
    assert_eq!(body["remaining_seconds"], 0);

    let (status, body) = send(&app, "GET", &answers_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answers"][0]["is_correct"], true);
}

#[tokio::test]
async fn auth_and_ownership_errors() {
    let (app, exam_id) = app();
    let start_uri = format!("/api/exams/{}/sessions", exam_id);

    let (status, body) = send(&app, "POST", &start_uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = send(&app, "POST", &start_uri, Some("Bearer not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, body) = send(&app, "POST", &start_uri, Some(&bearer("alice")), None).await;
    let session_id = body["session"]["session_id"].as_str().unwrap().to_string();

    let status_uri = format!("/api/sessions/{}/status", session_id);
    let (status, body) = send(&app, "GET", &status_uri, Some(&bearer("mallory")), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let missing = format!("/api/sessions/{}/status", Uuid::new_v4());
    let (status, _) = send(&app, "GET", &missing, Some(&bearer("alice")), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "GET", &status_uri, Some(&bearer("alice")), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["progress"]["total"], 1);
}

#[tokio::test]
async fn proctoring_endpoints() {
    let (app, exam_id) = app();
    let alice = bearer("alice");
    let start_uri = format!("/api/exams/{}/sessions", exam_id);
    let (_, body) = send(&app, "POST", &start_uri, Some(&alice), None).await;
    let session_id = body["session"]["session_id"].as_str().unwrap().to_string();

    let violations_uri = format!("/api/sessions/{}/violations", session_id);
    let (status, body) = send(
        &app,
        "POST",
        &violations_uri,
        Some(&alice),
        Some(json!({"event_type": "no-face-detected", "metadata": {"source": "browser"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["event"]["severity"], "HIGH");
    assert_eq!(body["evaluation"]["warning_level"], "first");

    let (status, _) = send(
        &app,
        "POST",
        &violations_uri,
        Some(&alice),
        Some(json!({"event_type": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // No classifier configured: the frame is accepted and nothing is recorded.
    let frames_uri = format!("/api/sessions/{}/frames", session_id);
    let (status, body) = send(
        &app,
        "POST",
        &frames_uri,
        Some(&alice),
        Some(json!({"image": "data:image/jpeg;base64,aGVsbG8="})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["degraded"], true);
    assert!(body["event"].is_null());
    assert_eq!(body["evaluation"]["counts"]["high"], 1);

    let (status, _) = send(
        &app,
        "POST",
        &frames_uri,
        Some(&alice),
        Some(json!({"image": "***"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn frames_near_the_size_limit_are_judged_by_frame_validation() {
    let (app, exam_id) = app();
    let alice = bearer("alice");
    let start_uri = format!("/api/exams/{}/sessions", exam_id);
    let (_, body) = send(&app, "POST", &start_uri, Some(&alice), None).await;
    let session_id = body["session"]["session_id"].as_str().unwrap().to_string();
    let frames_uri = format!("/api/sessions/{}/frames", session_id);

    let under = STANDARD.encode(vec![7u8; DEFAULT_MAX_FRAME_BYTES - 1024]);
    let (status, body) = send(
        &app,
        "POST",
        &frames_uri,
        Some(&alice),
        Some(json!({ "image": under })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["degraded"], true);

    let over = STANDARD.encode(vec![7u8; DEFAULT_MAX_FRAME_BYTES + 1024]);
    let (status, body) = send(
        &app,
        "POST",
        &frames_uri,
        Some(&alice),
        Some(json!({ "image": over })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn internal_reaper_requires_secret() {
    let (app, _) = app();

    let (status, _) = send(&app, "POST", "/api/internal/reaper/run", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .method("POST")
        .uri("/api/internal/reaper/run")
        .header("X-Internal-Secret", INTERNAL_SECRET)
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: JsonValue = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["scanned"], 0);
}

#[tokio::test]
async fn openapi_document_lists_session_routes() {
    let (app, _) = app();
    let (status, body) = send(&app, "GET", "/api/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"].get("/api/sessions/{id}/answers").is_some());
    assert!(body["components"]["securitySchemes"].get("bearer").is_some());
}
