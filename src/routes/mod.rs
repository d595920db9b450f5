pub mod health;
pub mod internal;
pub mod proctoring;
pub mod sessions;

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Json, Router,
};
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::dto::session_dto::{
    AnalyzeFrameRequest, LogViolationRequest, QuestionsResponse, RecordedEvent, ReviewResponse,
    SessionView, StartSessionResponse, StatusResponse, SubmitAnswerRequest,
    SubmitAnswerResponse, SubmitExamResponse, SweepResponse, ViolationResponse,
};
use crate::middleware::{auth::require_bearer_auth, cors::session_cors, rate_limit::rps_middleware};
use crate::models::answer::Answer;
use crate::models::exam_session::SessionStatus;
use crate::models::proctoring_event::{EventType, Severity};
use crate::models::question::QuestionView;
use crate::services::answer_ledger::Progress;
use crate::services::grading_service::GradedAnswer;
use crate::services::violation_tracker::{ViolationCounts, ViolationEvaluation, WarningLevel};
use crate::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        sessions::start_session,
        sessions::get_questions,
        sessions::get_status,
        sessions::submit_answer,
        sessions::submit_exam,
        sessions::review_answers,
        proctoring::log_violation,
        proctoring::analyze_frame,
        internal::run_reaper,
    ),
    components(schemas(
        SessionStatus,
        SessionView,
        StartSessionResponse,
        QuestionsResponse,
        QuestionView,
        SubmitAnswerRequest,
        SubmitAnswerResponse,
        Answer,
        Progress,
        SubmitExamResponse,
        ReviewResponse,
        GradedAnswer,
        StatusResponse,
        LogViolationRequest,
        AnalyzeFrameRequest,
        ViolationResponse,
        RecordedEvent,
        EventType,
        Severity,
        ViolationEvaluation,
        ViolationCounts,
        WarningLevel,
        SweepResponse,
    )),
    modifiers(&BearerAuth),
    tags((name = "sessions", description = "Proctored exam sessions"))
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn router(state: AppState) -> Router {
    let participant_api = Router::new()
        .route("/api/exams/:exam_id/sessions", post(sessions::start_session))
        .route("/api/sessions/:id/questions", get(sessions::get_questions))
        .route("/api/sessions/:id/status", get(sessions::get_status))
        .route(
            "/api/sessions/:id/answers",
            put(sessions::submit_answer).get(sessions::review_answers),
        )
        .route("/api/sessions/:id/submit", post(sessions::submit_exam));

    let proctoring_api = Router::new()
        .route("/api/sessions/:id/violations", post(proctoring::log_violation))
        .route("/api/sessions/:id/frames", post(proctoring::analyze_frame))
        .layer(from_fn_with_state(state.rate_limiter.clone(), rps_middleware));

    let authenticated = participant_api
        .merge(proctoring_api)
        .layer(from_fn_with_state(state.clone(), require_bearer_auth));

    Router::new()
        .route("/health", get(health::health))
        .route("/api/openapi.json", get(openapi_json))
        .route("/api/internal/reaper/run", post(internal::run_reaper))
        .merge(authenticated)
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(session_cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
