use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::session_dto::{
    QuestionsResponse, ReviewResponse, StatusResponse,
    SubmitAnswerRequest, SubmitAnswerResponse, SubmitExamResponse,
};
use crate::error::Result;
use crate::middleware::auth::Claims;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/api/exams/{exam_id}/sessions",
    params(("exam_id" = Uuid, Path, description = "Exam ID")),
    responses(
        (status = 201, description = "Session started", body = StartSessionResponse),
        (status = 200, description = "Existing session resumed", body = StartSessionResponse),
        (status = 404, description = "Exam not found"),
        (status = 409, description = "Exam closed or attempt limit reached")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn start_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<Uuid>,
) -> Result<Response> {
    let started = state
        .orchestrator
        .start_or_resume(&claims.sub, exam_id)
        .await?;
    let status = if started.resumed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(started)).into_response())
}

#[utoipa::path(
    get,
    path = "/api/sessions/{id}/questions",
    params(("id" = Uuid, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Questions without correct answers", body = QuestionsResponse),
        (status = 403, description = "Session belongs to someone else"),
        (status = 404, description = "Session not found")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn get_questions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<QuestionsResponse>> {
    Ok(Json(state.orchestrator.get_questions(id, &claims.sub).await?))
}

#[utoipa::path(
    get,
    path = "/api/sessions/{id}/status",
    params(("id" = Uuid, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Status, remaining time and progress", body = StatusResponse),
        (status = 404, description = "Session not found")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn get_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>> {
    Ok(Json(state.orchestrator.status(id, &claims.sub).await?))
}

#[utoipa::path(
    put,
    path = "/api/sessions/{id}/answers",
    params(("id" = Uuid, Path, description = "Session ID")),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer saved", body = SubmitAnswerResponse),
        (status = 400, description = "Invalid option"),
        (status = 409, description = "Session is no longer in progress")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn submit_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<Json<SubmitAnswerResponse>> {
    payload.validate()?;
    let saved = state
        .orchestrator
        .submit_answer(id, &claims.sub, payload.question_id, payload.selected_option)
        .await?;
    Ok(Json(saved))
}

#[utoipa::path(
    post,
    path = "/api/sessions/{id}/submit",
    params(("id" = Uuid, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Final result; repeated calls return the stored result", body = SubmitExamResponse),
        (status = 404, description = "Session not found")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn submit_exam(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<SubmitExamResponse>> {
    Ok(Json(state.orchestrator.submit_exam(id, &claims.sub).await?))
}

#[utoipa::path(
    get,
    path = "/api/sessions/{id}/answers",
    params(("id" = Uuid, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Graded answers", body = ReviewResponse),
        (status = 409, description = "Session has not ended yet")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn review_answers(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReviewResponse>> {
    Ok(Json(state.orchestrator.get_answers(id, &claims.sub).await?))
}
