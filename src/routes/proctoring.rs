use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::session_dto::{AnalyzeFrameRequest, LogViolationRequest, ViolationResponse};
use crate::error::Result;
use crate::middleware::auth::Claims;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/api/sessions/{id}/violations",
    params(("id" = Uuid, Path, description = "Session ID")),
    request_body = LogViolationRequest,
    responses(
        (status = 200, description = "Event recorded; evaluation after the write", body = ViolationResponse),
        (status = 409, description = "Session is no longer in progress")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn log_violation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LogViolationRequest>,
) -> Result<Json<ViolationResponse>> {
    payload.validate()?;
    let resp = state
        .orchestrator
        .log_violation(id, &claims.sub, &payload.event_type, payload.metadata)
        .await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/sessions/{id}/frames",
    params(("id" = Uuid, Path, description = "Session ID")),
    request_body = AnalyzeFrameRequest,
    responses(
        (status = 200, description = "Frame classified, or degraded when the classifier is unavailable", body = ViolationResponse),
        (status = 400, description = "Frame is not valid base64 or too large"),
        (status = 409, description = "Session is no longer in progress")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn analyze_frame(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AnalyzeFrameRequest>,
) -> Result<Json<ViolationResponse>> {
    payload.validate()?;
    let resp = state
        .orchestrator
        .analyze_frame(id, &claims.sub, &payload.image)
        .await?;
    Ok(Json(resp))
}
