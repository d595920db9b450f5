use axum::{extract::State, http::HeaderMap, response::Json};

use crate::dto::session_dto::SweepResponse;
use crate::error::{Error, Result};
use crate::utils::signature::constant_time_eq;
use crate::AppState;

pub const INTERNAL_SECRET_HEADER: &str = "X-Internal-Secret";

#[utoipa::path(
    post,
    path = "/api/internal/reaper/run",
    responses(
        (status = 200, description = "Abandoned sessions timed out", body = SweepResponse),
        (status = 401, description = "Missing or wrong internal secret")
    )
)]
#[axum::debug_handler]
pub async fn run_reaper(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SweepResponse>> {
    let provided = headers
        .get(INTERNAL_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if provided.is_empty() || !constant_time_eq(provided, &state.internal_api_secret) {
        return Err(Error::Unauthorized("Invalid internal secret".to_string()));
    }

    let report = state.reaper.sweep().await?;
    tracing::info!(scanned = report.scanned, reaped = report.reaped.len(), "manual reaper sweep");
    Ok(Json(SweepResponse {
        scanned: report.scanned,
        reaped: report.reaped,
    }))
}
