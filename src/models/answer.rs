use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Answer {
    pub session_id: Uuid,
    pub question_id: i32,
    pub selected_option: Option<i32>,
    pub answered_at: DateTime<Utc>,
}
