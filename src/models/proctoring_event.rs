use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    NoFaceDetected,
    MultipleFaces,
    LookingAway,
    FaceDetected,
    Unrecognized,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::NoFaceDetected,
        EventType::MultipleFaces,
        EventType::LookingAway,
        EventType::FaceDetected,
        EventType::Unrecognized,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::NoFaceDetected => "no-face-detected",
            EventType::MultipleFaces => "multiple-faces",
            EventType::LookingAway => "looking-away",
            EventType::FaceDetected => "face-detected",
            EventType::Unrecognized => "unrecognized",
        }
    }

    /// Client-reported types are free-form; anything unknown is `Unrecognized`.
    pub fn classify(raw: &str) -> EventType {
        raw.parse().unwrap_or(EventType::Unrecognized)
    }

    pub fn describe(self) -> &'static str {
        match self {
            EventType::NoFaceDetected => "no face detected",
            EventType::MultipleFaces => "multiple faces detected",
            EventType::LookingAway => "looking away from the screen",
            EventType::FaceDetected => "face detected",
            EventType::Unrecognized => "unrecognized activity",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| format!("unknown event type '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProctoringEvent {
    pub id: Uuid,
    pub session_id: Uuid,
    pub event_type: EventType,
    pub severity: Severity,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProctoringEvent {
    pub session_id: Uuid,
    pub event_type: EventType,
    pub severity: Severity,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
}
