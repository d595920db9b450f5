use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;
use url::Url;

use crate::error::{Error, Result};
use crate::models::proctoring_event::EventType;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub event_type: EventType,
    pub face_count: u32,
    pub confidence: f64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameClassifier: Send + Sync {
    /// `frame` is plain base64 without a data-URL prefix.
    async fn classify(&self, frame: &str) -> Result<Classification>;
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    image: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    #[serde(default)]
    pub face_count: u32,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub looking_away: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl From<AnalyzeResponse> for Classification {
    fn from(resp: AnalyzeResponse) -> Self {
        let event_type = if !resp.success {
            EventType::Unrecognized
        } else {
            match resp.face_count {
                0 => EventType::NoFaceDetected,
                1 if resp.looking_away => EventType::LookingAway,
                1 => EventType::FaceDetected,
                _ => EventType::MultipleFaces,
            }
        };
        Self {
            event_type,
            face_count: resp.face_count,
            confidence: resp.confidence,
        }
    }
}

#[derive(Clone)]
pub struct HttpFrameClassifier {
    client: Client,
    endpoint: Url,
}

impl HttpFrameClassifier {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid CLASSIFIER_URL '{}': {}", base_url, e)))?;
        let endpoint = base
            .join("analyze")
            .map_err(|e| Error::Config(format!("Invalid CLASSIFIER_URL '{}': {}", base_url, e)))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl FrameClassifier for HttpFrameClassifier {
    async fn classify(&self, frame: &str) -> Result<Classification> {
        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(&AnalyzeRequest { image: frame })
            .send()
            .await?
            .error_for_status()?;
        let body: AnalyzeResponse = resp.json().await?;
        if let Some(err) = body.error.as_deref() {
            warn!(error = err, "classifier reported a problem with the frame");
        }
        Ok(body.into())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledClassifier;

#[async_trait]
impl FrameClassifier for DisabledClassifier {
    async fn classify(&self, _frame: &str) -> Result<Classification> {
        Err(Error::Internal("frame classifier is not configured".to_string()))
    }
}

pub fn validate_frame(raw: &str, max_bytes: usize) -> Result<String> {
    let payload = match raw.split_once(',') {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => raw,
    }
    .trim();
    if payload.is_empty() {
        return Err(Error::BadRequest("Frame is empty".to_string()));
    }
    // Cheap upper bound before decoding anything.
    if payload.len() / 4 * 3 > max_bytes + 3 {
        return Err(Error::BadRequest(format!(
            "Frame exceeds the {} byte limit",
            max_bytes
        )));
    }
    let decoded = STANDARD
        .decode(payload)
        .map_err(|e| Error::BadRequest(format!("Frame is not valid base64: {}", e)))?;
    if decoded.len() > max_bytes {
        return Err(Error::BadRequest(format!(
            "Frame exceeds the {} byte limit",
            max_bytes
        )));
    }
    Ok(payload.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(success: bool, face_count: u32, looking_away: bool) -> AnalyzeResponse {
        AnalyzeResponse {
            success,
            face_count,
            confidence: 0.9,
            looking_away,
            error: None,
        }
    }

    #[test]
    fn maps_detector_output_to_event_types() {
        let cases = [
            (response(true, 0, false), EventType::NoFaceDetected),
            (response(true, 2, false), EventType::MultipleFaces),
            (response(true, 1, true), EventType::LookingAway),
            (response(true, 1, false), EventType::FaceDetected),
            (response(false, 1, false), EventType::Unrecognized),
        ];
        for (resp, expected) in cases {
            assert_eq!(Classification::from(resp).event_type, expected);
        }
    }

    #[test]
    fn validate_strips_data_url_prefix() {
        let frame = format!("data:image/jpeg;base64,{}", STANDARD.encode(b"jpegbytes"));
        let cleaned = validate_frame(&frame, 1024).unwrap();
        assert_eq!(cleaned, STANDARD.encode(b"jpegbytes"));
    }

    #[test]
    fn validate_rejects_garbage_and_oversize() {
        assert!(matches!(
            validate_frame("not base64!!", 1024),
            Err(Error::BadRequest(_))
        ));
        assert!(matches!(validate_frame("", 1024), Err(Error::BadRequest(_))));
        let big = STANDARD.encode(vec![0u8; 2048]);
        assert!(matches!(validate_frame(&big, 1024), Err(Error::BadRequest(_))));
    }

    #[test]
    fn classifier_url_must_parse() {
        assert!(HttpFrameClassifier::new("not a url", Duration::from_secs(1)).is_err());
        let ok = HttpFrameClassifier::new("http://localhost:8001/", Duration::from_secs(1)).unwrap();
        assert_eq!(ok.endpoint().as_str(), "http://localhost:8001/analyze");
    }

    #[tokio::test]
    async fn disabled_classifier_always_fails() {
        assert!(DisabledClassifier.classify("AAAA").await.is_err());
    }
}
