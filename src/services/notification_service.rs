use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::exam_session::SessionStatus;
use crate::services::violation_tracker::{ViolationCounts, WarningLevel};
use crate::utils::signature::sign_payload;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ViolationWarning {
    pub session_id: Uuid,
    pub participant_id: String,
    pub warning_level: WarningLevel,
    pub message: Option<String>,
    pub counts: ViolationCounts,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
}

/// Delivery is fire-and-forget: `notify` must return without waiting on I/O.
#[cfg_attr(test, mockall::automock)]
pub trait WarningNotifier: Send + Sync {
    fn notify(&self, warning: ViolationWarning);
}

#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    target_url: String,
    secret: Option<String>,
}

impl WebhookNotifier {
    pub fn new(target_url: String, secret: Option<String>) -> Self {
        Self {
            client: Client::new(),
            target_url,
            secret,
        }
    }
}

impl WarningNotifier for WebhookNotifier {
    fn notify(&self, warning: ViolationWarning) {
        let body = match serde_json::to_vec(&warning) {
            Ok(body) => body,
            Err(err) => {
                error!(error = %err, "failed to serialize violation warning");
                return;
            }
        };
        let signature = self
            .secret
            .as_deref()
            .and_then(|secret| sign_payload(secret, &body));
        let client = self.client.clone();
        let target_url = self.target_url.clone();

        tokio::spawn(async move {
            let mut req = client
                .post(&target_url)
                .header("Content-Type", "application/json")
                .body(body);
            if let Some(sig) = signature {
                req = req.header("X-Signature", format!("sha256={}", sig));
            }
            match req.send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!(session_id = %warning.session_id, "violation warning delivered");
                }
                Ok(resp) => {
                    warn!(
                        session_id = %warning.session_id,
                        http_status = resp.status().as_u16(),
                        "violation warning rejected by webhook"
                    );
                }
                Err(err) => {
                    error!(session_id = %warning.session_id, error = %err, "violation warning delivery failed");
                }
            }
        });
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl WarningNotifier for LogNotifier {
    fn notify(&self, warning: ViolationWarning) {
        warn!(
            session_id = %warning.session_id,
            participant_id = %warning.participant_id,
            level = ?warning.warning_level,
            status = %warning.status,
            message = warning.message.as_deref().unwrap_or(""),
            "violation warning"
        );
    }
}

#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<ViolationWarning>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ViolationWarning>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl WarningNotifier for ChannelNotifier {
    fn notify(&self, warning: ViolationWarning) {
        if self.tx.send(warning).is_err() {
            warn!("violation warning dropped: receiver closed");
        }
    }
}
