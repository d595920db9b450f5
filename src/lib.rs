pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::config::{Config, EngineConfig};
use crate::database::postgres::PgStore;
use crate::database::store::{ExamCatalog, SessionStore};
use crate::middleware::rate_limit::RateLimiter;
use crate::services::{
    classifier_service::{DisabledClassifier, FrameClassifier, HttpFrameClassifier},
    notification_service::{LogNotifier, WarningNotifier, WebhookNotifier},
    reaper_service::ReaperService,
    session_orchestrator::SessionOrchestrator,
};
use crate::utils::time::{Clock, SystemClock};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: SessionOrchestrator,
    pub reaper: ReaperService,
    pub jwt_secret: Arc<str>,
    pub internal_api_secret: Arc<str>,
    pub rate_limiter: RateLimiter,
    pub max_body_bytes: usize,
}

pub struct Ports {
    pub store: Arc<dyn SessionStore>,
    pub catalog: Arc<dyn ExamCatalog>,
    pub clock: Arc<dyn Clock>,
    pub classifier: Arc<dyn FrameClassifier>,
    pub notifier: Arc<dyn WarningNotifier>,
}

impl AppState {
    pub fn new(
        ports: Ports,
        engine: EngineConfig,
        jwt_secret: &str,
        internal_api_secret: &str,
        public_rps: u32,
    ) -> Self {
        let max_body_bytes = engine.max_body_bytes();
        let orchestrator = SessionOrchestrator::new(
            ports.store.clone(),
            ports.catalog,
            ports.clock.clone(),
            ports.classifier,
            ports.notifier,
            engine,
        );
        let reaper = ReaperService::new(
            ports.store,
            orchestrator.state_machine().clone(),
            ports.clock,
        );
        Self {
            orchestrator,
            reaper,
            jwt_secret: Arc::from(jwt_secret),
            internal_api_secret: Arc::from(internal_api_secret),
            rate_limiter: RateLimiter::new(public_rps),
            max_body_bytes,
        }
    }

    pub fn from_config(config: &Config, pool: PgPool) -> error::Result<Self> {
        let store = Arc::new(PgStore::new(pool));

        let classifier: Arc<dyn FrameClassifier> = match config.classifier_url.as_deref() {
            Some(url) => Arc::new(HttpFrameClassifier::new(
                url,
                Duration::from_millis(config.classifier_timeout_ms),
            )?),
            None => {
                tracing::warn!("CLASSIFIER_URL not set; frame analysis is disabled");
                Arc::new(DisabledClassifier)
            }
        };
        let notifier: Arc<dyn WarningNotifier> = match config.notification_webhook_url.clone() {
            Some(url) => Arc::new(WebhookNotifier::new(
                url,
                config.notification_webhook_secret.clone(),
            )),
            None => Arc::new(LogNotifier),
        };

        Ok(Self::new(
            Ports {
                store: store.clone(),
                catalog: store,
                clock: Arc::new(SystemClock),
                classifier,
                notifier,
            },
            config.engine_config(),
            &config.jwt_secret,
            &config.internal_api_secret,
            config.public_rps,
        ))
    }
}
