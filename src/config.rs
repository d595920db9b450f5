use crate::error::{Error, Result};
use crate::models::proctoring_event::{EventType, Severity};
use crate::services::session_clock::SessionPolicy;
use crate::services::violation_tracker::ProctoringPolicy;
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub internal_api_secret: String,
    pub public_rps: u32,
    pub classifier_url: Option<String>,
    pub classifier_timeout_ms: u64,
    pub notification_webhook_url: Option<String>,
    pub notification_webhook_secret: Option<String>,
    pub reaper_cron: String,
    pub engine: EngineConfig,
}

pub const DEFAULT_MAX_FRAME_BYTES: usize = 2 * 1024 * 1024;
const BODY_HEADROOM_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub session: SessionPolicy,
    pub proctoring: ProctoringPolicy,
    pub max_frame_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session: SessionPolicy::default(),
            proctoring: ProctoringPolicy::default(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl EngineConfig {
    /// Body cap that still fits a base64 frame of `max_frame_bytes`.
    pub fn max_body_bytes(&self) -> usize {
        self.max_frame_bytes.div_ceil(3) * 4 + BODY_HEADROOM_BYTES
    }
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let mut proctoring = ProctoringPolicy {
            high_weight: get_env_or("VIOLATION_WEIGHT_HIGH", 1.0)?,
            medium_weight: get_env_or("VIOLATION_WEIGHT_MEDIUM", 0.5)?,
            low_weight: get_env_or("VIOLATION_WEIGHT_LOW", 0.0)?,
            high_cancel_threshold: get_env_or("VIOLATION_HIGH_CANCEL_THRESHOLD", 3)?,
            medium_cancel_threshold: get_env_or("VIOLATION_MEDIUM_CANCEL_THRESHOLD", 6)?,
            ..ProctoringPolicy::default()
        };
        if let Ok(raw) = env::var("VIOLATION_SEVERITY_OVERRIDES") {
            for (event_type, severity) in parse_severity_overrides(&raw)? {
                proctoring.severities.insert(event_type, severity);
            }
        }
        if proctoring.high_cancel_threshold == 0 || proctoring.medium_cancel_threshold == 0 {
            return Err(Error::Config(
                "Violation cancel thresholds must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            jwt_secret: get_env("JWT_SECRET")?,
            internal_api_secret: get_env("INTERNAL_API_SECRET")?,
            public_rps: get_env_parse("PUBLIC_RPS")?,
            classifier_url: env::var("CLASSIFIER_URL").ok().filter(|v| !v.is_empty()),
            classifier_timeout_ms: get_env_or("CLASSIFIER_TIMEOUT_MS", 3000)?,
            notification_webhook_url: env::var("NOTIFICATION_WEBHOOK_URL")
                .ok()
                .filter(|v| !v.is_empty()),
            notification_webhook_secret: env::var("NOTIFICATION_WEBHOOK_SECRET").ok(),
            reaper_cron: env::var("REAPER_CRON").unwrap_or_else(|_| "0 */5 * * * *".to_string()),
            engine: EngineConfig {
                session: SessionPolicy::with_grace_ms(get_env_or("SESSION_GRACE_MS", 3000)?),
                proctoring,
                max_frame_bytes: get_env_or("MAX_FRAME_BYTES", DEFAULT_MAX_FRAME_BYTES)?,
            },
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        self.engine.clone()
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse<T>(name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(name)?;
    raw.parse()
        .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e)))
}

fn get_env_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(_) => get_env_parse(name),
        Err(_) => Ok(default),
    }
}

pub fn parse_severity_overrides(raw: &str) -> Result<Vec<(EventType, Severity)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (event, severity) = pair.split_once('=').ok_or_else(|| {
                Error::Config(format!("Invalid severity override '{}'", pair))
            })?;
            let event_type = event.parse::<EventType>().map_err(Error::Config)?;
            let severity = severity.parse::<Severity>().map_err(Error::Config)?;
            Ok((event_type, severity))
        })
        .collect()
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}
