use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Unset means the in-process store; data is lost on restart.
    pub database_url: Option<String>,
    pub port: u16,
    pub stream_heartbeat: Duration,
    pub presence_window: Duration,
    pub notification_timeout: Duration,
    /// How long a claimed side effect stays deduplicated
    pub dedup_retention: Duration,
    pub expo_access_token: Option<String>,
    pub email: Option<EmailConfig>,
    pub allowed_origins: Vec<String>,
}

/// Transactional email provider. Present only when both URL and key are set.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let email = match (env::var("EMAIL_API_URL").ok(), env::var("EMAIL_API_KEY").ok()) {
            (Some(api_url), Some(api_key)) => Some(EmailConfig {
                api_url,
                api_key,
                from: env::var("EMAIL_FROM")
                    .unwrap_or_else(|_| "Crew Night <no-reply@crewnight.app>".to_string()),
            }),
            _ => None,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            port: parse_var("PORT", 8080).context("PORT must be a valid number")?,
            stream_heartbeat: parse_secs("STREAM_HEARTBEAT_SECS", 25)?,
            presence_window: parse_secs("PRESENCE_WINDOW_SECS", 30)?,
            notification_timeout: parse_secs("NOTIFICATION_TIMEOUT_SECS", 10)?,
            dedup_retention: parse_secs("DEDUP_RETENTION_SECS", 24 * 60 * 60)?,
            expo_access_token: env::var("EXPO_ACCESS_TOKEN").ok(),
            email,
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|origins| parse_origins(&origins))
                .unwrap_or_default(),
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => Ok(raw.trim().parse()?),
        Err(_) => Ok(default),
    }
}

fn parse_secs(name: &str, default: u64) -> Result<Duration> {
    secs_from(env::var(name).ok().as_deref(), default)
        .with_context(|| format!("{name} must be a positive number of seconds"))
}

/// Zero is refused: a zero heartbeat period panics the session timer.
fn secs_from(raw: Option<&str>, default: u64) -> Result<Duration> {
    let secs = match raw {
        Some(raw) => raw.trim().parse()?,
        None => default,
    };
    if secs == 0 {
        bail!("duration must not be zero");
    }
    Ok(Duration::from_secs(secs))
}

/// Comma-separated list; blanks are dropped.
fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}
