use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: Option<String>,
    pub port: u16,
    pub job_api_url: String,
    pub page_origin: String,
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub max_upload_size: usize,
    pub job_api_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub poll_retry_backoff_secs: u64,
    pub poll_max_retries: u32,
    pub poll_settle_delay_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()),
            port: parse_var("PORT", "3000")?,
            job_api_url: env::var("JOB_API_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string())
                .trim_end_matches('/')
                .to_string(),
            page_origin: env::var("PAGE_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "your-secret-key".to_string()),
            jwt_audience: env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "authenticated".to_string()),
            max_upload_size: parse_var("MAX_UPLOAD_SIZE", "52428800")?, // 50MB
            job_api_timeout_secs: parse_var("JOB_API_TIMEOUT_SECS", "30")?,
            poll_interval_secs: parse_var("POLL_INTERVAL_SECS", "5")?,
            poll_retry_backoff_secs: parse_var("POLL_RETRY_BACKOFF_SECS", "2")?,
            poll_max_retries: parse_var("POLL_MAX_RETRIES", "3")?,
            poll_settle_delay_ms: parse_var("POLL_SETTLE_DELAY_MS", "1000")?,
        })
    }

    pub fn job_api_timeout(&self) -> Duration {
        Duration::from_secs(self.job_api_timeout_secs)
    }
}

fn parse_var<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse()
        .with_context(|| format!("invalid value for {}: {:?}", name, raw))
}
