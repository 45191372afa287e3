use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub central_db_url: String,
    pub poll_interval: Duration,
    pub max_concurrent_jobs: usize,
    pub retry_delay: Duration,
    pub max_retries: i32,
    pub service_reminder_hour_utc: u32,
    pub invoice_reminder_hour_utc: u32,
    pub appointment_confirmation_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            central_db_url: env::var("CENTRAL_DB_URL").context("CENTRAL_DB_URL must be set")?,
            poll_interval: Duration::from_millis(parse_var("POLL_INTERVAL_MS", 5000u64)?),
            max_concurrent_jobs: parse_var("MAX_CONCURRENT_JOBS", 5usize)?,
            retry_delay: Duration::from_secs(60 * parse_var("RETRY_DELAY_MINUTES", 5u64)?),
            max_retries: parse_var("MAX_RETRIES", 3i32)?,
            service_reminder_hour_utc: parse_var("SERVICE_REMINDER_HOUR_UTC", 9u32)?,
            invoice_reminder_hour_utc: parse_var("INVOICE_REMINDER_HOUR_UTC", 10u32)?,
            appointment_confirmation_interval: Duration::from_millis(parse_var(
                "APPOINTMENT_CONFIRMATION_INTERVAL_MS",
                3_600_000u64,
            )?),
        })
    }
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{key} must be a valid number, got {raw:?}")),
        Err(_) => Ok(default),
    }
}
