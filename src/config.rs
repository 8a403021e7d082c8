//! Process configuration resolved from `CTRIAGE_*` environment variables.
//!
//! Every knob has a default so the binary starts with nothing but an API key
//! set; `validate` catches values that would make the pipeline misbehave
//! (zero batch sizes, zero concurrency) before any job is accepted.

use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "glm-4-air";
pub const DEFAULT_BASE_URL: &str = "https://open.bigmodel.cn/api/paas/v4";

/// Resolved settings shared by the server and the one-shot CLI path.
#[derive(Debug, Clone)]
pub struct Settings {
    /// API key for the generative-text service.
    pub api_key: String,
    /// Chat-completions endpoint base URL.
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Hard wall-clock timeout per attempt.
    pub timeout: Duration,
    /// Additional attempts after the first, on communication failures only.
    pub max_retries: u32,
    /// Ceiling on concurrent outbound calls, shared across jobs.
    pub concurrency: usize,
    /// Cases per request in the tagging and audit stages.
    pub batch_size: usize,
    /// Retained jobs before oldest-first eviction.
    pub job_capacity: usize,
    pub bind_addr: String,
    pub upload_dir: PathBuf,
    pub report_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.3,
            max_tokens: 10_000,
            timeout: Duration::from_secs(60),
            max_retries: 2,
            concurrency: 20,
            batch_size: 10,
            job_capacity: 256,
            bind_addr: "0.0.0.0:8000".to_string(),
            upload_dir: PathBuf::from("uploads"),
            report_dir: PathBuf::from("reports"),
        }
    }
}

impl Settings {
    /// Build settings from the environment, falling back to defaults.
    pub fn from_env() -> Result<Settings> {
        let mut settings = Settings {
            api_key: env::var("CTRIAGE_API_KEY").unwrap_or_default(),
            ..Settings::default()
        };
        if let Ok(value) = env::var("CTRIAGE_BASE_URL") {
            settings.base_url = value;
        }
        if let Ok(value) = env::var("CTRIAGE_MODEL") {
            settings.model = value;
        }
        if let Ok(value) = env::var("CTRIAGE_TEMPERATURE") {
            settings.temperature = value
                .parse()
                .context("parse CTRIAGE_TEMPERATURE as a float")?;
        }
        if let Ok(value) = env::var("CTRIAGE_MAX_TOKENS") {
            settings.max_tokens = value.parse().context("parse CTRIAGE_MAX_TOKENS")?;
        }
        if let Ok(value) = env::var("CTRIAGE_TIMEOUT_SECS") {
            let secs: u64 = value.parse().context("parse CTRIAGE_TIMEOUT_SECS")?;
            settings.timeout = Duration::from_secs(secs);
        }
        if let Ok(value) = env::var("CTRIAGE_MAX_RETRIES") {
            settings.max_retries = value.parse().context("parse CTRIAGE_MAX_RETRIES")?;
        }
        if let Ok(value) = env::var("CTRIAGE_CONCURRENCY") {
            settings.concurrency = value.parse().context("parse CTRIAGE_CONCURRENCY")?;
        }
        if let Ok(value) = env::var("CTRIAGE_BATCH_SIZE") {
            settings.batch_size = value.parse().context("parse CTRIAGE_BATCH_SIZE")?;
        }
        if let Ok(value) = env::var("CTRIAGE_JOB_CAPACITY") {
            settings.job_capacity = value.parse().context("parse CTRIAGE_JOB_CAPACITY")?;
        }
        if let Ok(value) = env::var("CTRIAGE_BIND_ADDR") {
            settings.bind_addr = value;
        }
        if let Ok(value) = env::var("CTRIAGE_UPLOAD_DIR") {
            settings.upload_dir = PathBuf::from(value);
        }
        if let Ok(value) = env::var("CTRIAGE_REPORT_DIR") {
            settings.report_dir = PathBuf::from(value);
        }
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(anyhow!("base_url is empty"));
        }
        if self.model.trim().is_empty() {
            return Err(anyhow!("model is empty"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(anyhow!(
                "temperature {} outside supported range 0.0..=2.0",
                self.temperature
            ));
        }
        if self.timeout.is_zero() {
            return Err(anyhow!("timeout must be nonzero"));
        }
        if self.concurrency == 0 {
            return Err(anyhow!("concurrency must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(anyhow!("batch_size must be at least 1"));
        }
        if self.job_capacity == 0 {
            return Err(anyhow!("job_capacity must be at least 1"));
        }
        Ok(())
    }
}
