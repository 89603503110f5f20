//! Configuration management for the gate.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::captcha::HeuristicConfig;
use uac_common::UacError;
use uac_common::constants::{
    CAPTCHA_RETENTION_SECS, CAPTCHA_TTL_SECS, DEFAULT_LISTEN_ADDR, DEFAULT_REDIS_URL,
    JANITOR_INTERVAL_SECS, MAX_REQUEST_BODY_BYTES, REQUEST_TIMEOUT_SECS,
};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Challenge store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Captcha configuration
    #[serde(default)]
    pub captcha: CaptchaConfig,

    /// HTTP limits
    #[serde(default)]
    pub http: HttpConfig,
}

/// Where challenges live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

/// Challenge store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Seconds a finished challenge is kept after expiry
    #[serde(default = "default_retention")]
    pub retention_secs: u64,

    /// Memory backend sweep interval
    #[serde(default = "default_janitor_interval")]
    pub janitor_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            retention_secs: default_retention(),
            janitor_interval_secs: default_janitor_interval(),
        }
    }
}

/// Captcha-specific configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaConfig {
    /// Challenge validity in seconds
    #[serde(default = "default_challenge_ttl")]
    pub challenge_ttl_secs: u64,

    /// Area the puzzle target is drawn from
    #[serde(default)]
    pub target_area: TargetArea,

    /// Trajectory scoring thresholds
    #[serde(default)]
    pub heuristics: HeuristicConfig,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            challenge_ttl_secs: default_challenge_ttl(),
            target_area: TargetArea::default(),
            heuristics: HeuristicConfig::default(),
        }
    }
}

/// Target position bounds in background pixels
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TargetArea {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Default for TargetArea {
    fn default() -> Self {
        Self {
            x_min: 50.0,
            x_max: 250.0,
            y_min: 20.0,
            y_max: 130.0,
        }
    }
}

/// HTTP limits
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Maximum request body in bytes (bounds trajectory length)
    #[serde(default = "default_max_body")]
    pub max_body_bytes: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// Default value functions
fn default_redis_url() -> String { DEFAULT_REDIS_URL.to_string() }
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_backend() -> StoreBackend { StoreBackend::Redis }
fn default_retention() -> u64 { CAPTCHA_RETENTION_SECS }
fn default_janitor_interval() -> u64 { JANITOR_INTERVAL_SECS }
fn default_challenge_ttl() -> u64 { CAPTCHA_TTL_SECS }
fn default_max_body() -> usize { MAX_REQUEST_BODY_BYTES }
fn default_request_timeout() -> u64 { REQUEST_TIMEOUT_SECS }

impl AppConfig {
    /// Load configuration from file, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::with_name(config_path))
                .build()
                .context("Failed to load config file")?;

            settings
                .try_deserialize()
                .context("Failed to parse config")?
        } else {
            // Use defaults if config file doesn't exist
            tracing::warn!("Config file not found, using defaults");
            Self::default()
        };

        // Apply CLI overrides
        if let Some(ref redis_url) = args.redis_url {
            config.redis_url = redis_url.clone();
        }
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(backend) = args.store {
            config.store.backend = backend;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the gate cannot run with
    pub fn validate(&self) -> Result<(), UacError> {
        let area = &self.captcha.target_area;
        if !(area.x_min <= area.x_max && area.y_min <= area.y_max) {
            return Err(UacError::Config(format!(
                "captcha.target_area is empty: x {}..{}, y {}..{}",
                area.x_min, area.x_max, area.y_min, area.y_max
            )));
        }
        if self.captcha.challenge_ttl_secs == 0 {
            return Err(UacError::Config("captcha.challenge_ttl_secs must be positive".into()));
        }
        if self.store.janitor_interval_secs == 0 {
            return Err(UacError::Config("store.janitor_interval_secs must be positive".into()));
        }

        let h = &self.captcha.heuristics;
        if !(0.0..=1.0).contains(&h.flag_penalty) {
            return Err(UacError::Config(format!(
                "captcha.heuristics.flag_penalty must be within [0, 1], got {}",
                h.flag_penalty
            )));
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            listen_addr: default_listen_addr(),
            store: StoreConfig::default(),
            captcha: CaptchaConfig::default(),
            http: HttpConfig::default(),
        }
    }
}
