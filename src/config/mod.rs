// src/config/mod.rs
//! Process configuration, read once at startup from the environment (and `.env`).
pub mod highlight;

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::scholar::retry::{RetryPolicy, Throttle};

pub const DEFAULT_SCHOLAR_ID: &str = "CjJ84BwAAAAJ";
pub const DEFAULT_OWNER_NAME: &str = "Abhishek Dixit";
pub const DEFAULT_SCHOLAR_BASE_URL: &str = "https://scholar.google.com";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_STATIC_DIR: &str = "frontend";
const FALLBACK_SECRET_KEY: &str = "scholar-api-secret-key";

/// Knobs for the rate-limited fetcher.
#[derive(Debug, Clone, Copy)]
pub struct FetchTuning {
    pub retry: RetryPolicy,
    pub throttle: Throttle,
    pub progress_every: usize,
    pub page_size: usize,
    pub request_timeout: Duration,
}

impl Default for FetchTuning {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            throttle: Throttle::default(),
            progress_every: 50,
            page_size: 100,
            request_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub scholar_id: String,
    pub owner_name: String,
    pub scholar_base_url: String,
    /// `None` disables every data-backed route.
    pub database_url: Option<String>,
    pub secret_key: String,
    pub debug: bool,
    pub port: u16,
    pub static_dir: PathBuf,
    pub sync_require_secret: bool,
    pub metrics_enabled: bool,
    pub fetch: FetchTuning,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scholar_id: DEFAULT_SCHOLAR_ID.to_string(),
            owner_name: DEFAULT_OWNER_NAME.to_string(),
            scholar_base_url: DEFAULT_SCHOLAR_BASE_URL.to_string(),
            database_url: None,
            secret_key: FALLBACK_SECRET_KEY.to_string(),
            debug: false,
            port: DEFAULT_PORT,
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            sync_require_secret: false,
            metrics_enabled: true,
            fetch: FetchTuning::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map instead of the process env).
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut cfg = AppConfig::default();

        if let Some(v) = non_empty("SCHOLAR_ID") {
            cfg.scholar_id = v;
        }
        if let Some(v) = non_empty("SCHOLAR_OWNER_NAME") {
            cfg.owner_name = v;
        }
        if let Some(v) = non_empty("SCHOLAR_BASE_URL") {
            cfg.scholar_base_url = v.trim_end_matches('/').to_string();
        }
        cfg.database_url = non_empty("DATABASE_URL");
        match non_empty("SECRET_KEY") {
            Some(v) => cfg.secret_key = v,
            None => tracing::warn!("SECRET_KEY not set; using built-in fallback"),
        }
        cfg.debug = non_empty("DEBUG").is_some_and(|v| parse_bool(&v));
        if let Some(v) = non_empty("PORT") {
            cfg.port = v
                .parse()
                .map_err(|_| anyhow!("PORT must be a port number, got '{v}'"))?;
        }
        if let Some(v) = non_empty("STATIC_DIR") {
            cfg.static_dir = PathBuf::from(v);
        }
        cfg.sync_require_secret = non_empty("SYNC_REQUIRE_SECRET").is_some_and(|v| parse_bool(&v));
        if let Some(v) = non_empty("METRICS_ENABLED") {
            cfg.metrics_enabled = parse_bool(&v);
        }
        if let Some(v) = non_empty("SCHOLAR_MAX_ATTEMPTS") {
            let n: u32 = v
                .parse()
                .map_err(|_| anyhow!("SCHOLAR_MAX_ATTEMPTS must be an integer, got '{v}'"))?;
            cfg.fetch.retry.max_attempts = n.max(1);
        }
        if let Some(v) = non_empty("SCHOLAR_ITEM_DELAY_MS") {
            let ms: u64 = v
                .parse()
                .map_err(|_| anyhow!("SCHOLAR_ITEM_DELAY_MS must be an integer, got '{v}'"))?;
            // Keep the 1s-wide jitter window around the configured floor.
            cfg.fetch.throttle = Throttle {
                min: Duration::from_millis(ms),
                max: Duration::from_millis(ms.saturating_add(1_000)),
            };
        }
        Ok(cfg)
    }

    /// Public profile URL for the configured scholar.
    pub fn scholar_profile_url(&self) -> String {
        crate::scholar::providers::google_scholar::scholar_profile_url(&self.scholar_id)
    }
}

/// `1`, `true`, `yes` or `on` in any case; anything else is false.
pub fn parse_bool(s: &str) -> bool {
    matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Boolean flag read straight from the process environment, before full config loads.
pub fn env_flag(key: &str) -> bool {
    std::env::var(key).is_ok_and(|v| parse_bool(&v))
}
