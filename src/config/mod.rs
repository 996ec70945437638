// src/config/mod.rs
//
// Runtime configuration. Precedence: environment > TOML file > defaults.
// Credentials are read from the environment only.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Deserialize;

use crate::window::parse_date;

const ENV_CONFIG_PATH: &str = "SYNC_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config/sync.toml";
const MAX_DEADLINE_SECS: u64 = 24 * 60 * 60;

pub const DEFAULT_API_VERSION: &str = "2021-07";
pub const DEFAULT_DATASET: &str = "Shopify";

/// Optional non-secret settings from `config/sync.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSettings {
    pub shop_domain: Option<String>,
    pub api_version: Option<String>,
    pub shop_base_url: Option<String>,
    pub warehouse_path: Option<String>,
    pub dataset: Option<String>,
    pub bootstrap_start: Option<String>,
    pub deadline_secs: Option<u64>,
    pub max_retries: Option<u8>,
    pub retry_base_ms: Option<u64>,
    pub http_timeout_secs: Option<u64>,
    pub interval_secs: Option<u64>,
    pub bind_addr: Option<String>,
}

impl FileSettings {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("parsing sync config TOML")
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading sync config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// 1) $SYNC_CONFIG_PATH (must exist)
    /// 2) config/sync.toml
    /// 3) empty
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
            }
            return Self::load_from(&pb);
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        Ok(Self::default())
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub api_key: String,
    pub api_secret: String,
    /// Versioned admin API root, e.g. `https://shop.myshopify.com/admin/api/2021-07/`.
    pub shop_base_url: Url,
    pub warehouse_path: String,
    pub dataset: String,
    pub bootstrap_start: Option<DateTime<Utc>>,
    pub deadline: Duration,
    pub max_retries: u8,
    pub retry_base: Duration,
    pub http_timeout: Duration,
    /// In-process scheduler period; `None` leaves scheduling to the caller.
    pub interval: Option<Duration>,
    pub bind_addr: String,
}

impl SyncConfig {
    /// `.env`, then the TOML file, then the process environment.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let file = FileSettings::load_default()?;
        Self::resolve(&file, |k| std::env::var(k).ok())
    }

    /// Combine file settings with a variable lookup (the environment in production).
    pub fn resolve<F>(file: &FileSettings, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |k: &str| env(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = var("API_KEY").ok_or_else(|| anyhow!("Missing API_KEY env var"))?;
        let api_secret = var("API_SECRET").ok_or_else(|| anyhow!("Missing API_SECRET env var"))?;

        let base = match var("SHOP_BASE_URL").or_else(|| file.shop_base_url.clone()) {
            Some(url) => url,
            None => {
                let domain = var("SHOP_DOMAIN")
                    .or_else(|| file.shop_domain.clone())
                    .ok_or_else(|| anyhow!("Missing SHOP_DOMAIN (or SHOP_BASE_URL)"))?;
                let version = var("SHOP_API_VERSION")
                    .or_else(|| file.api_version.clone())
                    .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());
                format!("https://{domain}/admin/api/{version}/")
            }
        };
        let shop_base_url =
            Url::parse(&base).with_context(|| format!("invalid shop base url `{base}`"))?;

        let bootstrap_start = var("SYNC_BOOTSTRAP_START")
            .or_else(|| file.bootstrap_start.clone())
            .map(|s| parse_date(&s).map_err(|e| anyhow!("SYNC_BOOTSTRAP_START: {e}")))
            .transpose()?;

        let num = |key: &str, from_file: Option<u64>, default: u64| -> Result<u64> {
            match var(key) {
                Some(v) => v
                    .parse()
                    .with_context(|| format!("{key} must be an unsigned integer, got `{v}`")),
                None => Ok(from_file.unwrap_or(default)),
            }
        };

        let deadline_secs = num("SYNC_DEADLINE_SECS", file.deadline_secs, 540)?;
        if deadline_secs == 0 || deadline_secs > MAX_DEADLINE_SECS {
            bail!("SYNC_DEADLINE_SECS must be between 1 and {MAX_DEADLINE_SECS}, got {deadline_secs}");
        }
        let max_retries = num("SYNC_MAX_RETRIES", file.max_retries.map(u64::from), 3)?;
        let max_retries =
            u8::try_from(max_retries).map_err(|_| anyhow!("SYNC_MAX_RETRIES must be <= 255"))?;
        let retry_base_ms = num("SYNC_RETRY_BASE_MS", file.retry_base_ms, 500)?;
        let http_timeout_secs = num("SYNC_HTTP_TIMEOUT_SECS", file.http_timeout_secs, 30)?;
        let interval_secs = match var("SYNC_INTERVAL_SECS") {
            Some(_) => Some(num("SYNC_INTERVAL_SECS", None, 0)?),
            None => file.interval_secs,
        };

        Ok(Self {
            api_key,
            api_secret,
            shop_base_url,
            warehouse_path: var("WAREHOUSE_PATH")
                .or_else(|| file.warehouse_path.clone())
                .unwrap_or_else(|| "warehouse.db".to_string()),
            dataset: var("WAREHOUSE_DATASET")
                .or_else(|| file.dataset.clone())
                .unwrap_or_else(|| DEFAULT_DATASET.to_string()),
            bootstrap_start,
            deadline: Duration::from_secs(deadline_secs),
            max_retries,
            retry_base: Duration::from_millis(retry_base_ms),
            http_timeout: Duration::from_secs(http_timeout_secs.max(1)),
            interval: interval_secs.filter(|s| *s > 0).map(Duration::from_secs),
            bind_addr: var("BIND_ADDR")
                .or_else(|| file.bind_addr.clone())
                .unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        })
    }

    pub fn job_options(&self) -> crate::sync::JobOptions {
        crate::sync::JobOptions {
            dataset: self.dataset.clone(),
            bootstrap_start: self.bootstrap_start,
            deadline: self.deadline,
        }
    }
}
