// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

use crate::catalog::tmdb::DEFAULT_BASE_URL;
use crate::ledger::file::DEFAULT_LEDGER_PATH;
use crate::subscribers::file::DEFAULT_SUBSCRIBERS_PATH;

pub const ENV_CONFIG_PATH: &str = "NOTIFIER_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/notifier.toml";

const ENV_CATALOG_TOKEN: &str = "THE_MOVIE_DB_TOKEN";
const ENV_SMTP_PASS: &str = "SMTP_PASS";
const ENV_FROM_ADDRESS: &str = "FROM_EMAIL_ADDRESS";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_env_marker() -> String {
    "ENV".to_string()
}
fn default_language() -> String {
    "en-US".to_string()
}
fn default_catalog_timeout() -> u64 {
    10
}
fn default_smtp_host() -> String {
    "localhost".to_string()
}
fn default_smtp_timeout() -> u64 {
    30
}
fn default_interval() -> u64 {
    24 * 3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// "ENV" means: read from THE_MOVIE_DB_TOKEN
    #[serde(default = "default_env_marker")]
    pub api_key: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_catalog_timeout")]
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: default_env_marker(),
            language: default_language(),
            timeout_secs: default_catalog_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default)]
    pub smtp_user: Option<String>,
    /// "ENV" means: read from SMTP_PASS
    #[serde(default)]
    pub smtp_pass: Option<String>,
    /// Overridden by FROM_EMAIL_ADDRESS when set. May stay unset; sends then fail individually.
    #[serde(default)]
    pub from_address: Option<String>,
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_user: None,
            smtp_pass: None,
            from_address: None,
            timeout_secs: default_smtp_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub ledger_path: PathBuf,
    pub subscribers_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            subscribers_path: PathBuf::from(DEFAULT_SUBSCRIBERS_PATH),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default)]
    pub run_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            run_on_start: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotifierConfig {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// 0 = no cap on concurrent dispatches.
    #[serde(default)]
    pub max_concurrent_dispatches: usize,
}

impl NotifierConfig {
    /// Parse a TOML document without touching the environment.
    pub fn parse(s: &str) -> Result<Self> {
        let mut cfg: NotifierConfig = toml::from_str(s).context("parsing notifier config")?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Load from an explicit path and resolve env-backed values.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading notifier config from {}", path.display()))?;
        let mut cfg = Self::parse(&content)?;
        cfg.resolve_env()?;
        Ok(cfg)
    }

    /// Load using env var + fallbacks:
    /// 1) $NOTIFIER_CONFIG_PATH
    /// 2) config/notifier.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let fallback = PathBuf::from(DEFAULT_CONFIG_PATH);
        if fallback.exists() {
            return Self::load_from(&fallback);
        }
        let mut cfg = Self::default();
        cfg.resolve_env()?;
        Ok(cfg)
    }

    fn sanitize(&mut self) {
        if self.catalog.timeout_secs == 0 {
            self.catalog.timeout_secs = default_catalog_timeout();
        }
        if self.email.timeout_secs == 0 {
            self.email.timeout_secs = default_smtp_timeout();
        }
        if self.schedule.interval_secs == 0 {
            self.schedule.interval_secs = default_interval();
        }
        self.catalog.base_url = self.catalog.base_url.trim_end_matches('/').to_string();
    }

    fn resolve_env(&mut self) -> Result<()> {
        if is_env_marker(&self.catalog.api_key) {
            self.catalog.api_key = env::var(ENV_CATALOG_TOKEN)
                .map_err(|_| anyhow!("Missing {ENV_CATALOG_TOKEN} env var"))?;
        }
        if self.email.smtp_pass.as_deref().is_some_and(is_env_marker) {
            self.email.smtp_pass = Some(
                env::var(ENV_SMTP_PASS).map_err(|_| anyhow!("Missing {ENV_SMTP_PASS} env var"))?,
            );
        }
        if let Ok(from) = env::var(ENV_FROM_ADDRESS) {
            if !from.trim().is_empty() {
                self.email.from_address = Some(from);
            }
        }
        Ok(())
    }
}

fn is_env_marker(s: &str) -> bool {
    s.trim().eq_ignore_ascii_case("env")
}
