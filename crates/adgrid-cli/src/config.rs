// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use adgrid_engine::collapse::DEFAULT_EXPANDED_DEPTH;
use adgrid_engine::data::DEFAULT_PAGE_SIZE;
use adgrid_engine::sync::DEFAULT_POLL_INTERVAL;
use adgrid_model::Currency;
use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_NAME: &str = "adgrid";
const CONFIG_VERSION: i64 = 1;
const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";
const DEFAULT_API_TIMEOUT: &str = "10s";
const DEFAULT_LOG_FILTER: &str = "warn";
const MAX_PAGE_SIZE: i64 = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub grid: Grid,
    #[serde(default)]
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            api: Api::default(),
            grid: Grid::default(),
            logging: Logging::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Api {
    pub base_url: Option<String>,
    pub timeout: Option<String>,
}

impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: Some(DEFAULT_API_BASE_URL.to_owned()),
            timeout: Some(DEFAULT_API_TIMEOUT.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Grid {
    pub page_size: Option<i64>,
    pub sync_poll_interval: Option<String>,
    pub expanded_depth: Option<i64>,
    pub currency: Option<String>,
    pub can_edit_archived: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Logging {
    pub filter: Option<String>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("ADGRID_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set ADGRID_CONFIG_PATH to the config file")
        })?;
        Ok(config_root.join(APP_NAME).join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} has no version. Add `version = 1` and keep values under [api], [grid], and [logging]",
                    path.display()
                )
            })?;
        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(base_url) = &self.api.base_url
            && base_url.trim().is_empty()
        {
            bail!(
                "api.base_url in {} is empty -- set it to the grid API root, for example {}",
                path.display(),
                DEFAULT_API_BASE_URL
            );
        }

        if let Some(timeout) = &self.api.timeout {
            ensure_positive("api.timeout", timeout, path)?;
        }
        if let Some(interval) = &self.grid.sync_poll_interval {
            ensure_positive("grid.sync_poll_interval", interval, path)?;
        }

        if let Some(page_size) = self.grid.page_size
            && !(1..=MAX_PAGE_SIZE).contains(&page_size)
        {
            bail!(
                "grid.page_size in {} must be between 1 and {}, got {}",
                path.display(),
                MAX_PAGE_SIZE,
                page_size
            );
        }

        if let Some(depth) = self.grid.expanded_depth
            && depth < 0
        {
            bail!(
                "grid.expanded_depth in {} must be non-negative, got {}",
                path.display(),
                depth
            );
        }

        if let Some(currency) = &self.grid.currency
            && Currency::parse(currency).is_none()
        {
            bail!(
                "grid.currency {:?} in {} is not supported; use one of USD, EUR, GBP, AUD, MXN",
                currency,
                path.display()
            );
        }

        Ok(())
    }

    pub fn api_base_url(&self) -> &str {
        self.api
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim()
    }

    pub fn api_timeout(&self) -> Result<Duration> {
        parse_duration(self.api.timeout.as_deref().unwrap_or(DEFAULT_API_TIMEOUT))
    }

    pub fn page_size(&self) -> usize {
        self.grid
            .page_size
            .and_then(|size| usize::try_from(size).ok())
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn sync_poll_interval(&self) -> Result<Duration> {
        match &self.grid.sync_poll_interval {
            Some(raw) => parse_duration(raw),
            None => Ok(DEFAULT_POLL_INTERVAL),
        }
    }

    pub fn expanded_depth(&self) -> usize {
        self.grid
            .expanded_depth
            .and_then(|depth| usize::try_from(depth).ok())
            .unwrap_or(DEFAULT_EXPANDED_DEPTH)
    }

    pub fn currency(&self) -> Currency {
        self.grid
            .currency
            .as_deref()
            .and_then(Currency::parse)
            .unwrap_or_default()
    }

    pub fn can_edit_archived(&self) -> bool {
        self.grid.can_edit_archived.unwrap_or(false)
    }

    /// `ADGRID_LOG` wins over the config file.
    pub fn log_filter(&self) -> String {
        env::var("ADGRID_LOG")
            .ok()
            .filter(|filter| !filter.trim().is_empty())
            .or_else(|| self.logging.filter.clone())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_owned())
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# adgrid config\n# Place this file at: {}\n\nversion = 1\n\n[api]\nbase_url = \"{}\"\ntimeout = \"{}\"\n\n[grid]\npage_size = {}\nsync_poll_interval = \"{}s\"\nexpanded_depth = {}\ncurrency = \"USD\"\ncan_edit_archived = false\n\n[logging]\n# Overridden by ADGRID_LOG, for example ADGRID_LOG=adgrid_engine=debug\nfilter = \"{}\"\n",
            path.display(),
            DEFAULT_API_BASE_URL,
            DEFAULT_API_TIMEOUT,
            DEFAULT_PAGE_SIZE,
            DEFAULT_POLL_INTERVAL.as_secs(),
            DEFAULT_EXPANDED_DEPTH,
            DEFAULT_LOG_FILTER,
        )
    }
}

fn ensure_positive(key: &str, raw: &str, path: &Path) -> Result<()> {
    let parsed = parse_duration(raw).with_context(|| format!("{key} in {}", path.display()))?;
    if parsed.is_zero() {
        bail!("{key} in {} must be positive, got {raw}", path.display());
    }
    Ok(())
}

fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let parse = |value: &str| {
        value
            .parse::<u64>()
            .with_context(|| format!("invalid duration {raw:?}"))
    };
    if let Some(value) = raw.strip_suffix("ms") {
        return Ok(Duration::from_millis(parse(value)?));
    }
    if let Some(value) = raw.strip_suffix('s') {
        return Ok(Duration::from_secs(parse(value)?));
    }
    if let Some(value) = raw.strip_suffix('m') {
        return Ok(Duration::from_secs(parse(value)? * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 5s)")
}
