//! # Configuration Module
//!
//! [`RouterConfig`] collects the knobs the dispatcher reads at construction
//! time. It can be loaded from YAML or TOML (picked by file extension) and is
//! then overridden from the environment:
//!
//! | Variable                | Field                   |
//! |-------------------------|-------------------------|
//! | `STAGER_CASE_SENSITIVE` | `case_sensitive`        |
//! | `STAGER_STRICT_SLASH`   | `strict_slash`          |
//! | `STAGER_POOL_MAX_IDLE`  | `pool.max_idle`         |
//! | `STAGER_MAX_IN_FLIGHT`  | `pool.max_in_flight`    |
//! | `STAGER_ACCESS_LOGS`    | `access_logs`           |
//!
//! ```yaml
//! case_sensitive: false
//! static_dirs:
//!   /static: public
//! pool:
//!   max_in_flight: 512
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::context::DEFAULT_MAX_IDLE;
use crate::router::TreeOptions;

/// Context pool sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Idle contexts kept for reuse
    pub max_idle: usize,
    /// Cap on concurrently served requests; unbounded when absent
    pub max_in_flight: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: DEFAULT_MAX_IDLE,
            max_in_flight: None,
        }
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Compare literal segments case-sensitively (default: true)
    pub case_sensitive: bool,
    /// Treat `/a/` and `/a` as different paths (default: false)
    pub strict_slash: bool,
    /// URL prefix to directory
    pub static_dirs: BTreeMap<String, PathBuf>,
    pub pool: PoolConfig,
    /// Emit one access line per request (default: true)
    pub access_logs: bool,
    /// Value of the `server` response header, if any
    pub server_name: Option<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            strict_slash: false,
            static_dirs: BTreeMap::new(),
            pool: PoolConfig::default(),
            access_logs: true,
            server_name: None,
        }
    }
}

impl RouterConfig {
    /// Load from a `.yaml`/`.yml` or `.toml` file, then apply environment
    /// overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: RouterConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&text)
                .with_context(|| format!("parsing YAML config {}", path.display()))?,
            Some("toml") => toml::from_str(&text)
                .with_context(|| format!("parsing TOML config {}", path.display()))?,
            _ => bail!("unsupported config format: {}", path.display()),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from `STAGER_*` variables.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_lookup(|key| env::var(key).ok())
    }

    fn apply_lookup(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = get("STAGER_CASE_SENSITIVE") {
            self.case_sensitive = parse_bool("STAGER_CASE_SENSITIVE", &v)?;
        }
        if let Some(v) = get("STAGER_STRICT_SLASH") {
            self.strict_slash = parse_bool("STAGER_STRICT_SLASH", &v)?;
        }
        if let Some(v) = get("STAGER_ACCESS_LOGS") {
            self.access_logs = parse_bool("STAGER_ACCESS_LOGS", &v)?;
        }
        if let Some(v) = get("STAGER_POOL_MAX_IDLE") {
            self.pool.max_idle = v
                .trim()
                .parse()
                .with_context(|| format!("STAGER_POOL_MAX_IDLE={v}"))?;
        }
        if let Some(v) = get("STAGER_MAX_IN_FLIGHT") {
            let n: usize = v
                .trim()
                .parse()
                .with_context(|| format!("STAGER_MAX_IN_FLIGHT={v}"))?;
            // 0 lifts the cap
            self.pool.max_in_flight = (n > 0).then_some(n);
        }
        Ok(())
    }

    /// Matching options for route and filter trees.
    #[must_use]
    pub fn tree_options(&self) -> TreeOptions {
        TreeOptions {
            case_sensitive: self.case_sensitive,
            strict_slash: self.strict_slash,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("{key}: expected a boolean, got '{value}'"),
    }
}
