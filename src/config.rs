//! Configuration Management
//!
//! Persistent settings for rfgraph, stored as JSON under the user's config
//! directory. Command-line flags override the file, the file overrides the
//! environment. The password is never written to disk; it is only read from
//! `RFGRAPH_PASSWORD`.

use crate::resolve::cache::{CacheConfig, DEFAULT_FAILURE_TTL};
use crate::resolve::walker::{DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_DEPTH};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENDPOINT_ENV: &str = "RFGRAPH_ENDPOINT";
pub const USERNAME_ENV: &str = "RFGRAPH_USERNAME";
pub const PASSWORD_ENV: &str = "RFGRAPH_PASSWORD";

pub const DEFAULT_SERVICE_ROOT: &str = "/redfish/v1";

/// User configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Service base URL, e.g. `https://bmc.example`
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "default_service_root")]
    pub service_root: String,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default)]
    pub cache_max_entries: Option<usize>,
    #[serde(default = "default_failure_ttl_secs")]
    pub failure_ttl_secs: u64,
    /// Accept invalid TLS certificates
    #[serde(default)]
    pub insecure: bool,
}

fn default_service_root() -> String {
    DEFAULT_SERVICE_ROOT.to_string()
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_failure_ttl_secs() -> u64 {
    DEFAULT_FAILURE_TTL.as_secs()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            username: None,
            service_root: default_service_root(),
            max_concurrency: default_max_concurrency(),
            max_depth: default_max_depth(),
            cache_max_entries: None,
            failure_ttl_secs: default_failure_ttl_secs(),
            insecure: false,
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("rfgraph").join("config.json"))
    }

    /// Load configuration from disk, falling back to defaults
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;

        Ok(())
    }

    /// Fold command-line connection flags into the stored settings
    pub fn apply_flags(&mut self, endpoint: Option<&str>, username: Option<&str>, insecure: bool) {
        if let Some(endpoint) = endpoint {
            self.endpoint = Some(endpoint.to_string());
        }
        if let Some(username) = username {
            self.username = Some(username.to_string());
        }
        self.insecure |= insecure;
    }

    /// Get effective endpoint (CLI > config > environment)
    pub fn effective_endpoint(&self, cli: Option<&str>) -> Option<String> {
        pick(cli, self.endpoint.as_deref(), env(ENDPOINT_ENV))
    }

    /// Get effective username (CLI > config > environment)
    pub fn effective_username(&self, cli: Option<&str>) -> Option<String> {
        pick(cli, self.username.as_deref(), env(USERNAME_ENV))
    }

    /// Password from the environment
    pub fn password() -> Option<String> {
        env(PASSWORD_ENV)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_entries: self.cache_max_entries,
            failure_ttl: Duration::from_secs(self.failure_ttl_secs),
        }
    }
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn pick(cli: Option<&str>, file: Option<&str>, env: Option<String>) -> Option<String> {
    cli.or(file).map(str::to_string).or(env)
}
