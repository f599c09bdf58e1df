//! Configuration for the TuneFlow DevKit
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. Built-in defaults
//! 2. A JSON file (`--config`, or `~/.tuneflow-devkit/config.json` when present)
//! 3. `TUNEFLOW_DEVKIT_*` environment variables
//!
//! Every field is optional in the file; missing fields keep their defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DevkitError, Result};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "TUNEFLOW_DEVKIT_";

/// Default port of both the runner and the debugger.
pub const DEFAULT_PORT: u16 = 18818;

/// Default request body cap (100 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevkitConfig {
    /// Address to bind.
    pub host: String,
    pub port: u16,
    /// Prefix prepended to every runner route.
    pub path_prefix: String,
    pub cors: CorsConfig,
    /// Maximum concurrent plugin calls.
    pub max_workers: usize,
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
    /// How long a plugin may wait for a callback reply.
    pub callback_timeout_secs: u64,
    /// Where async job results are uploaded. Async mode is off when unset.
    pub async_store: Option<AsyncStoreConfig>,
}

impl Default for DevkitConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            path_prefix: "/".to_string(),
            cors: CorsConfig::default(),
            max_workers: crate::engine::default_workers(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            callback_timeout_secs: 30,
            async_store: None,
        }
    }
}

/// Cross-origin settings for the runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins. `"*"` allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl CorsConfig {
    pub fn allows_any(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

/// HTTP upload target for async job results.
///
/// Both URLs may contain `{job_id}`, which is replaced by the job's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncStoreConfig {
    /// URL the result is `PUT` to.
    pub upload_url: String,
    /// URL handed back to callers for fetching the result.
    pub result_url: String,
}

impl DevkitConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, the default path is used
    /// if it exists and defaults otherwise. Environment overrides are
    /// applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DevkitError::Config(format!(
                "Failed to read config {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            DevkitError::Config(format!("Invalid config {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Apply `TUNEFLOW_DEVKIT_*` overrides using `lookup` to read variables.
    /// Unparseable values are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(host) = get("HOST") {
            self.host = host;
        }
        if let Some(port) = get("PORT") {
            parse_into(&mut self.port, "PORT", &port);
        }
        if let Some(prefix) = get("PATH_PREFIX") {
            self.path_prefix = prefix;
        }
        if let Some(origins) = get("CORS_ORIGINS") {
            self.cors.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(workers) = get("MAX_WORKERS") {
            parse_into(&mut self.max_workers, "MAX_WORKERS", &workers);
        }
        if let Some(bytes) = get("MAX_BODY_BYTES") {
            parse_into(&mut self.max_body_bytes, "MAX_BODY_BYTES", &bytes);
        }
        if let Some(secs) = get("CALLBACK_TIMEOUT_SECS") {
            parse_into(
                &mut self.callback_timeout_secs,
                "CALLBACK_TIMEOUT_SECS",
                &secs,
            );
        }

        match (get("UPLOAD_URL"), get("RESULT_URL")) {
            (Some(upload_url), Some(result_url)) => {
                self.async_store = Some(AsyncStoreConfig {
                    upload_url,
                    result_url,
                });
            }
            (Some(_), None) | (None, Some(_)) => {
                warn!(
                    "{}UPLOAD_URL and {}RESULT_URL must be set together; ignoring",
                    ENV_PREFIX, ENV_PREFIX
                );
            }
            (None, None) => {}
        }
    }

    /// Reject settings no server could run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(DevkitError::Config("max_workers must be at least 1".into()));
        }
        if self.max_body_bytes == 0 {
            return Err(DevkitError::Config(
                "max_body_bytes must be positive".into(),
            ));
        }
        if self.cors.allowed_origins.is_empty() {
            return Err(DevkitError::Config(
                "cors.allowed_origins must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Path prefix with exactly one leading and one trailing slash.
    pub fn normalized_prefix(&self) -> String {
        normalize_prefix(&self.path_prefix)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `~/.tuneflow-devkit/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".tuneflow-devkit").join("config.json"))
}

/// Normalize a route prefix: `""` and `"/"` become `"/"`, `"api"` and
/// `"/api/"` both become `"/api/"`.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}

fn parse_into<T: std::str::FromStr>(slot: &mut T, name: &str, raw: &str) {
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => warn!(
            variable = %format!("{}{}", ENV_PREFIX, name),
            value = raw,
            "Ignoring unparseable environment override"
        ),
    }
}
