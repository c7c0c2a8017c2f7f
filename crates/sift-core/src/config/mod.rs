//! Configuration loading and validation for logsift.
//!
//! This module handles:
//! - Loading `config.toml`
//! - Config resolution order (CLI > env > user config dir > defaults)
//! - Shape checking via serde
//! - Semantic validation (non-zero limits, chunk size, ratio)
//!
//! ```toml
//! [archive]
//! max_file_size = 536870912
//! max_depth = 3
//!
//! [filter]
//! chunk_size = 1048576
//! check_interval = 10000
//! ripgrep_timeout_secs = 300
//!
//! [tasks]
//! retention_secs = 300
//!
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [analyzers]
//! dir = "/etc/logsift/analyzers"
//! ```

use serde::{Deserialize, Serialize};
use sift_filter::{EngineConfig, RipgrepConfig, DEFAULT_CHUNK_SIZE};
use sift_vfs::ArchiveSecurityLimits;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "SIFT_CONFIG";

/// Directory name under the user config dir.
const CONFIG_DIR_NAME: &str = "logsift";

const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("invalid TOML in config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for sift_common::Error {
    fn from(err: ConfigError) -> Self {
        sift_common::Error::Config(err.to_string())
    }
}

/// Filter engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Chunk size for chunk mode insights that don't set one.
    pub chunk_size: usize,
    pub check_interval: u64,
    pub preview_lines: usize,
    /// Explicit `rg` path. Unset searches `PATH`.
    pub ripgrep_binary: Option<PathBuf>,
    pub ripgrep_timeout_secs: u64,
}

impl Default for FilterSettings {
    fn default() -> Self {
        let engine = EngineConfig::default();
        let ripgrep = RipgrepConfig::default();
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            check_interval: engine.check_interval,
            preview_lines: engine.preview_lines,
            ripgrep_binary: ripgrep.binary,
            ripgrep_timeout_secs: ripgrep.timeout_secs,
        }
    }
}

impl FilterSettings {
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            check_interval: self.check_interval,
            preview_lines: self.preview_lines,
        }
    }

    pub fn ripgrep(&self) -> RipgrepConfig {
        RipgrepConfig {
            binary: self.ripgrep_binary.clone(),
            timeout_secs: self.ripgrep_timeout_secs,
        }
    }
}

/// Task lifecycle settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSettings {
    /// How long a finished task stays queryable.
    pub retention_secs: u64,
    pub sweep_interval_secs: u64,
    /// Parent of per-task temp dirs. Unset uses the system temp dir.
    pub temp_root: Option<PathBuf>,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            retention_secs: 300,
            sweep_interval_secs: 60,
            temp_root: None,
        }
    }
}

impl TaskSettings {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    /// Capacity of each task's event queue.
    pub queue_capacity: usize,
    /// How long the stream consumer waits on the queue before re-checking
    /// the producer.
    pub poll_interval_ms: u64,
    /// How long to wait for the producer after the terminal event.
    pub result_wait_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            queue_capacity: 256,
            poll_interval_ms: 100,
            result_wait_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerSettings {
    /// Directory of `*.toml` analyzer definitions. Unset uses
    /// `<config dir>/logsift/analyzers`.
    pub dir: Option<PathBuf>,
}

/// Complete logsift configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiftConfig {
    pub archive: ArchiveSecurityLimits,
    pub filter: FilterSettings,
    pub tasks: TaskSettings,
    pub server: ServerSettings,
    pub analyzers: AnalyzerSettings,
}

impl SiftConfig {
    /// Parse a TOML document without touching the filesystem.
    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: SiftConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic validation beyond what serde checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.archive
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("archive: {e}")))?;
        if self.filter.chunk_size == 0 {
            return Err(ConfigError::Invalid("filter.chunk_size must be >= 1".into()));
        }
        if self.filter.check_interval == 0 {
            return Err(ConfigError::Invalid(
                "filter.check_interval must be >= 1".into(),
            ));
        }
        if self.filter.ripgrep_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "filter.ripgrep_timeout_secs must be >= 1".into(),
            ));
        }
        if self.tasks.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "tasks.sweep_interval_secs must be >= 1".into(),
            ));
        }
        if self.server.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "server.queue_capacity must be >= 1".into(),
            ));
        }
        if self.server.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "server.poll_interval_ms must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Analyzer definition directory after applying the default.
    pub fn analyzer_dir(&self) -> Option<PathBuf> {
        self.analyzers
            .dir
            .clone()
            .or_else(|| dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join("analyzers")))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Resolved configuration with provenance information.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: SiftConfig,
    /// File the config came from (None if using defaults).
    pub path: Option<PathBuf>,
    /// Hash of the file content (None if using defaults).
    pub hash: Option<String>,
}

/// Configuration resolution options.
#[derive(Debug, Default, Clone)]
pub struct ConfigOptions {
    /// Explicit config file (highest priority).
    pub config_path: Option<PathBuf>,
}

/// Where a config file should be read from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConfigSource {
    /// Named by flag or env; must exist.
    Required(PathBuf),
    /// The per-user default location; may be absent.
    Optional(PathBuf),
    None,
}

/// Load configuration with the standard resolution order.
///
/// Resolution order (highest to lowest priority):
/// 1. Explicit CLI flag (via ConfigOptions)
/// 2. Environment variable (SIFT_CONFIG)
/// 3. User config dir (`~/.config/logsift/config.toml` on Linux)
/// 4. Built-in defaults
pub fn load_config(options: &ConfigOptions) -> Result<ResolvedConfig, ConfigError> {
    let source = resolve_source(
        options.config_path.as_deref(),
        std::env::var_os(CONFIG_ENV).map(PathBuf::from),
        dirs::config_dir(),
    );
    load_from_source(source)
}

/// Load one specific file. The file must exist.
pub fn load_config_file(path: &Path) -> Result<ResolvedConfig, ConfigError> {
    load_from_source(ConfigSource::Required(path.to_path_buf()))
}

fn resolve_source(
    explicit: Option<&Path>,
    env_path: Option<PathBuf>,
    user_config_dir: Option<PathBuf>,
) -> ConfigSource {
    if let Some(path) = explicit {
        return ConfigSource::Required(path.to_path_buf());
    }
    if let Some(path) = env_path.filter(|p| !p.as_os_str().is_empty()) {
        return ConfigSource::Required(path);
    }
    match user_config_dir {
        Some(dir) => ConfigSource::Optional(dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME)),
        None => ConfigSource::None,
    }
}

fn load_from_source(source: ConfigSource) -> Result<ResolvedConfig, ConfigError> {
    let path = match source {
        ConfigSource::Required(path) => {
            if !path.exists() {
                return Err(ConfigError::NotFound { path });
            }
            path
        }
        ConfigSource::Optional(path) if path.exists() => path,
        ConfigSource::Optional(_) | ConfigSource::None => {
            return Ok(ResolvedConfig {
                config: SiftConfig::default(),
                path: None,
                hash: None,
            })
        }
    };

    let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
        path: path.clone(),
        source: e,
    })?;
    let hash = compute_hash(&content);
    let config = SiftConfig::from_toml(&content, &path)?;
    tracing::debug!(path = %path.display(), hash = %hash, "loaded config");

    Ok(ResolvedConfig {
        config,
        path: Some(path),
        hash: Some(hash),
    })
}

/// SHA-256 of the raw config text, hex encoded.
fn compute_hash(content: &str) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(content.as_bytes()))
}
