//! Logging configuration.
//!
//! Resolution order, lowest to highest: defaults, `RUST_LOG`, `SIFT_LOG`,
//! `SIFT_LOG_FORMAT`, then CLI flags.

/// `human` for the console, `jsonl` for servers and pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Jsonl,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "human" => Ok(LogFormat::Human),
            "jsonl" => Ok(LogFormat::Jsonl),
            _ => Err(format!("unknown log format: {s}")),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LogFormat::Human => "human",
            LogFormat::Jsonl => "jsonl",
        })
    }
}

/// Minimum level, named the way `SIFT_LOG` and filter directives spell it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "off" => Ok(LogLevel::Off),
            _ => Err(format!("unknown log level: {s}")),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        })
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output format.
    pub format: LogFormat,
    /// Minimum log level.
    pub level: LogLevel,
    /// Whether to include timestamps in human output.
    pub timestamps: bool,
    /// Whether to include file/line info in debug output.
    pub source_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::Human,
            level: LogLevel::Info,
            timestamps: true,
            source_location: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment and CLI overrides.
    pub fn from_env(cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self {
        let mut config = LogConfig::default();

        config.apply_env(
            std::env::var("SIFT_LOG").ok().as_deref(),
            std::env::var("RUST_LOG").ok().as_deref(),
            std::env::var("SIFT_LOG_FORMAT").ok().as_deref(),
        );

        if let Some(level) = cli_level {
            config.level = level;
        }
        if let Some(format) = cli_format {
            config.format = format;
        }

        config
    }

    /// Apply raw environment values. `SIFT_LOG` wins over `RUST_LOG`; an
    /// unparsable value leaves the current setting alone.
    pub fn apply_env(
        &mut self,
        sift_log: Option<&str>,
        rust_log: Option<&str>,
        sift_log_format: Option<&str>,
    ) {
        if let Some(val) = sift_log {
            if let Ok(level) = val.parse::<LogLevel>() {
                self.level = level;
            }
        } else if let Some(val) = rust_log {
            // RUST_LOG may be a full directive list; take the most verbose level named
            for level in [LogLevel::Trace, LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error] {
                if val.contains(&level.to_string()) {
                    self.level = level;
                    break;
                }
            }
        }

        if let Some(val) = sift_log_format {
            if let Ok(format) = val.parse::<LogFormat>() {
                self.format = format;
            }
        }
    }

    /// Filter directive used when `RUST_LOG` is unset.
    pub fn default_directive(&self) -> String {
        format!(
            "sift={level},sift_core={level},sift_filter={level},sift_vfs={level},tower_http=warn",
            level = self.level
        )
    }

    /// Set log format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set log level.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Enable timestamps in human output.
    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    /// Enable source location in debug output.
    pub fn with_source_location(mut self, enabled: bool) -> Self {
        self.source_location = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!("jsonl".parse::<LogFormat>().unwrap(), LogFormat::Jsonl);
        assert_eq!("HUMAN".parse::<LogFormat>().unwrap(), LogFormat::Human);
        assert!("json".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_log_level_parse_round_trips_display() {
        for level in [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
            LogLevel::Off,
        ] {
            assert_eq!(level.to_string().parse::<LogLevel>().unwrap(), level);
        }
        assert!("warning".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_sift_log_wins_over_rust_log() {
        let mut config = LogConfig::default();
        config.apply_env(Some("debug"), Some("trace"), None);
        assert_eq!(config.level, LogLevel::Debug);
    }

    #[test]
    fn test_rust_log_directive_list() {
        let mut config = LogConfig::default();
        config.apply_env(None, Some("hyper=warn,sift_core=debug"), Some("jsonl"));
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Jsonl);
    }

    #[test]
    fn test_builders() {
        let config = LogConfig::default()
            .with_timestamps(false)
            .with_source_location(true);
        assert!(!config.timestamps);
        assert!(config.source_location);
        assert_eq!(config.format, LogFormat::Human);
    }

    #[test]
    fn test_default_directive_names_crates() {
        let config = LogConfig::default().with_level(LogLevel::Warn);
        let directive = config.default_directive();
        assert!(directive.contains("sift_core=warn"));
        assert!(directive.contains("sift_vfs=warn"));
    }
}
