//! Logging configuration types.

use serde::{Deserialize, Serialize};

/// Configuration for the logging system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default level filter; `RUST_LOG` overrides it when set.
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Output targets.
    #[serde(default = "default_outputs")]
    pub outputs: Vec<LogOutput>,

    /// Include file and line information.
    #[serde(default)]
    pub include_file_info: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            outputs: default_outputs(),
            include_file_info: false,
        }
    }
}

impl LogConfig {
    /// Builds a config from the flat settings used in gateway configuration files.
    #[must_use]
    pub fn from_parts(level: &str, format: &str, directory: Option<&str>) -> Self {
        let format = match format.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };
        let mut outputs = vec![LogOutput::Stderr];
        if let Some(path) = directory {
            outputs.push(LogOutput::File {
                path: path.to_string(),
                rotation: Some(RotationConfig::Daily),
            });
        }
        Self {
            level: level.to_string(),
            format,
            outputs,
            include_file_info: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_outputs() -> Vec<LogOutput> {
    vec![LogOutput::Stderr]
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON lines for log aggregation.
    Json,
    /// Human-readable output.
    #[default]
    Pretty,
}

/// Log output target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogOutput {
    /// Standard error, keeping stdout free for command output.
    Stderr,
    /// Files under a directory, optionally rotated.
    File {
        /// Directory for log files.
        path: String,
        /// Rotation policy.
        rotation: Option<RotationConfig>,
    },
}

/// Log rotation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationConfig {
    /// Rotate hourly.
    Hourly,
    /// Rotate daily.
    Daily,
    /// Single file.
    Never,
}
