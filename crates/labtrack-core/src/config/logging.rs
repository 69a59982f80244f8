//! Logging settings.

use serde::{Deserialize, Serialize};

/// Tracing subscriber settings. `RUST_LOG` overrides `level` when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive such as `info` or `labtrack_storage=debug`.
    #[serde(default = "default_level")]
    pub level: String,
    /// `json` for structured output, anything else for human-readable lines.
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

fn default_level() -> String {
    "info,sqlx=warn".to_string()
}

fn default_format() -> String {
    "json".to_string()
}
