//! Settings holds the layered application configuration: `/etc/frank/config.yaml`,
//! `$HOME/.frank/config.yaml`, `./.frank.yaml`, and the `FRANK_LOG_LEVEL` environment variable,
//! in increasing precedence. Unlike the user's `config/` tree, a missing or malformed settings
//! layer is never fatal — these are ergonomics, not requirements.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::warn;

/// LogLevel is the recognised set of `FRANK_LOG_LEVEL` / `log_level` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debug is the most verbose level.
    Debug,
    /// Info is the default level.
    Info,
    /// Warn (also accepted as "warning").
    #[serde(alias = "warning")]
    Warn,
    /// Error is the least verbose level.
    Error,
}

impl LogLevel {
    /// As_filter returns the `tracing_subscriber::EnvFilter` directive for this level.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    fn parse(s: &str) -> Option<LogLevel> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// AppSettings is the resolved, effective settings for the tool itself.
#[derive(Debug, Clone)]
pub struct AppSettings {
    /// Log_level is the resolved log level.
    pub log_level: LogLevel,
}

/// Layer is the partial, YAML-decoded shape of a single settings file.
#[derive(Debug, Default, Deserialize)]
struct Layer {
    log_level: Option<LogLevel>,
}

impl AppSettings {
    /// Load resolves settings from the file layers and environment, never failing: a missing
    /// or unparsable layer is skipped with a warning.
    pub fn load() -> AppSettings {
        let mut merged = Layer::default();
        for path in Self::layer_paths() {
            match std::fs::read_to_string(&path) {
                Ok(text) => match serde_yaml::from_str::<Layer>(&text) {
                    Ok(layer) => merged = merge_layer(merged, layer),
                    Err(err) => warn!(path = %path.display(), %err, "ignoring unparsable settings file"),
                },
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!(path = %path.display(), %err, "ignoring unreadable settings file"),
            }
        }

        if let Ok(val) = std::env::var("FRANK_LOG_LEVEL") {
            match LogLevel::parse(&val) {
                Some(level) => merged.log_level = Some(level),
                None => warn!(value = %val, "ignoring unrecognised FRANK_LOG_LEVEL"),
            }
        }

        AppSettings {
            log_level: merged.log_level.unwrap_or(LogLevel::Info),
        }
    }

    /// Layer_paths returns the settings file locations in increasing precedence.
    fn layer_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/frank/config.yaml")];
        if let Some(home) = dirs_home() {
            paths.push(home.join(".frank").join("config.yaml"));
        }
        paths.push(PathBuf::from("./.frank.yaml"));
        paths
    }
}

/// Merge_layer applies child-over-parent precedence, identical in spirit to the Config
/// Resolver's merge rule: a present child field overrides the parent, an absent one inherits.
fn merge_layer(parent: Layer, child: Layer) -> Layer {
    Layer {
        log_level: child.log_level.or(parent.log_level),
    }
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_parses_warning_alias() {
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("warn"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("bogus"), None);
    }

    #[test]
    fn merge_prefers_child() {
        let parent = Layer {
            log_level: Some(LogLevel::Error),
        };
        let child = Layer { log_level: None };
        let merged = merge_layer(parent, child);
        assert_eq!(merged.log_level, Some(LogLevel::Error));

        let parent = Layer {
            log_level: Some(LogLevel::Error),
        };
        let child = Layer {
            log_level: Some(LogLevel::Debug),
        };
        let merged = merge_layer(parent, child);
        assert_eq!(merged.log_level, Some(LogLevel::Debug));
    }
}
