use std::path::PathBuf;

use dzx_utils::{ErrorCategory, UserFriendlyError};
use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file {path}: {reason}")]
    InvalidFile { path: PathBuf, reason: String },

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: PathBuf },

    #[error("Configuration discovery failed: {reason}")]
    DiscoveryFailed { reason: String },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile { path, reason } => {
                format!("Configuration file {} has invalid format: {reason}", path.display())
            }
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => {
                format!("Configuration file not found: {}", path.display())
            }
            Self::DiscoveryFailed { reason } => {
                format!("Failed to discover configuration: {reason}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile { .. } | Self::NotFound { .. } => Some(
                "dzx reads DZX_CONFIG if set, otherwise the nearest .dzx/config.toml".to_string(),
            ),
            Self::InvalidValue { .. } => Some(
                "Values come from DZX_* environment variables, the [shell] table, or the builder"
                    .to_string(),
            ),
            Self::DiscoveryFailed { .. } => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile { .. } => vec![
                "Check the TOML syntax of the file".to_string(),
                "Keep all settings inside a single [shell] table".to_string(),
            ],
            Self::InvalidValue { key, .. } => match key.as_str() {
                "verbose" => vec!["Use a verbosity between 0 and 3".to_string()],
                "stdout" | "stderr" => {
                    vec!["Use one of: piped, inherit, null".to_string()]
                }
                "throw_errors" => vec!["Use true or false".to_string()],
                _ => vec![format!("Check the value configured for '{key}'")],
            },
            Self::NotFound { .. } => vec![
                "Unset DZX_CONFIG or point it at an existing file".to_string(),
            ],
            Self::DiscoveryFailed { .. } => {
                vec!["Run dzx from a readable working directory".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::FileSystem,
            _ => ErrorCategory::Configuration,
        }
    }
}
