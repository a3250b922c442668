use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shell.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "shell".to_string(),
                value: "must not be empty".to_string(),
            });
        }

        // Both strings end up in an argv; the OS rejects interior NULs at spawn.
        if self.shell.contains('\0') {
            return Err(ConfigError::InvalidValue {
                key: "shell".to_string(),
                value: "must not contain NUL bytes".to_string(),
            });
        }
        if self.prefix.contains('\0') {
            return Err(ConfigError::InvalidValue {
                key: "prefix".to_string(),
                value: "must not contain NUL bytes".to_string(),
            });
        }

        Ok(())
    }
}
