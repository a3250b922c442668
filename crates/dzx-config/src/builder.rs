use crate::error::ConfigError;

use super::{Config, ConfigOverrides, ConfigSource, StdioMode, Verbosity};

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// Use this when a program embeds dzx and wants deterministic settings
    /// that do not depend on environment variables or config files.
    ///
    /// # Example
    ///
    /// ```rust
    /// use dzx_config::{Config, StdioMode};
    ///
    /// let config = Config::builder()
    ///     .shell("/bin/sh")
    ///     .prefix("set -e;")
    ///     .stderr(StdioMode::Inherit)
    ///     .verbose(0)
    ///     .build()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.shell, "/bin/sh");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Start a builder whose unset values fall back to this config.
    #[must_use]
    pub fn to_builder(&self) -> ConfigBuilder {
        ConfigBuilder {
            base: self.clone(),
            ..ConfigBuilder::new()
        }
    }
}

/// Builder for programmatic configuration.
///
/// All values set via the builder are attributed to
/// `ConfigSource::Programmatic` in the resulting `Config`.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    base: Config,
    shell: Option<String>,
    prefix: Option<String>,
    stdout: Option<StdioMode>,
    stderr: Option<StdioMode>,
    verbose: Option<u8>,
    throw_errors: Option<bool>,
}

impl ConfigBuilder {
    /// Create a new `ConfigBuilder` with no values set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: Config::default(),
            shell: None,
            prefix: None,
            stdout: None,
            stderr: None,
            verbose: None,
            throw_errors: None,
        }
    }

    /// Shell executable used to interpret command strings.
    #[must_use]
    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self
    }

    /// Preamble prepended to every command; pass `""` to disable.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn stdout(mut self, mode: StdioMode) -> Self {
        self.stdout = Some(mode);
        self
    }

    #[must_use]
    pub fn stderr(mut self, mode: StdioMode) -> Self {
        self.stderr = Some(mode);
        self
    }

    /// Verbosity level, validated in [`build`](Self::build).
    #[must_use]
    pub fn verbose(mut self, level: u8) -> Self {
        self.verbose = Some(level);
        self
    }

    #[must_use]
    pub fn throw_errors(mut self, throw: bool) -> Self {
        self.throw_errors = Some(throw);
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the verbosity is above 3 or the
    /// resulting config fails [`Config::validate`].
    pub fn build(self) -> Result<Config, ConfigError> {
        let verbose = self.verbose.map(Verbosity::new).transpose()?;
        let overrides = ConfigOverrides {
            shell: self.shell,
            prefix: self.prefix,
            stdout: self.stdout,
            stderr: self.stderr,
            verbose,
            throw_errors: self.throw_errors,
        };

        let mut config = self.base;
        config.apply_overrides(&overrides, &ConfigSource::Programmatic);
        config.validate()?;
        Ok(config)
    }
}
