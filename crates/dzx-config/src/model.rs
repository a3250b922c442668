use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

/// Default shell used to interpret command strings
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Default preamble prepended to every command
pub const DEFAULT_PREFIX: &str = "set -euo pipefail;";

/// How a child's stdout or stderr is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StdioMode {
    /// Captured by dzx and exposed through the channel views (default)
    #[default]
    Piped,
    /// Shared with the host process; the channel view stays empty
    Inherit,
    /// Discarded; the channel view stays empty
    Null,
}

impl StdioMode {
    #[must_use]
    pub const fn is_piped(self) -> bool {
        matches!(self, Self::Piped)
    }
}

impl fmt::Display for StdioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Piped => write!(f, "piped"),
            Self::Inherit => write!(f, "inherit"),
            Self::Null => write!(f, "null"),
        }
    }
}

impl FromStr for StdioMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "piped" => Ok(Self::Piped),
            "inherit" => Ok(Self::Inherit),
            "null" => Ok(Self::Null),
            other => Err(ConfigError::InvalidValue {
                key: "stdio".to_string(),
                value: format!("unknown stdio mode '{other}'"),
            }),
        }
    }
}

/// Verbosity level, 0 through 3.
///
/// | Level | Effect |
/// |-------|--------|
/// | 0 | silent |
/// | 1 | echo `$ <command>` to stderr before spawning |
/// | 2 | additionally copy live stdout/stderr to the host |
/// | 3 | additionally enable internal diagnostics |
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Verbosity(u8);

impl Verbosity {
    pub const SILENT: Verbosity = Verbosity(0);
    pub const COMMANDS: Verbosity = Verbosity(1);
    pub const OUTPUT: Verbosity = Verbosity(2);
    pub const DIAGNOSTICS: Verbosity = Verbosity(3);

    pub fn new(level: u8) -> Result<Self, ConfigError> {
        if level > Self::DIAGNOSTICS.0 {
            return Err(ConfigError::InvalidValue {
                key: "verbose".to_string(),
                value: format!("{level} exceeds maximum level of 3"),
            });
        }
        Ok(Self(level))
    }

    #[must_use]
    pub const fn level(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn echo_commands(self) -> bool {
        self.0 >= Self::COMMANDS.0
    }

    #[must_use]
    pub const fn echo_output(self) -> bool {
        self.0 >= Self::OUTPUT.0
    }

    #[must_use]
    pub const fn diagnostics(self) -> bool {
        self.0 >= Self::DIAGNOSTICS.0
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Self::COMMANDS
    }
}

impl TryFrom<u8> for Verbosity {
    type Error = ConfigError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Self::new(level)
    }
}

impl From<Verbosity> for u8 {
    fn from(verbosity: Verbosity) -> Self {
        verbosity.0
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of a configuration value.
///
/// Precedence, highest first: programmatic > environment > config file >
/// built-in defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Built-in default value
    Defaults,
    /// Loaded from the given configuration file
    ConfigFile(PathBuf),
    /// Read from a `DZX_*` environment variable
    Environment,
    /// Set through [`ConfigBuilder`](crate::ConfigBuilder) or [`Config::apply_overrides`]
    Programmatic,
}

/// Process-execution settings snapshotted by every spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Shell executable that receives `-c <prefix> <command>`
    pub shell: String,
    /// Preamble prepended to every command string
    pub prefix: String,
    pub stdout: StdioMode,
    pub stderr: StdioMode,
    pub verbose: Verbosity,
    /// Whether a failed command surfaces as an error (`true`) or as a value
    pub throw_errors: bool,
    /// Where each effective value came from, keyed by field name
    pub source_attribution: HashMap<String, ConfigSource>,
}

/// Field names tracked in [`Config::source_attribution`].
pub const FIELDS: [&str; 6] = [
    "shell",
    "prefix",
    "stdout",
    "stderr",
    "verbose",
    "throw_errors",
];

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            prefix: DEFAULT_PREFIX.to_string(),
            stdout: StdioMode::Piped,
            stderr: StdioMode::Piped,
            verbose: Verbosity::default(),
            throw_errors: true,
            source_attribution: FIELDS
                .iter()
                .map(|field| ((*field).to_string(), ConfigSource::Defaults))
                .collect(),
        }
    }
}

impl Config {
    /// Full command line handed to the shell for `command`.
    ///
    /// An empty prefix is omitted rather than leaving a leading space.
    #[must_use]
    pub fn shell_script(&self, command: &str) -> String {
        if self.prefix.is_empty() {
            command.to_string()
        } else {
            format!("{} {command}", self.prefix)
        }
    }

    /// Source of a single field, `Defaults` when untracked.
    #[must_use]
    pub fn source_of(&self, field: &str) -> &ConfigSource {
        self.source_attribution
            .get(field)
            .unwrap_or(&ConfigSource::Defaults)
    }
}

/// Optional per-field values, as they appear in the `[shell]` TOML table or
/// in a partial programmatic override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverrides {
    pub shell: Option<String>,
    pub prefix: Option<String>,
    pub stdout: Option<StdioMode>,
    pub stderr: Option<StdioMode>,
    pub verbose: Option<Verbosity>,
    pub throw_errors: Option<bool>,
}

impl ConfigOverrides {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
