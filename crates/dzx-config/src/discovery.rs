use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::ConfigError;

use super::{Config, ConfigOverrides, ConfigSource, StdioMode, Verbosity};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "DZX_CONFIG";

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    shell: Option<ConfigOverrides>,
}

impl Config {
    /// Discover and load configuration with precedence: env > file > defaults
    ///
    /// Uses the current working directory for config file discovery and the
    /// process environment for `DZX_*` variables.
    pub fn discover() -> Result<Self, ConfigError> {
        let start_dir = std::env::current_dir().map_err(|e| ConfigError::DiscoveryFailed {
            reason: format!("failed to get current directory: {e}"),
        })?;
        let env: HashMap<String, String> = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();
        Self::discover_from(&start_dir, &env)
    }

    /// Discover and load configuration starting from a specific directory
    ///
    /// This is the path-driven variant used by tests to avoid process-global
    /// state: both the search root and the environment are explicit.
    pub fn discover_from(start_dir: &Path, env: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        let config_path = match env.get(CONFIG_ENV) {
            Some(explicit) => {
                let path = PathBuf::from(explicit);
                if !path.is_file() {
                    return Err(ConfigError::NotFound { path });
                }
                Some(path)
            }
            None => Self::discover_config_file_from(start_dir),
        };

        if let Some(path) = config_path {
            let file_config = Self::load_config_file(&path)?;
            if let Some(overrides) = file_config.shell {
                debug!(path = %path.display(), "Applying config file");
                config.apply_overrides(&overrides, &ConfigSource::ConfigFile(path));
            }
        }

        let env_overrides = overrides_from_env(env)?;
        if !env_overrides.is_empty() {
            debug!("Applying DZX_* environment overrides");
            config.apply_overrides(&env_overrides, &ConfigSource::Environment);
        }

        config.validate()?;
        Ok(config)
    }

    /// Find `.dzx/config.toml` searching upward from `start_dir`.
    ///
    /// The search stops at the filesystem root or at the first directory that
    /// looks like a repository root.
    #[must_use]
    pub fn discover_config_file_from(start_dir: &Path) -> Option<PathBuf> {
        let mut current_dir = start_dir;

        loop {
            let config_path = current_dir.join(".dzx").join("config.toml");
            if config_path.is_file() {
                return Some(config_path);
            }

            if current_dir.join(".git").exists()
                || current_dir.join(".hg").exists()
                || current_dir.join(".svn").exists()
            {
                return None;
            }

            current_dir = current_dir.parent()?;
        }
    }

    /// Load configuration from TOML file
    fn load_config_file(path: &Path) -> Result<TomlConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::InvalidFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

fn overrides_from_env(env: &HashMap<String, String>) -> Result<ConfigOverrides, ConfigError> {
    let invalid = |key: &str, value: &str, expected: &str| ConfigError::InvalidValue {
        key: key.to_string(),
        value: format!("'{value}' is not {expected}"),
    };

    let stdio = |key: &str, var: &str| -> Result<Option<StdioMode>, ConfigError> {
        env.get(var)
            .map(|value| {
                value
                    .parse::<StdioMode>()
                    .map_err(|_| invalid(key, value, "one of piped, inherit, null"))
            })
            .transpose()
    };

    let verbose = env
        .get("DZX_VERBOSE")
        .map(|value| {
            let level = value
                .trim()
                .parse::<u8>()
                .map_err(|_| invalid("verbose", value, "a number"))?;
            Verbosity::new(level)
        })
        .transpose()?;

    let throw_errors = env
        .get("DZX_THROW_ERRORS")
        .map(|value| parse_bool(value).ok_or_else(|| invalid("throw_errors", value, "a boolean")))
        .transpose()?;

    Ok(ConfigOverrides {
        shell: env.get("DZX_SHELL").cloned(),
        prefix: env.get("DZX_PREFIX").cloned(),
        stdout: stdio("stdout", "DZX_STDOUT")?,
        stderr: stdio("stderr", "DZX_STDERR")?,
        verbose,
        throw_errors,
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn write_config(dir: &Path, content: &str) -> PathBuf {
        let config_dir = dir.join(".dzx");
        fs::create_dir_all(&config_dir).unwrap();
        let path = config_dir.join("config.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file_or_env() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        let config = Config::discover_from(temp.path(), &HashMap::new()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_file_found_by_upward_search() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        let path = write_config(temp.path(), "[shell]\nshell = \"/bin/sh\"\nverbose = 0\n");
        let nested = temp.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let config = Config::discover_from(&nested, &HashMap::new()).unwrap();
        assert_eq!(config.shell, "/bin/sh");
        assert_eq!(config.verbose, Verbosity::SILENT);
        assert_eq!(config.source_of("shell"), &ConfigSource::ConfigFile(path));
        assert_eq!(config.source_of("prefix"), &ConfigSource::Defaults);
    }

    #[test]
    fn test_search_stops_at_repository_root() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "[shell]\nshell = \"/bin/sh\"\n");
        let repo = temp.path().join("repo");
        fs::create_dir_all(repo.join(".git")).unwrap();

        assert_eq!(Config::discover_config_file_from(&repo), None);
    }

    #[test]
    fn test_env_overrides_file() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        write_config(
            temp.path(),
            "[shell]\nshell = \"/bin/sh\"\nthrow_errors = true\nstderr = \"inherit\"\n",
        );

        let config = Config::discover_from(
            temp.path(),
            &env(&[
                ("DZX_SHELL", "/bin/zsh"),
                ("DZX_THROW_ERRORS", "false"),
                ("DZX_PREFIX", ""),
            ]),
        )
        .unwrap();

        assert_eq!(config.shell, "/bin/zsh");
        assert!(!config.throw_errors);
        assert_eq!(config.prefix, "");
        assert_eq!(config.stderr, StdioMode::Inherit);
        assert_eq!(config.source_of("shell"), &ConfigSource::Environment);
        assert!(matches!(config.source_of("stderr"), ConfigSource::ConfigFile(_)));
    }

    #[test]
    fn test_explicit_config_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");
        fs::write(&path, "[shell]\nstdout = \"null\"\n").unwrap();

        let config = Config::discover_from(
            temp.path(),
            &env(&[(CONFIG_ENV, path.to_str().unwrap())]),
        )
        .unwrap();
        assert_eq!(config.stdout, StdioMode::Null);
    }

    #[test]
    fn test_explicit_config_path_missing() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing.toml");
        let err = Config::discover_from(
            temp.path(),
            &env(&[(CONFIG_ENV, missing.to_str().unwrap())]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        write_config(temp.path(), "[shell]\nunknown_key = 1\n");

        let err = Config::discover_from(temp.path(), &HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFile { .. }));
    }

    #[test]
    fn test_invalid_env_values() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();

        for (key, value, field) in [
            ("DZX_VERBOSE", "loud", "verbose"),
            ("DZX_VERBOSE", "7", "verbose"),
            ("DZX_THROW_ERRORS", "maybe", "throw_errors"),
            ("DZX_STDOUT", "tty", "stdout"),
        ] {
            let err = Config::discover_from(temp.path(), &env(&[(key, value)])).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { ref key, .. } if key == field),
                "{key}={value} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_parse_bool_variants() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" 0 "), Some(false));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool(""), None);
    }
}
