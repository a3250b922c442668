use std::collections::BTreeMap;

use super::{Config, ConfigOverrides, ConfigSource, FIELDS};

fn source_label(source: &ConfigSource) -> String {
    match source {
        ConfigSource::Defaults => "default".to_string(),
        ConfigSource::ConfigFile(path) => format!("config ({})", path.display()),
        ConfigSource::Environment => "env".to_string(),
        ConfigSource::Programmatic => "programmatic".to_string(),
    }
}

impl Config {
    /// Layer every value present in `overrides` on top of this config and
    /// attribute it to `source`.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides, source: &ConfigSource) {
        if let Some(shell) = &overrides.shell {
            self.attribute("shell", source);
            self.shell.clone_from(shell);
        }
        if let Some(prefix) = &overrides.prefix {
            self.attribute("prefix", source);
            self.prefix.clone_from(prefix);
        }
        if let Some(stdout) = overrides.stdout {
            self.attribute("stdout", source);
            self.stdout = stdout;
        }
        if let Some(stderr) = overrides.stderr {
            self.attribute("stderr", source);
            self.stderr = stderr;
        }
        if let Some(verbose) = overrides.verbose {
            self.attribute("verbose", source);
            self.verbose = verbose;
        }
        if let Some(throw_errors) = overrides.throw_errors {
            self.attribute("throw_errors", source);
            self.throw_errors = throw_errors;
        }
    }

    fn attribute(&mut self, field: &str, source: &ConfigSource) {
        self.source_attribution
            .insert(field.to_string(), source.clone());
    }

    /// Get effective configuration as key-value pairs with source attribution
    #[must_use]
    pub fn effective_config(&self) -> BTreeMap<String, (String, String)> {
        FIELDS
            .iter()
            .map(|field| {
                let value = match *field {
                    "shell" => self.shell.clone(),
                    "prefix" => self.prefix.clone(),
                    "stdout" => self.stdout.to_string(),
                    "stderr" => self.stderr.to_string(),
                    "verbose" => self.verbose.to_string(),
                    _ => self.throw_errors.to_string(),
                };
                (
                    (*field).to_string(),
                    (value, source_label(self.source_of(field))),
                )
            })
            .collect()
    }
}
