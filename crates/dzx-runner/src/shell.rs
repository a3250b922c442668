use dzx_config::{Config, ConfigError, SharedConfig};
use dzx_utils::ExitCode;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::panic::Location;

use crate::command::Command;
use crate::process::ProcessHandle;

/// Entry point that creates process handles from a shared configuration.
///
/// Changes made through [`config`](Self::config) apply to every handle that
/// starts afterwards.
#[derive(Debug, Clone, Default)]
pub struct Shell {
    config: SharedConfig,
}

impl Shell {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config: SharedConfig::new(config),
        }
    }

    #[must_use]
    pub fn with_shared(config: SharedConfig) -> Self {
        Self { config }
    }

    /// Shell configured from `.dzx/config.toml` and `DZX_*` variables.
    pub fn discover() -> Result<Self, ConfigError> {
        Ok(Self::new(Config::discover()?))
    }

    #[must_use]
    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// Create a lazy handle for `command`; nothing runs until it is used.
    #[must_use]
    #[track_caller]
    pub fn spawn(&self, command: impl Into<Command>) -> ProcessHandle {
        ProcessHandle::with_location(command.into(), self.config.clone(), Location::caller())
    }

    /// Run `command` and resolve to its exit code, never failing.
    ///
    /// Resolves to 1 when no code could be produced.
    #[track_caller]
    pub fn status_only(&self, command: impl Into<Command>) -> BoxFuture<'static, i32> {
        let handle = self.spawn(command);
        async move {
            handle
                .status_code()
                .await
                .unwrap_or(ExitCode::FAILURE.as_i32())
        }
        .boxed()
    }

    /// Run `command` without throwing and resolve to its trimmed stdout.
    #[track_caller]
    pub fn stdout_only(&self, command: impl Into<Command>) -> BoxFuture<'static, String> {
        let handle = self.spawn(command).no_throw();
        async move {
            handle
                .stdout()
                .read()
                .await
                .map(|text| text.trim().to_string())
                .unwrap_or_default()
        }
        .boxed()
    }

    /// Run `command` without throwing and resolve to its trimmed stderr.
    #[track_caller]
    pub fn stderr_only(&self, command: impl Into<Command>) -> BoxFuture<'static, String> {
        let handle = self.spawn(command).no_throw();
        async move {
            handle
                .stderr()
                .read()
                .await
                .map(|text| text.trim().to_string())
                .unwrap_or_default()
        }
        .boxed()
    }
}

impl From<Config> for Shell {
    fn from(config: Config) -> Self {
        Self::new(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell() -> Shell {
        Shell::new(Config::builder().verbose(0).build().unwrap())
    }

    #[tokio::test]
    async fn test_status_only() {
        assert_eq!(shell().status_only("exit 7").await, 7);
        assert_eq!(shell().status_only("true").await, 0);
    }

    #[tokio::test]
    async fn test_status_only_spawn_failure() {
        let shell = Shell::new(
            Config::builder()
                .shell("/nonexistent/dzx-shell")
                .verbose(0)
                .build()
                .unwrap(),
        );
        assert_eq!(shell.status_only("true").await, 127);
    }

    #[tokio::test]
    async fn test_stdout_only_trims_and_never_throws() {
        assert_eq!(shell().stdout_only("echo '  hi  '; exit 3").await, "hi");
    }

    #[tokio::test]
    async fn test_stderr_only() {
        assert_eq!(shell().stderr_only("echo out; echo err >&2").await, "err");
    }

    #[tokio::test]
    async fn test_config_is_read_at_start() {
        let shell = shell();
        let handle = shell.spawn("echo \"$DZX_TEST_VALUE\"");
        shell
            .config()
            .update(|c| c.prefix = "DZX_TEST_VALUE=late;".to_string())
            .unwrap();

        let output = handle.output().await.unwrap();
        assert_eq!(output.stdout, "late\n");
    }

    #[tokio::test]
    async fn test_started_handle_keeps_its_snapshot() {
        let shell = shell();
        let handle = shell.spawn("sleep 0.1; echo done");
        handle.start().unwrap();
        shell.config().update(|c| c.throw_errors = false).unwrap();

        assert!(handle.throws());
        assert!(!shell.spawn("true").throws());
    }
}
