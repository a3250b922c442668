use dzx_utils::error::render_for_user;
use dzx_utils::{ErrorCategory, ExitCode, UserFriendlyError};
use std::fmt;
use std::panic::Location;
use thiserror::Error;

use crate::output::{ProcessOutput, ProcessStatus};
use crate::view::Channel;

/// How a failed process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The shell could not be started at all.
    Spawn,
    /// The process exited with a non-zero code.
    Exit,
    /// The process was terminated by a signal.
    Signal,
}

/// A process that did not succeed, with everything it produced.
///
/// The message records where the command was created, so an error surfacing
/// far from its origin still points at the call site.
#[derive(Debug, Clone)]
pub struct ProcessError {
    command: String,
    output: ProcessOutput,
    kind: FailureKind,
    location: &'static Location<'static>,
    message: String,
}

impl ProcessError {
    pub(crate) fn from_output(
        command: impl Into<String>,
        output: ProcessOutput,
        location: &'static Location<'static>,
    ) -> Self {
        let kind = if output.status.signal.is_some() {
            FailureKind::Signal
        } else {
            FailureKind::Exit
        };
        Self::build(command.into(), output, kind, location, None)
    }

    /// A spawn failure, with a synthesised status: 127 when the shell does not
    /// exist, 126 when it cannot be executed, 1 otherwise.
    pub(crate) fn spawn(
        command: impl Into<String>,
        error: &std::io::Error,
        retries: u32,
        location: &'static Location<'static>,
    ) -> Self {
        let code = match error.kind() {
            std::io::ErrorKind::NotFound => ExitCode::NOT_FOUND,
            std::io::ErrorKind::PermissionDenied => ExitCode::NOT_EXECUTABLE,
            _ => ExitCode::FAILURE,
        };
        let output = ProcessOutput {
            stdout: String::new(),
            stderr: String::new(),
            combined: String::new(),
            status: ProcessStatus::exited(code.as_i32()),
            retries,
        };
        Self::build(
            command.into(),
            output,
            FailureKind::Spawn,
            location,
            Some(error.to_string()),
        )
    }

    fn build(
        command: String,
        output: ProcessOutput,
        kind: FailureKind,
        location: &'static Location<'static>,
        reason: Option<String>,
    ) -> Self {
        let mut message = match kind {
            FailureKind::Spawn => format!(
                "Failed to spawn `{command}`: {}",
                reason.as_deref().unwrap_or("unknown error")
            ),
            FailureKind::Exit => format!(
                "`{command}` failed with exit code {}",
                output.status.exit_code()
            ),
            FailureKind::Signal => format!("`{command}` was {}", output.status),
        };
        match output.retries {
            0 => {}
            1 => message.push_str(" after 1 retry"),
            n => message.push_str(&format!(" after {n} retries")),
        }
        message.push_str(&format!("\n    at {location}"));

        Self {
            command,
            output,
            kind,
            location,
            message,
        }
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    #[must_use]
    pub fn output(&self) -> &ProcessOutput {
        &self.output
    }

    #[must_use]
    pub fn into_output(self) -> ProcessOutput {
        self.output
    }

    #[must_use]
    pub fn status(&self) -> ProcessStatus {
        self.output.status
    }

    #[must_use]
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    #[must_use]
    pub fn retries(&self) -> u32 {
        self.output.retries
    }

    /// Where the failing command was created.
    #[must_use]
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Captured combined output followed by the decorated summary.
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut rendered = self.output.combined.clone();
        if !rendered.is_empty() && !rendered.ends_with('\n') {
            rendered.push('\n');
        }
        if !rendered.is_empty() {
            rendered.push('\n');
        }
        rendered.push_str(&render_for_user(self));
        rendered
    }
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProcessError {}

impl UserFriendlyError for ProcessError {
    fn user_message(&self) -> String {
        self.message
            .split_once("\n    at ")
            .map_or(self.message.as_str(), |(summary, _)| summary)
            .to_string()
    }

    fn context(&self) -> Option<String> {
        Some(format!("Command created at {}", self.location))
    }

    fn suggestions(&self) -> Vec<String> {
        let mut suggestions = Vec::new();
        match (self.kind, self.output.status.code) {
            (FailureKind::Spawn, 127) => {
                suggestions.push("Check that the configured shell exists".to_string());
            }
            (FailureKind::Spawn, 126) => {
                suggestions.push("Check that the configured shell is executable".to_string());
            }
            (FailureKind::Exit, 127) => {
                suggestions.push("Check that the command is installed and on PATH".to_string());
            }
            (FailureKind::Exit, 126) => {
                suggestions.push("Check the file permissions of the command".to_string());
            }
            (FailureKind::Signal, _) => {
                suggestions.push(
                    "The process was killed; check timeouts and explicit kill calls".to_string(),
                );
            }
            _ => {}
        }
        if matches!(self.kind, FailureKind::Exit | FailureKind::Signal) {
            suggestions.push("Use no_throw() to inspect the output without failing".to_string());
        }
        suggestions
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::ProcessExecution
    }
}

/// Errors surfaced by process handles, views, and pipelines
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("The {channel} channel is already being consumed")]
    AlreadyConsumed { channel: Channel },

    #[error("Stdin is not available: {reason}")]
    StdinUnavailable { reason: String },

    #[error("The process has not been started")]
    NotStarted,

    #[error("No Tokio runtime is available to drive the process")]
    NoRuntime,

    #[error("Command template has {placeholders} placeholders but {arguments} arguments were given")]
    Template { placeholders: usize, arguments: usize },

    #[error("Pipe failed: {reason}")]
    Pipe { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunError {
    /// The process failure, when this error is one.
    #[must_use]
    pub fn process_error(&self) -> Option<&ProcessError> {
        match self {
            Self::Process(error) => Some(error),
            _ => None,
        }
    }

    /// Exit code a binary should terminate with for this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Process(error) => error.status().code,
            Self::Template { .. } => ExitCode::MISUSE.as_i32(),
            _ => ExitCode::FAILURE.as_i32(),
        }
    }

    /// Render the error for a terminal.
    #[must_use]
    pub fn display_for_user(&self) -> String {
        match self {
            Self::Process(error) => error.display_for_user(),
            _ => render_for_user(self),
        }
    }
}

impl UserFriendlyError for RunError {
    fn user_message(&self) -> String {
        match self {
            Self::Process(error) => error.user_message(),
            _ => self.to_string(),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Process(error) => error.context(),
            Self::AlreadyConsumed { .. } => Some(
                "Each channel can be read by a single consumer, and only once".to_string(),
            ),
            Self::StdinUnavailable { .. } => Some(
                "Stdin is closed right after spawn unless it was claimed beforehand".to_string(),
            ),
            Self::NoRuntime => {
                Some("Processes are driven by tasks on the current Tokio runtime".to_string())
            }
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Process(error) => error.suggestions(),
            Self::AlreadyConsumed { .. } => vec![
                "Await the handle and use the captured output instead".to_string(),
                "Tee the channel into a sink with pipe() before reading it".to_string(),
            ],
            Self::StdinUnavailable { .. } => vec![
                "Call stdin() or connect the pipe before the process starts".to_string(),
            ],
            Self::NotStarted => vec!["Start the process with start() or by awaiting it".to_string()],
            Self::NoRuntime => vec![
                "Run inside #[tokio::main] or a Runtime::block_on call".to_string(),
            ],
            Self::Template { .. } => vec![
                "Pass exactly one argument per {} placeholder".to_string(),
            ],
            Self::Pipe { .. } | Self::Io(_) => vec![],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Process(_) => ErrorCategory::ProcessExecution,
            Self::AlreadyConsumed { .. } | Self::StdinUnavailable { .. } | Self::Pipe { .. } => {
                ErrorCategory::Pipeline
            }
            Self::NotStarted | Self::Template { .. } => ErrorCategory::Usage,
            Self::NoRuntime => ErrorCategory::Runtime,
            Self::Io(_) => ErrorCategory::FileSystem,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_output(code: i32, retries: u32) -> ProcessOutput {
        ProcessOutput {
            stdout: "out\n".to_string(),
            stderr: "err\n".to_string(),
            combined: "out\nerr\n".to_string(),
            status: ProcessStatus::exited(code),
            retries,
        }
    }

    #[test]
    fn test_exit_message_includes_code_and_location() {
        let location = Location::caller();
        let error = ProcessError::from_output("false", failed_output(1, 0), location);

        assert_eq!(error.kind(), FailureKind::Exit);
        assert!(error.message().starts_with("`false` failed with exit code 1"));
        assert!(error.message().contains(&format!("at {location}")));
        assert!(error.message().contains("error.rs"));
    }

    #[test]
    fn test_retry_count_in_message() {
        let location = Location::caller();
        let once = ProcessError::from_output("x", failed_output(2, 1), location);
        let many = ProcessError::from_output("x", failed_output(2, 3), location);
        assert!(once.message().contains("after 1 retry\n"));
        assert!(many.message().contains("after 3 retries\n"));
    }

    #[test]
    fn test_signal_kind() {
        let mut output = failed_output(0, 0);
        output.status = ProcessStatus::signaled(9);
        let error = ProcessError::from_output("sleep 10", output, Location::caller());
        assert_eq!(error.kind(), FailureKind::Signal);
        assert_eq!(error.status().code, 137);
        assert!(error.message().contains("SIGKILL"));
    }

    #[test]
    fn test_spawn_failure_synthesises_status() {
        let io = std::io::Error::from(std::io::ErrorKind::NotFound);
        let error = ProcessError::spawn("ls", &io, 0, Location::caller());
        assert_eq!(error.kind(), FailureKind::Spawn);
        assert_eq!(error.status().code, 127);
        assert!(!error.status().success);

        let io = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert_eq!(ProcessError::spawn("ls", &io, 0, Location::caller()).status().code, 126);
    }

    #[test]
    fn test_display_for_user_shows_output_then_summary() {
        let error = ProcessError::from_output("exit 3", failed_output(3, 0), Location::caller());
        let rendered = error.display_for_user();

        assert!(rendered.starts_with("out\nerr\n\nError: `exit 3` failed with exit code 3"));
        assert!(rendered.contains("Context: Command created at"));
        assert!(rendered.contains("Suggestions:"));
    }

    #[test]
    fn test_user_message_drops_location_line() {
        let error = ProcessError::from_output("false", failed_output(1, 0), Location::caller());
        assert!(!error.user_message().contains("    at "));
    }

    #[test]
    fn test_run_error_exit_codes() {
        let process = ProcessError::from_output("x", failed_output(42, 0), Location::caller());
        assert_eq!(RunError::from(process).exit_code(), 42);
        assert_eq!(RunError::NoRuntime.exit_code(), 1);
        assert_eq!(
            RunError::Template { placeholders: 1, arguments: 2 }.exit_code(),
            2
        );
    }

    #[test]
    fn test_run_error_categories() {
        assert_eq!(
            RunError::AlreadyConsumed { channel: Channel::Stdout }.category(),
            ErrorCategory::Pipeline
        );
        assert_eq!(RunError::NotStarted.category(), ErrorCategory::Usage);
        assert_eq!(RunError::NoRuntime.category(), ErrorCategory::Runtime);
    }

    #[test]
    fn test_already_consumed_message() {
        let err = RunError::AlreadyConsumed { channel: Channel::Stderr };
        assert_eq!(err.to_string(), "The stderr channel is already being consumed");
        assert!(err.display_for_user().starts_with("Error: The stderr channel"));
    }
}
