//! Captured result of a finished process.

use dzx_utils::ExitCode;
use serde::Serialize;
use std::fmt;
use std::process::ExitStatus;

/// Exit information for the final attempt of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessStatus {
    /// Exit code; `128 + n` when the process was terminated by signal `n`.
    pub code: i32,
    pub success: bool,
    /// Terminating signal, if any.
    pub signal: Option<i32>,
}

impl ProcessStatus {
    #[must_use]
    pub const fn exited(code: i32) -> Self {
        Self {
            code,
            success: code == 0,
            signal: None,
        }
    }

    #[must_use]
    pub const fn signaled(signal: i32) -> Self {
        Self {
            code: ExitCode::from_signal(signal).as_i32(),
            success: false,
            signal: Some(signal),
        }
    }

    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from_i32(self.code)
    }
}

impl From<ExitStatus> for ProcessStatus {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::signaled(signal);
            }
        }
        Self::exited(status.code().unwrap_or(ExitCode::FAILURE.as_i32()))
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.signal {
            Some(signal) => write!(
                f,
                "terminated by {} ({})",
                crate::signal_name(signal).unwrap_or("unknown signal"),
                self.exit_code()
            ),
            None => write!(f, "exit code {}", self.exit_code()),
        }
    }
}

/// Everything a process wrote, plus how it ended.
///
/// `stdout` and `stderr` hold the final attempt's bytes decoded lossily as
/// UTF-8. `combined` holds the lines of both streams in the order they were
/// observed, so it always contains exactly the lines of `stdout` and `stderr`
/// but their relative order is best-effort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub combined: String,
    pub status: ProcessStatus,
    /// Number of retries performed before this result.
    pub retries: u32,
}

impl ProcessOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.status.success
    }

    /// Stdout with exactly one trailing newline removed.
    ///
    /// This is the form substituted when an output is interpolated into a
    /// command template.
    #[must_use]
    pub fn stdout_line(&self) -> &str {
        self.stdout.strip_suffix('\n').unwrap_or(&self.stdout)
    }
}

impl fmt::Display for ProcessOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(stdout: &str) -> ProcessOutput {
        ProcessOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            combined: stdout.to_string(),
            status: ProcessStatus::exited(0),
            retries: 0,
        }
    }

    #[test]
    fn test_signaled_status_code() {
        let status = ProcessStatus::signaled(9);
        assert_eq!(status.code, 137);
        assert!(!status.success);
        assert_eq!(status.signal, Some(9));
    }

    #[test]
    fn test_exited_status() {
        assert!(ProcessStatus::exited(0).success);
        assert!(!ProcessStatus::exited(3).success);
        assert_eq!(ProcessStatus::exited(3).signal, None);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(
            ProcessStatus::exited(127).to_string(),
            "exit code 127 (Command not found)"
        );
        assert!(ProcessStatus::signaled(9).to_string().starts_with("terminated by SIGKILL"));
    }

    #[test]
    fn test_stdout_line_strips_one_newline() {
        assert_eq!(output("foo\n").stdout_line(), "foo");
        assert_eq!(output("foo\n\n").stdout_line(), "foo\n");
        assert_eq!(output("foo").stdout_line(), "foo");
    }

    #[test]
    fn test_display_is_combined() {
        let mut out = output("a\n");
        out.combined = "a\nb\n".to_string();
        assert_eq!(out.to_string(), "a\nb\n");
    }

    #[test]
    fn test_serializes_to_json() {
        let json = serde_json::to_value(output("hi\n")).unwrap();
        assert_eq!(json["stdout"], "hi\n");
        assert_eq!(json["status"]["code"], 0);
        assert_eq!(json["status"]["success"], true);
        assert!(json["status"]["signal"].is_null());
        assert_eq!(json["retries"], 0);
    }
}
