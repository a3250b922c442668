//! Exit code constants and human-readable descriptions for shell statuses.
//!
//! Shells follow the `128 + n` convention for children terminated by signal
//! `n`, so the table below covers both ordinary failures and the common POSIX
//! signals.
//!
//! # Exit Code Table
//!
//! | Code | Description |
//! |------|-------------|
//! | 2 | Misuse of shell builtins |
//! | 126 | Invoked command not executable |
//! | 127 | Command not found |
//! | 128 | Invalid exit argument |
//! | 129..=159 | Terminated by signal `code - 128` |

/// Exit status of a finished command.
///
/// A thin wrapper over the raw code so that callers can name the well-known
/// values instead of scattering integers around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Command completed successfully
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// General failure, also used when no code could be produced
    pub const FAILURE: ExitCode = ExitCode(1);

    /// Misuse of shell builtins
    pub const MISUSE: ExitCode = ExitCode(2);

    /// The command was found but could not be executed
    pub const NOT_EXECUTABLE: ExitCode = ExitCode(126);

    /// The command was not found
    pub const NOT_FOUND: ExitCode = ExitCode(127);

    /// Base added to a signal number when a child is terminated by signal
    pub const SIGNAL_BASE: i32 = 128;

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }

    /// Exit code a shell reports for a child killed by `signal`.
    #[must_use]
    pub const fn from_signal(signal: i32) -> Self {
        ExitCode(Self::SIGNAL_BASE + signal)
    }

    /// Signal number encoded in this code, if it is in the signal range.
    #[must_use]
    pub const fn signal(self) -> Option<i32> {
        if self.0 > Self::SIGNAL_BASE && self.0 < Self::SIGNAL_BASE + 32 {
            Some(self.0 - Self::SIGNAL_BASE)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Human-readable description for well-known codes.
    #[must_use]
    pub fn description(self) -> Option<&'static str> {
        describe_exit_code(self.0)
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.description() {
            Some(description) => write!(f, "{} ({description})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Describe a shell exit code, if it has a conventional meaning.
#[must_use]
pub fn describe_exit_code(code: i32) -> Option<&'static str> {
    let description = match code {
        2 => "Misuse of shell builtins",
        126 => "Invoked command not executable",
        127 => "Command not found",
        128 => "Invalid exit argument",
        // SIGHUP
        129 => "Hangup",
        // SIGINT
        130 => "Interrupt (Ctrl + C)",
        // SIGQUIT
        131 => "Quit and dump core",
        // SIGILL
        132 => "Illegal instruction",
        // SIGTRAP
        133 => "Trace/breakpoint trap",
        // SIGABRT
        134 => "Process aborted",
        135 => "Bus error: \"access to undefined portion of memory object\"",
        // SIGFPE
        136 => "Floating point exception: \"erroneous arithmetic operation\"",
        // SIGKILL
        137 => "Kill (terminate immediately)",
        // SIGBUS
        138 => "Bus error (bad memory access)",
        // SIGSEGV
        139 => "Segmentation violation",
        140 => "Bad system call (SVr4)",
        // SIGPIPE
        141 => "Write to pipe with no one reading",
        // SIGALRM
        142 => "Signal raised by alarm",
        // SIGTERM
        143 => "Termination (request to terminate)",
        145 => "Child process terminated, stopped (or continued*)",
        146 => "Continue if stopped",
        147 => "Stop executing temporarily",
        148 => "Terminal stop signal",
        149 => "Background process attempting to read from tty (\"in\")",
        150 => "Background process attempting to write to tty (\"out\")",
        151 => "Urgent data available on socket",
        152 => "CPU time limit exceeded",
        153 => "File size limit exceeded",
        154 => "Signal raised by timer counting virtual time: \"virtual timer expired\"",
        155 => "Profiling timer expired",
        157 => "Pollable event",
        158 => "User-defined 1",
        159 => "User-defined 2",
        _ => return None,
    };
    Some(description)
}
