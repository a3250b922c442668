//! dzx - spawn shell commands, stream their output, and compose pipelines
//!
//! dzx can be used in two ways:
//! - **CLI**: `dzx run -- <command>` runs one command (or a pipeline with
//!   `--pipe`) under the configured shell and reports its output
//! - **Library**: create a [`Shell`] and drive [`ProcessHandle`]s from async
//!   code
//!
//! # Quick Start (Library)
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), dzx::RunError> {
//! use dzx::{Shell, cmd};
//!
//! let shell = Shell::default();
//!
//! // Handles are lazy; awaiting starts them.
//! let branch = shell.spawn("git rev-parse --abbrev-ref HEAD").output().await?;
//!
//! // Interpolated values are shell-quoted.
//! let log = shell.spawn(cmd!("git log -1 --oneline {}", &branch)?);
//! let first = log.pipe("head -n 1")?.output().await?;
//! println!("{}", first.stdout);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! Settings are layered with precedence: programmatic > `DZX_*` environment
//! variables > `.dzx/config.toml` (or the file named by `DZX_CONFIG`) >
//! defaults. See [`Config`].

// ============================================================================
// Stable Public API
// ============================================================================

pub use dzx_runner::{
    Arg, Channel, ChannelView, Command, FailureKind, Lifecycle, LineReader, LockState,
    PipeSource, PipeTarget, PipeThrough, ProcessError, ProcessHandle, ProcessOutput,
    ProcessStatus, RetryPolicy, RunError, Shell, Signal, Sink, StdinWriter, Transform, cmd,
    signal_name,
};

pub use dzx_config::{
    CONFIG_ENV, Config, ConfigBuilder, ConfigError, ConfigOverrides, ConfigSource,
    SharedConfig, StdioMode, Verbosity,
};

pub use dzx_streams::{ChunkSplitter, DelimiterSplitter, LineSplitter};

pub use dzx_utils::{ErrorCategory, ExitCode, UserFriendlyError};

// ============================================================================
// Command-line interface
// ============================================================================

#[doc(hidden)]
pub mod cli;
