//! Process execution and stream composition for dzx
//!
//! A [`Shell`] turns command strings into lazy [`ProcessHandle`]s. A handle
//! spawns `<shell> -c "<prefix> <command>"` the first time it is awaited,
//! read, or piped, and exposes its output as single-consumer
//! [`ChannelView`]s (stdout, stderr, and the interleaved combined channel).
//! Handles can be retried, time-limited, killed, and chained into pipelines
//! whose completion is the completion of every stage.
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), dzx_runner::RunError> {
//! use dzx_runner::{Shell, cmd};
//!
//! let shell = Shell::default();
//! let name = shell.spawn("git config user.name").output().await?;
//! let greeting = shell.spawn(cmd!("echo hello {}", &name)?).output().await?;
//! assert!(greeting.stdout.starts_with("hello"));
//! # Ok(())
//! # }
//! ```

#[cfg(not(unix))]
compile_error!("dzx-runner requires a Unix platform");

mod buffer;
pub mod command;
mod driver;
pub mod error;
pub mod output;
pub mod pipe;
mod policy;
mod process;
mod shell;
mod signal;
mod stdin;
pub mod view;

pub use command::{Arg, Command};
pub use error::{FailureKind, ProcessError, RunError};
pub use output::{ProcessOutput, ProcessStatus};
pub use pipe::{PipeSource, PipeTarget, PipeThrough, Sink, Transform};
pub use policy::RetryPolicy;
pub use process::{Lifecycle, ProcessHandle};
pub use shell::Shell;
pub use signal::{Signal, signal_name};
pub use stdin::StdinWriter;
pub use view::{Channel, ChannelView, LineReader, LockState};
