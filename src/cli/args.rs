//! CLI argument definitions

use clap::{ArgAction, Args, Parser, Subcommand};

/// dzx - run shell commands with streamed output, retries, and pipelines
#[derive(Parser, Debug)]
#[command(name = "dzx")]
#[command(about = "Run shell commands with streamed output, retries, and pipelines")]
#[command(long_about = r#"
dzx runs each command as `<shell> -c "<prefix> <command>"` in its own process
group and reports its output, exit status, and retry count.

EXAMPLES:
  # Run a command and print what it wrote
  dzx run -- 'echo hello; echo oops >&2'

  # Retry a flaky command three times, 200ms apart
  dzx run --retry 3 --delay 200 -- ./flaky.sh

  # Build a pipeline: each --pipe stage reads the previous stage's stdout
  dzx run --pipe 'sort' --pipe 'uniq -c' -- 'cat words.txt'

  # Emit the result as JSON, never failing on a non-zero exit
  dzx run --json --no-throw -- 'exit 3'

  # Show the effective configuration and where each value came from
  dzx config

CONFIGURATION:
  Precedence: CLI flags > DZX_* environment variables > config file > defaults
  The config file is DZX_CONFIG if set, otherwise the nearest .dzx/config.toml
"#)]
#[command(version)]
pub struct Cli {
    /// Increase verbosity (-v echoes commands, -vv also output, -vvv diagnostics)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Silence command echo (verbosity 0)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a command, optionally piped through further stages
    Run(RunArgs),

    /// Print the effective configuration with source attribution
    Config {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Shell executable used for every stage
    #[arg(long)]
    pub shell: Option<String>,

    /// Preamble prepended to every stage (use "" for none)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Report a failing command as a result instead of an error
    #[arg(long)]
    pub no_throw: bool,

    /// Retry a failed first stage up to N times
    #[arg(long, value_name = "N")]
    pub retry: Option<u32>,

    /// Wait this many milliseconds between retries
    #[arg(long, value_name = "MS", requires = "retry")]
    pub delay: Option<u64>,

    /// Terminate each attempt after this many milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout: Option<u64>,

    /// Pipe stdout into another command; repeatable
    #[arg(long = "pipe", value_name = "COMMAND")]
    pub pipes: Vec<String>,

    /// Print the result as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// The command to run; words are joined with spaces
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl Cli {
    /// Verbosity requested on the command line, if any.
    #[must_use]
    pub fn verbosity(&self) -> Option<u8> {
        if self.quiet {
            Some(0)
        } else if self.verbose > 0 {
            Some(self.verbose)
        } else {
            None
        }
    }
}

impl RunArgs {
    /// Command line for the first stage.
    #[must_use]
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}
