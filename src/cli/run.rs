//! CLI entry point and dispatch logic
//!
//! This module owns the `run()` function which:
//! - Parses CLI arguments
//! - Layers CLI flags over the discovered configuration
//! - Creates the tokio runtime
//! - Runs the requested command or pipeline and reports the result
//! - Handles all error output

use anyhow::{Context, Result};
use clap::Parser;
use dzx_utils::logging::{DIAGNOSTICS_LEVEL, init_tracing};
use dzx_utils::error::render_for_user;
use std::time::Duration;
use tracing::debug;

use super::args::{Cli, Commands, RunArgs};
use crate::{
    Config, ConfigError, ConfigOverrides, ConfigSource, ExitCode, ProcessHandle, ProcessOutput,
    RunError, Shell, Verbosity,
};

/// Main CLI execution function.
///
/// Handles ALL output including errors and returns the code the process
/// should exit with when it is not zero. main.rs only maps it to
/// `std::process::exit`.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();
    let verbosity = cli.verbosity();

    match cli.command {
        Commands::Run(args) => {
            let config = load_config(verbosity, Some(&args))?;
            install_logging(&config);
            run_command(config, &args)
        }
        Commands::Config { json } => {
            let config = load_config(verbosity, None)?;
            match render_config(&config, json) {
                Ok(rendered) => {
                    println!("{rendered}");
                    Ok(())
                }
                Err(e) => {
                    eprintln!("✗ {e:#}");
                    Err(ExitCode::FAILURE)
                }
            }
        }
    }
}

/// Discover configuration and layer CLI flags over it.
fn load_config(verbosity: Option<u8>, args: Option<&RunArgs>) -> Result<Config, ExitCode> {
    let config = Config::discover().and_then(|mut config| {
        let overrides = cli_overrides(verbosity, args)?;
        if !overrides.is_empty() {
            config.apply_overrides(&overrides, &ConfigSource::Programmatic);
            config.validate()?;
        }
        Ok(config)
    });

    config.map_err(|err| {
        eprintln!("{}", render_for_user(&err));
        ExitCode::MISUSE
    })
}

fn cli_overrides(
    verbosity: Option<u8>,
    args: Option<&RunArgs>,
) -> Result<ConfigOverrides, ConfigError> {
    let mut overrides = ConfigOverrides::default();
    if let Some(level) = verbosity {
        overrides.verbose = Some(Verbosity::new(level.min(DIAGNOSTICS_LEVEL))?);
    }
    if let Some(args) = args {
        overrides.shell.clone_from(&args.shell);
        overrides.prefix.clone_from(&args.prefix);
        if args.no_throw {
            overrides.throw_errors = Some(false);
        }
    }
    Ok(overrides)
}

fn install_logging(config: &Config) {
    if let Err(e) = init_tracing(config.verbose.level()) {
        eprintln!("warning: failed to initialize logging: {e}");
    }
}

fn run_command(config: Config, args: &RunArgs) -> Result<(), ExitCode> {
    let echoed = config.verbose.echo_output();
    let shell = Shell::new(config);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::FAILURE);
        }
    };

    match rt.block_on(execute(&shell, args)) {
        Ok(output) => {
            report_output(&output, args.json, echoed)?;
            if output.success() {
                Ok(())
            } else {
                Err(output.status.exit_code())
            }
        }
        Err(error) => {
            if args.json
                && let Some(process_error) = error.process_error()
            {
                report_output(process_error.output(), true, echoed)?;
                eprintln!("{error}");
            } else {
                eprintln!("{}", error.display_for_user());
            }
            Err(ExitCode::from_i32(error.exit_code()))
        }
    }
}

/// Build the pipeline described by `args` and wait for its last stage.
async fn execute(shell: &Shell, args: &RunArgs) -> Result<ProcessOutput, RunError> {
    let timeout = args.timeout.map(Duration::from_millis);

    let mut first = with_timeout(shell.spawn(args.command_line()), timeout);
    if let Some(retries) = args.retry {
        first = first.retry(retries);
    }
    if let Some(delay) = args.delay {
        first = first.delay(Duration::from_millis(delay));
    }

    debug!(stages = args.pipes.len() + 1, "Running command");

    let mut last = first;
    for stage in &args.pipes {
        let next = with_timeout(shell.spawn(stage.as_str()), timeout);
        last = last.pipe(next)?;
    }

    last.output().await
}

fn with_timeout(handle: ProcessHandle, timeout: Option<Duration>) -> ProcessHandle {
    match timeout {
        Some(timeout) => handle.timeout(timeout),
        None => handle,
    }
}

fn report_output(output: &ProcessOutput, json: bool, echoed: bool) -> Result<(), ExitCode> {
    if json {
        match serde_json::to_string_pretty(output) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => {
                eprintln!("✗ Failed to serialize output: {e}");
                return Err(ExitCode::FAILURE);
            }
        }
    } else if !echoed {
        print!("{}", output.stdout);
        eprint!("{}", output.stderr);
    }
    Ok(())
}

/// Render the effective configuration as `key = value (source)` lines or JSON.
fn render_config(config: &Config, json: bool) -> Result<String> {
    let effective = config.effective_config();
    if json {
        let entries: serde_json::Map<String, serde_json::Value> = effective
            .into_iter()
            .map(|(key, (value, source))| {
                (key, serde_json::json!({ "value": value, "source": source }))
            })
            .collect();
        return serde_json::to_string_pretty(&entries).context("Failed to serialize configuration");
    }

    let width = effective.keys().map(String::len).max().unwrap_or(0);
    Ok(effective
        .iter()
        .map(|(key, (value, source))| format!("{key:<width$} = {value:?} ({source})"))
        .collect::<Vec<_>>()
        .join("\n"))
}
