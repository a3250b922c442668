//! Command-line interface for dzx
//!
//! ## Module Structure
//!
//! - `args`: CLI argument definitions (clap)
//! - `run`: entry point, configuration layering, and command dispatch

pub mod args;
mod run;

pub use args::{Cli, Commands, RunArgs};
pub use run::run;
