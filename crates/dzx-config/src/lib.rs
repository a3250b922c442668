//! Configuration management for dzx
//!
//! This crate provides the settings consulted at spawn time (shell, prefix,
//! stdio modes, verbosity, throw mode) with discovery and precedence:
//! programmatic > env > file > defaults. The optional TOML file holds a single
//! `[shell]` table whose keys match the [`Config`] field names.

mod builder;
mod discovery;
pub mod error;
mod model;
mod shared;
mod sources;
mod validation;

pub use builder::ConfigBuilder;
pub use discovery::CONFIG_ENV;
pub use error::ConfigError;
pub use model::*;
pub use shared::SharedConfig;
