//! bluescan CLI library
//!
//! Argument parsing, layered configuration and the command dispatcher behind the
//! `bluescan` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::{Cli, Commands};
pub use commands::CommandDispatcher;
pub use config::{AppConfig, ConfigError, ConfigOverrides};
pub use error::{CliError, Result};
