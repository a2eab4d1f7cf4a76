//! Tooling & Integration Layer
//!
//! Command-line access to the core for operators and scripts.

pub mod cli;

pub use cli::{Cli, CliContext, Commands};
