//! CLI module for Deckhand.
//!
//! This module provides the command-line interface for validating,
//! inspecting and running build and deploy plans.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, RunFlags, code_source};
pub use output::OutputFormatter;
