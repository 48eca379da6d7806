//! CLI module for scoutr - command-line flags for one worker invocation.

pub mod commands;

pub use commands::Cli;
