//! CLI definition using clap.
//!
//! One invocation is one run; `--x-test-post` publishes a test post instead.

use clap::Parser;
use std::path::PathBuf;

/// Text used when `--x-test-post` is given without a value.
pub const DEFAULT_TEST_POST: &str = "scoutr connectivity check";

/// Scoutr - a budget-limited outreach worker
#[derive(Parser, Debug)]
#[command(name = "scoutr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose output (also logs to stderr)
    #[arg(short, long)]
    pub verbose: bool,

    /// Read and score as usual, but send nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Publish a test post and exit
    #[arg(long = "x-test-post", value_name = "TEXT", num_args = 0..=1, default_missing_value = DEFAULT_TEST_POST)]
    pub test_post: Option<String>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}
