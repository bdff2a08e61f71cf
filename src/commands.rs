//! CLI command definitions
//!
//! Defines the clap commands for the crash CLI.

use clap::{ArgAction, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the test plans in a Crashfile
    Test {
        /// Crashfile to run (default: Crashfile, Crashfile.yml or Crashfile.yaml)
        #[arg(long, short)]
        file: Option<PathBuf>,

        /// Output results as JSON lines
        #[arg(long, short)]
        json: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// Print nothing; only the exit code reports the result
        #[arg(long, short, conflicts_with = "verbose")]
        quiet: bool,

        /// More output; repeat for passed checks, data and variables
        #[arg(long, short, action = ArgAction::Count)]
        verbose: u8,

        /// Set a variable (KEY=VALUE) or load variables from a YAML file
        /// Can be specified multiple times; later values win
        #[arg(long = "set", short = 's', value_name = "KEY=VALUE|FILE")]
        vars: Vec<String>,
    },

    /// Compile a Crashfile without running it
    Validate {
        /// Crashfile to check (default: Crashfile, Crashfile.yml or Crashfile.yaml)
        #[arg(long, short)]
        file: Option<PathBuf>,
    },
}
