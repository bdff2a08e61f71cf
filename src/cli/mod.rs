//! CLI command handling
//!
//! Dispatches CLI commands and maps results to process exit codes.

use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::paths::{find_crashfile, CRASHFILE_NAMES};
use crate::common::{Error, Result};
use crate::runtime::Level;
use crate::testing::{self, TestOptions};

/// Every plan passed
pub const EXIT_PASS: i32 = 0;
/// A check or step failed
pub const EXIT_FAILURE: i32 = 2;

/// Dispatch a CLI command, returning the exit code
pub async fn dispatch(command: Commands) -> Result<i32> {
    let config = Config::load()?;

    match command {
        Commands::Test {
            file,
            json,
            no_color,
            quiet,
            verbose,
            vars,
        } => {
            let level = if quiet {
                Level::Off
            } else {
                config.output.level.parse::<Level>()?.raised(verbose)
            };
            let opts = TestOptions {
                file: resolve_crashfile(file)?,
                vars,
                json: json || config.output.json,
                color: config.output.color && !no_color,
                level,
            };
            tracing::debug!(file = %opts.file.display(), ?level, "test");

            let passed = testing::run(&opts, &config).await?;
            Ok(if passed { EXIT_PASS } else { EXIT_FAILURE })
        }

        Commands::Validate { file } => {
            let path = resolve_crashfile(file)?;
            let plans = testing::validate(&path, &config)?;
            println!(
                "{} {} ({} {})",
                "✓".green(),
                path.display(),
                plans,
                if plans == 1 { "plan" } else { "plans" }
            );
            Ok(EXIT_PASS)
        }
    }
}

/// The given file, or the first Crashfile in the current directory
fn resolve_crashfile(file: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(file) = file {
        return Ok(file);
    }
    find_crashfile(Path::new(".")).ok_or_else(|| {
        Error::Config(format!(
            "no Crashfile found (looked for {})",
            CRASHFILE_NAMES.join(", ")
        ))
    })
}
