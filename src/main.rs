//! crash - declarative test plan runner
//!
//! Runs the plans of a YAML Crashfile: http and shell actions composed
//! serially or in parallel, verified with one-line check scripts.

use clap::Parser;
use crash::common::logging;
use crash::{cli, commands::Commands};

#[derive(Parser)]
#[command(name = "crash", about = "Declarative test plan runner")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    logging::init_cli();

    let cli = Cli::parse();

    match cli::dispatch(cli.command).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
