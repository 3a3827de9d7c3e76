//! Kiln command-line host
//!
//! Runs one compiled unit and exits with the host's status. Without a unit
//! path the built-in `examples/test_fib.js` demo runs.
//!
//! Environment:
//! - `KILN_CONFIG`: TOML configuration file
//! - `KILN_LOG`: log filter, overriding `logging.level`

use anyhow::Context;
use clap::Parser;
use kiln_runtime::config::CONFIG_ENV;
use kiln_runtime::{demo, logging, FileSource, Host, HostConfig};
use std::path::PathBuf;

/// Exit status when the host cannot even start
const STARTUP_FAILURE: i32 = 3;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Run a compiled Kiln unit", long_about = None)]
#[command(version)]
struct Cli {
    /// Compiled unit to run
    unit: Option<PathBuf>,

    /// Arguments exposed to the unit as `scriptArgs`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = HostConfig::from_env()
        .with_context(|| format!("loading configuration named by {}", CONFIG_ENV))?;
    logging::init(&config.logging.level);

    let host = Host::new(config);
    let outcome = match &cli.unit {
        Some(path) => host.run(&FileSource::new(path), &cli.args),
        None => {
            let source = demo::embedded().context("building the embedded demo unit")?;
            host.run(&source, &cli.args)
        }
    };

    if let Some(err) = &outcome.error {
        eprintln!("error: {}", err);
    }
    Ok(outcome.status)
}

fn main() {
    let cli = Cli::parse();
    let status = match run(cli) {
        Ok(status) => status,
        Err(err) => {
            eprintln!("error: {:#}", err);
            STARTUP_FAILURE
        }
    };
    std::process::exit(status);
}
