//! bisync CLI
//!
//! Runs one reconciliation of a pair of local directory trees and prints
//! what it did.

mod cli;
mod error;
mod output;

use std::path::Path;

use bisync_core::{Bisync, RunReport};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use error::{CliError, Result};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(report) => {
            if let Err(e) = output::print_report(&report, cli.json) {
                output::print_error(&e);
                std::process::exit(1);
            }
            if !report.success {
                std::process::exit(1);
            }
        }
        Err(e) => {
            output::print_error(&e);
            std::process::exit(1);
        }
    }
}

/// Logs go to stderr; `RUST_LOG` overrides the verbosity flag.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose > 1)
        .try_init();
}

fn run(cli: &Cli) -> Result<RunReport> {
    let options = cli.options()?;
    if same_tree(&cli.path1, &cli.path2) {
        return Err(CliError::user("path1 and path2 must be different directories"));
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let report = runtime.block_on(async {
        let bisync = Bisync::local(&cli.path1, &cli.path2, options)?;

        let token = bisync.cancellation_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing in-flight operations");
                token.cancel();
            }
        });

        let report = bisync.run().await?;
        Ok::<_, CliError>(report)
    })?;
    Ok(report)
}

fn same_tree(a: &str, b: &str) -> bool {
    match (Path::new(a).canonicalize(), Path::new(b).canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
