//! Rendering of run reports

use bisync_core::RunReport;
use colored::Colorize;

use crate::error::{CliError, Result};

/// Print a report as colored text or JSON.
pub fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for line in &report.output {
        match line.strip_prefix("  ") {
            Some(op) => println!("   {} {}", "->".cyan(), op),
            None => println!("{} {}", "=>".blue().bold(), line),
        }
    }
    for failure in &report.failures {
        println!("   {} {}", "FAILED".red().bold(), failure);
    }

    if report.success {
        println!("{} {}", "OK".green().bold(), report.summary());
    } else if let Some(reason) = &report.aborted {
        println!("{} {}", "ABORTED".yellow().bold(), reason);
    } else {
        println!("{} {}", "INCOMPLETE".yellow().bold(), report.summary());
    }
    Ok(())
}

/// Print an error and its detail lines to stderr.
pub fn print_error(error: &CliError) {
    eprintln!("{}: {}", "error".red().bold(), error);
    for detail in error.details() {
        eprintln!("   {}", detail);
    }
}
