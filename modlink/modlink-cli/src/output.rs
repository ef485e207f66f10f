//! Output formatting utilities for the modlink CLI.

use console::style;
use modlink_core::ErrorClass;
use modlink_engine::{FailureReport, Notifier};
use std::fmt::Display;

/// Print a success message
pub fn success(msg: impl Display) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Print an error message
pub fn error(msg: impl Display) {
    eprintln!("{} {}", style("✗").red().bold(), msg);
}

/// Print a warning message
pub fn warning(msg: impl Display) {
    eprintln!("{} {}", style("⚠").yellow().bold(), msg);
}

/// Print an info message
pub fn info(msg: impl Display) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}

/// Print a key-value pair
pub fn kv(key: impl Display, value: impl Display) {
    println!("  {}: {}", style(key).cyan(), value);
}

/// Reports reconciliation failures on the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, report: &FailureReport) {
        match report.class {
            ErrorClass::Domain => warning(report),
            ErrorClass::Fatal | ErrorClass::Unexpected => error(report),
        }
    }
}
