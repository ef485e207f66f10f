//! Library for the modlink CLI commands and terminal output.

pub mod commands;
pub mod output;

pub use output::ConsoleNotifier;
