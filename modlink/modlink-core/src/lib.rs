//! Core types and abstractions for modlink.
//!
//! This crate provides the error taxonomy, configuration, and domain types
//! shared by the reconciliation engine and the command-line tool.

pub mod config;
pub mod error;
pub mod types;

pub use config::{EngineConfig, WatchConfig};
pub use error::{ErrorClass, ModlinkError, Result};
pub use types::{ChangeKind, FileChange, MODULE_SEPARATOR, ModuleName};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{EngineConfig, WatchConfig};
    pub use crate::error::{ErrorClass, ModlinkError, Result};
    pub use crate::types::{ChangeKind, FileChange, ModuleName};
}
