//! Reconciliation engine for modlink.
//!
//! Source files claim a module name with a marker comment such as
//! `// @providesModule foo`. This crate keeps, per project root:
//! - a persisted module map (`module-map.json`) of name to relative file path
//! - one symlink per bound name inside the link directory (`node_modules/foo`)
//!
//! and brings both back in line with the files whenever a file is created,
//! modified or destroyed.
//!
//! # Architecture
//!
//! - `FileDescriptor`: identity of one file (declared name, owning roots)
//! - `ModuleMap`: the persisted record, with conflict detection and self-cleaning
//! - `FileLinker`: symlink materialization under the link directory
//! - `ModuleStore` / `commit_binding`: map and link committed as one unit with rollback
//! - `ScopeRegistry`: one map, linker and lock per root
//! - `Reconciler`: the per-event pipeline and the stale-link sweep
//! - `relink`: rebuild all links of a root from its record
//! - `FileWatcher`: debounced `notify` events as `FileChange` batches
//!
//! # Example
//!
//! ```no_run
//! use modlink_core::{EngineConfig, FileChange};
//! use modlink_engine::Reconciler;
//!
//! # async fn example() -> modlink_core::Result<()> {
//! let reconciler = Reconciler::new(EngineConfig::default())?;
//! let report = reconciler
//!     .handle(&FileChange::modified("/home/user/project/src/a.js"))
//!     .await?;
//! println!("declared {:?}, removed {:?}", report.declared, report.removed);
//! # Ok(())
//! # }
//! ```

pub mod builtins;
pub mod fs_utils;
pub mod linker;
pub mod marker;
pub mod module_map;
pub mod reconcile;
pub mod relink;
pub mod report;
pub mod resolver;
pub mod scope;
pub mod store;
pub mod watcher;

// Re-export main types
pub use builtins::ReservedNames;
pub use linker::FileLinker;
pub use marker::DeclarationMarker;
pub use module_map::ModuleMap;
pub use reconcile::{DispatchSummary, ReconcileReport, Reconciler};
pub use relink::{RelinkReport, relink};
pub use report::{FailureReport, LogNotifier, Notifier};
pub use resolver::FileDescriptor;
pub use scope::{ProjectScope, ScopeRegistry};
pub use store::{Admission, ModuleStore, commit_binding};
pub use watcher::{EventFilter, FileWatcher};

/// Prelude module with commonly used types.
pub mod prelude {
    pub use crate::reconcile::{DispatchSummary, ReconcileReport, Reconciler};
    pub use crate::relink::{RelinkReport, relink};
    pub use crate::report::{FailureReport, LogNotifier, Notifier};
    pub use crate::watcher::FileWatcher;
    pub use modlink_core::prelude::*;
}
