//! Rebuild every link of a project root from its persisted module map.
//!
//! All bindings are validated against the linker and against each other
//! before any link is created, so a single bad entry never leaves the root
//! half-linked.

use crate::linker::FileLinker;
use crate::module_map::ModuleMap;
use crate::store::Admission;
use modlink_core::config::EngineConfig;
use modlink_core::error::{ModlinkError, Result};
use modlink_core::types::{MODULE_SEPARATOR, ModuleName};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Outcome of a successful rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelinkReport {
    pub root: PathBuf,
    /// Links created by this run
    pub linked: Vec<ModuleName>,
    /// Links that were already correct
    pub unchanged: Vec<ModuleName>,
}

impl RelinkReport {
    pub fn total(&self) -> usize {
        self.linked.len() + self.unchanged.len()
    }
}

/// Replay every binding in `root`'s module map through the linker.
///
/// # Errors
///
/// `RelinkAborted` naming every conflicting binding if any fails validation;
/// no links are created in that case.
pub async fn relink(root: &Path, config: &EngineConfig) -> Result<RelinkReport> {
    let map = ModuleMap::new(root, config);
    let linker = FileLinker::new(root, config);
    let modules = map.list_modules().await?;

    let mut report = RelinkReport {
        root: root.to_path_buf(),
        ..Default::default()
    };
    let mut pending = Vec::with_capacity(modules.len());
    let mut conflicts = Vec::new();

    let names: BTreeSet<&str> = modules.keys().map(ModuleName::as_str).collect();

    for (name, recorded) in &modules {
        if let Some(namespace) = bound_namespace(name, &names) {
            let err = ModlinkError::link_conflict(
                name.as_str(),
                format!("its namespace {namespace} is bound as a module too"),
            );
            warn!("Cannot relink {}: {}", name, err);
            conflicts.push(err.to_string());
            continue;
        }

        let path = map.absolute_path_of(recorded);
        match linker.can_add(name, &path).await? {
            Admission::Vacant => pending.push((name, path)),
            Admission::Present => report.unchanged.push(name.clone()),
            Admission::Refused(err) => {
                warn!("Cannot relink {}: {}", name, err);
                conflicts.push(err.to_string());
            }
        }
    }

    if !conflicts.is_empty() {
        return Err(ModlinkError::RelinkAborted { conflicts });
    }

    for (name, path) in pending {
        linker.add(name, &path).await?;
        report.linked.push(name.clone());
    }

    info!(
        "Relinked {} module(s) in {} ({} already linked)",
        report.linked.len(),
        root.display(),
        report.unchanged.len()
    );
    Ok(report)
}

/// The longest enclosing namespace of `name` that is itself a bound name.
///
/// Such a pair can never be linked together: one needs the slot to be a
/// directory, the other a symlink.
fn bound_namespace<'a>(name: &ModuleName, names: &BTreeSet<&'a str>) -> Option<&'a str> {
    let name = name.as_str();
    name.rmatch_indices(MODULE_SEPARATOR)
        .find_map(|(idx, _)| names.get(&name[..idx]).copied())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::fs_utils;
    use tempfile::TempDir;
    use tokio::fs;

    async fn write_record(root: &Path, json: &str) {
        fs::write(root.join("module-map.json"), json).await.unwrap();
    }

    #[tokio::test]
    async fn test_relink_creates_every_link() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("lib")).await.unwrap();
        fs::write(root.join("a.js"), "").await.unwrap();
        fs::write(root.join("lib/b.js"), "").await.unwrap();
        write_record(root, r#"{ "foo": "a.js", "scope/bar": "lib/b.js" }"#).await;

        let report = relink(root, &EngineConfig::default()).await.unwrap();
        assert_eq!(report.linked.len(), 2);
        assert_eq!(
            fs::read_link(root.join("node_modules/foo")).await.unwrap(),
            PathBuf::from("../a.js")
        );
        assert_eq!(
            fs::read_link(root.join("node_modules/scope/bar")).await.unwrap(),
            PathBuf::from("../../lib/b.js")
        );

        let again = relink(root, &EngineConfig::default()).await.unwrap();
        assert!(again.linked.is_empty());
        assert_eq!(again.unchanged.len(), 2);
    }

    #[tokio::test]
    async fn test_conflict_aborts_before_linking() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.js"), "").await.unwrap();
        fs::write(root.join("b.js"), "").await.unwrap();
        fs::create_dir_all(root.join("node_modules/taken")).await.unwrap();
        write_record(root, r#"{ "free": "a.js", "taken": "b.js" }"#).await;

        let err = relink(root, &EngineConfig::default()).await.unwrap_err();
        match err {
            ModlinkError::RelinkAborted { conflicts } => {
                assert_eq!(conflicts.len(), 1);
                assert!(conflicts[0].contains("taken"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!fs_utils::exists(&root.join("node_modules/free")).await);
    }

    #[tokio::test]
    async fn test_missing_record_is_initialized() {
        let temp_dir = TempDir::new().unwrap();

        let report = relink(temp_dir.path(), &EngineConfig::default()).await.unwrap();
        assert_eq!(report.total(), 0);
        assert!(fs_utils::exists(&temp_dir.path().join("module-map.json")).await);
    }

    #[test]
    fn test_bound_namespace_finds_enclosing_name() {
        let names: BTreeSet<&str> = ["a", "a-x", "a/b", "c/d"].into_iter().collect();
        let name = |s: &str| ModuleName::new(s).unwrap();

        assert_eq!(bound_namespace(&name("a/b"), &names), Some("a"));
        assert_eq!(bound_namespace(&name("a/b/c"), &names), Some("a/b"));
        assert_eq!(bound_namespace(&name("a"), &names), None);
        assert_eq!(bound_namespace(&name("c/d"), &names), None);
    }
}
