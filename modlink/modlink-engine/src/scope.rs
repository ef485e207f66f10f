//! One module map, one linker and one operation lock per project root.
//!
//! All reconciliations in a process obtain their scopes from a shared
//! `ScopeRegistry`, so work against the same root is serialized through the
//! scope lock while unrelated roots proceed concurrently.

use crate::fs_utils::{self, normalize};
use crate::linker::FileLinker;
use crate::module_map::ModuleMap;
use dashmap::DashMap;
use modlink_core::config::EngineConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

pub struct ProjectScope {
    root: PathBuf,
    pub map: ModuleMap,
    pub linker: FileLinker,
    lock: Mutex<()>,
}

impl ProjectScope {
    pub fn new(root: &Path, config: &EngineConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            map: ModuleMap::new(root, config),
            linker: FileLinker::new(root, config),
            lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Serialize a unit of work against this root.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    /// Whether modlink has ever touched this root.
    pub async fn is_materialized(&self) -> bool {
        fs_utils::is_dir(self.linker.link_dir()).await || self.map.is_present().await
    }
}

pub struct ScopeRegistry {
    config: Arc<EngineConfig>,
    scopes: DashMap<PathBuf, Arc<ProjectScope>>,
}

impl ScopeRegistry {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self {
            config,
            scopes: DashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The shared scope for `root`, created on first use.
    pub fn scope(&self, root: &Path) -> Arc<ProjectScope> {
        let root = normalize(root);
        self.scopes
            .entry(root.clone())
            .or_insert_with(|| Arc::new(ProjectScope::new(&root, &self.config)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_registry_shares_scopes_per_root() {
        let registry = ScopeRegistry::new(Arc::new(EngineConfig::default()));
        let first = registry.scope(Path::new("/p"));
        let second = registry.scope(Path::new("/p/sub/.."));
        let other = registry.scope(Path::new("/q"));

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_is_materialized() {
        let temp_dir = TempDir::new().unwrap();
        let scope = ProjectScope::new(temp_dir.path(), &EngineConfig::default());
        assert!(!scope.is_materialized().await);

        tokio::fs::create_dir(temp_dir.path().join("node_modules"))
            .await
            .unwrap();
        assert!(scope.is_materialized().await);
    }
}
