//! Identity questions about a single file: can it be processed, what name does
//! it declare, and which roots own it.
//!
//! A `FileDescriptor` lives for one reconciliation of one file. Metadata, file
//! contents and root lookups are each fetched at most once per instance.

use crate::fs_utils;
use crate::marker::DeclarationMarker;
use crate::scope::{ProjectScope, ScopeRegistry};
use modlink_core::config::EngineConfig;
use modlink_core::error::{ModlinkError, Result};
use modlink_core::types::ModuleName;
use serde_json::Value;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

pub struct FileDescriptor<'a> {
    path: PathBuf,
    config: &'a EngineConfig,
    marker: &'a DeclarationMarker,
    stats: OnceCell<Metadata>,
    declared: OnceCell<Option<ModuleName>>,
    project_root: OnceCell<Option<PathBuf>>,
    workspace_root: OnceCell<Option<PathBuf>>,
}

impl<'a> FileDescriptor<'a> {
    pub fn new(path: &Path, config: &'a EngineConfig, marker: &'a DeclarationMarker) -> Self {
        Self {
            path: fs_utils::normalize(path),
            config,
            marker,
            stats: OnceCell::new(),
            declared: OnceCell::new(),
            project_root: OnceCell::new(),
            workspace_root: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn stats(&self) -> std::io::Result<&Metadata> {
        self.stats
            .get_or_try_init(|| fs::symlink_metadata(&self.path))
            .await
    }

    pub async fn exists(&self) -> bool {
        self.stats().await.is_ok()
    }

    /// `true` for a regular file, `false` for a symlink (skipped to avoid
    /// link-on-link cycles).
    ///
    /// # Errors
    ///
    /// `NotAFile` for directories and other special entries; IO errors if the
    /// path cannot be inspected at all.
    pub async fn can_process(&self) -> Result<bool> {
        let stats = self.stats().await?;
        if stats.file_type().is_symlink() {
            return Ok(false);
        }
        if !stats.is_file() {
            return Err(ModlinkError::NotAFile(self.path.clone()));
        }
        Ok(true)
    }

    /// Nearest ancestor holding the descriptor file or an existing link directory.
    pub async fn resolve_project_root(&self) -> Option<PathBuf> {
        self.project_root
            .get_or_init(|| async {
                for dir in self.path.ancestors().skip(1) {
                    if fs_utils::exists(&dir.join(&self.config.descriptor_file)).await
                        || fs_utils::is_dir(&dir.join(&self.config.link_dir)).await
                    {
                        debug!("Project root for {} is {}", self.path.display(), dir.display());
                        return Some(dir.to_path_buf());
                    }
                }
                None
            })
            .await
            .clone()
    }

    /// Nearest ancestor whose descriptor marks itself private and multi-package.
    pub async fn resolve_workspace_root(&self) -> Option<PathBuf> {
        self.workspace_root
            .get_or_init(|| async {
                for dir in self.path.ancestors().skip(1) {
                    let descriptor = dir.join(&self.config.descriptor_file);
                    let Ok(content) = fs::read_to_string(&descriptor).await else {
                        continue;
                    };
                    if is_workspace_descriptor(&content) {
                        debug!("Workspace root for {} is {}", self.path.display(), dir.display());
                        return Some(dir.to_path_buf());
                    }
                }
                None
            })
            .await
            .clone()
    }

    /// The module name declared by the file, if any.
    ///
    /// Unreadable files and invalid tokens resolve to `None`.
    pub async fn resolve_declared_name(&self) -> Option<ModuleName> {
        self.declared
            .get_or_init(|| async {
                let bytes = match fs::read(&self.path).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        debug!("Could not read {}: {}", self.path.display(), e);
                        return None;
                    }
                };
                let contents = String::from_utf8_lossy(&bytes);
                let token = self.marker.find(&contents)?;

                match ModuleName::new(token) {
                    Ok(name) => Some(name),
                    Err(e) => {
                        warn!("Ignoring declaration in {}: {}", self.path.display(), e);
                        None
                    }
                }
            })
            .await
            .clone()
    }

    /// Project root of the file, creating its link directory if absent.
    ///
    /// # Errors
    ///
    /// `NoProjectRoot` if no enclosing root exists.
    pub async fn ensure_link_dir(&self) -> Result<PathBuf> {
        let root = self
            .resolve_project_root()
            .await
            .ok_or_else(|| ModlinkError::NoProjectRoot(self.path.clone()))?;

        let link_dir = root.join(&self.config.link_dir);
        if !fs_utils::exists(&link_dir).await {
            debug!("Creating link directory {}", link_dir.display());
            fs::create_dir_all(&link_dir).await?;
        }
        Ok(root)
    }

    /// Every root owning the file: the project root and, if different, the workspace root.
    pub async fn owning_roots(&self) -> Vec<PathBuf> {
        let mut roots = Vec::with_capacity(2);
        if let Some(workspace) = self.resolve_workspace_root().await {
            roots.push(workspace);
        }
        if let Some(project) = self.resolve_project_root().await {
            if !roots.contains(&project) {
                roots.push(project);
            }
        }
        roots
    }

    /// Shared scopes (module map and linker) for every owning root.
    pub async fn resolve_owning_module_maps(
        &self,
        registry: &ScopeRegistry,
    ) -> Vec<Arc<ProjectScope>> {
        self.owning_roots()
            .await
            .iter()
            .map(|root| registry.scope(root))
            .collect()
    }
}

fn is_workspace_descriptor(content: &str) -> bool {
    let Ok(descriptor) = serde_json::from_str::<Value>(content) else {
        return false;
    };

    let private = descriptor.get("private").and_then(Value::as_bool) == Some(true);
    let multi_package = match descriptor.get("workspaces") {
        Some(Value::Array(packages)) => !packages.is_empty(),
        Some(Value::Object(config)) => config
            .get("packages")
            .and_then(Value::as_array)
            .is_some_and(|packages| !packages.is_empty()),
        _ => false,
    };

    private && multi_package
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        temp_dir: TempDir,
        config: EngineConfig,
        marker: DeclarationMarker,
    }

    impl Fixture {
        fn new() -> Self {
            let config = EngineConfig::default();
            let marker = DeclarationMarker::new(&config.marker).unwrap();
            Self {
                temp_dir: TempDir::new().unwrap(),
                config,
                marker,
            }
        }

        fn path(&self, relative: &str) -> PathBuf {
            self.temp_dir.path().join(relative)
        }

        async fn write(&self, relative: &str, contents: &str) -> PathBuf {
            let path = self.path(relative);
            fs::create_dir_all(path.parent().unwrap()).await.unwrap();
            fs::write(&path, contents).await.unwrap();
            path
        }

        fn descriptor(&self, path: &Path) -> FileDescriptor<'_> {
            FileDescriptor::new(path, &self.config, &self.marker)
        }
    }

    #[tokio::test]
    async fn test_declared_name() {
        let fx = Fixture::new();
        let file = fx.write("a.js", "// @providesModule foo\nmodule.exports = 1;\n").await;
        assert_eq!(
            fx.descriptor(&file).resolve_declared_name().await,
            Some(ModuleName::new("foo").unwrap())
        );

        let plain = fx.write("b.js", "module.exports = 2;\n").await;
        assert_eq!(fx.descriptor(&plain).resolve_declared_name().await, None);

        let missing = fx.path("missing.js");
        assert_eq!(fx.descriptor(&missing).resolve_declared_name().await, None);
    }

    #[tokio::test]
    async fn test_invalid_declared_name_is_ignored() {
        let fx = Fixture::new();
        let file = fx.write("a.js", "// @providesModule ../escape\n").await;
        assert_eq!(fx.descriptor(&file).resolve_declared_name().await, None);
    }

    #[tokio::test]
    async fn test_can_process() {
        let fx = Fixture::new();
        let file = fx.write("a.js", "").await;
        assert!(fx.descriptor(&file).can_process().await.unwrap());

        let dir = fx.path("dir");
        fs::create_dir(&dir).await.unwrap();
        assert!(matches!(
            fx.descriptor(&dir).can_process().await,
            Err(ModlinkError::NotAFile(_))
        ));

        #[cfg(unix)]
        {
            let link = fx.path("link.js");
            fs::symlink("a.js", &link).await.unwrap();
            assert!(!fx.descriptor(&link).can_process().await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_project_root_is_nearest_descriptor() {
        let fx = Fixture::new();
        fx.write("package.json", "{}").await;
        fx.write("nested/package.json", "{}").await;
        let file = fx.write("nested/src/a.js", "").await;

        assert_eq!(
            fx.descriptor(&file).resolve_project_root().await,
            Some(fx.path("nested"))
        );
    }

    #[tokio::test]
    async fn test_existing_link_dir_marks_project_root() {
        let fx = Fixture::new();
        fs::create_dir_all(fx.path("app/node_modules")).await.unwrap();
        let file = fx.write("app/src/a.js", "").await;

        assert_eq!(
            fx.descriptor(&file).resolve_project_root().await,
            Some(fx.path("app"))
        );
    }

    #[tokio::test]
    async fn test_workspace_root_requires_private_multi_package() {
        let fx = Fixture::new();
        fx.write(
            "package.json",
            r#"{ "private": true, "workspaces": ["packages/*"] }"#,
        )
        .await;
        fx.write("packages/p/package.json", r#"{ "name": "p" }"#).await;
        let file = fx.write("packages/p/src/a.js", "").await;

        let descriptor = fx.descriptor(&file);
        assert_eq!(
            descriptor.resolve_workspace_root().await,
            Some(fx.temp_dir.path().to_path_buf())
        );
        assert_eq!(
            descriptor.owning_roots().await,
            vec![fx.temp_dir.path().to_path_buf(), fx.path("packages/p")]
        );
    }

    #[tokio::test]
    async fn test_malformed_descriptor_is_not_a_workspace() {
        let fx = Fixture::new();
        fx.write("package.json", "{ private: true").await;
        let file = fx.write("a.js", "").await;

        let descriptor = fx.descriptor(&file);
        assert_eq!(descriptor.resolve_workspace_root().await, None);
        assert_eq!(
            descriptor.resolve_project_root().await,
            Some(fx.temp_dir.path().to_path_buf())
        );
    }

    #[test]
    fn test_is_workspace_descriptor() {
        assert!(is_workspace_descriptor(r#"{"private": true, "workspaces": ["a"]}"#));
        assert!(is_workspace_descriptor(
            r#"{"private": true, "workspaces": {"packages": ["a"]}}"#
        ));
        assert!(!is_workspace_descriptor(r#"{"workspaces": ["a"]}"#));
        assert!(!is_workspace_descriptor(r#"{"private": true}"#));
        assert!(!is_workspace_descriptor("not json"));
    }

    #[tokio::test]
    async fn test_ensure_link_dir_creates_directory() {
        let fx = Fixture::new();
        fx.write("package.json", "{}").await;
        let file = fx.write("a.js", "").await;

        let root = fx.descriptor(&file).ensure_link_dir().await.unwrap();
        assert_eq!(root, fx.temp_dir.path().to_path_buf());
        assert!(fs_utils::is_dir(&fx.path("node_modules")).await);
    }
}
