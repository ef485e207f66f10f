//! Materializes module bindings as symlinks inside a root's link directory.
//!
//! A module `name` lives at `<link_dir>/<name>`; namespaced names get their
//! intermediate directories created on demand and pruned again once empty.
//! Link targets are always relative to the link's own directory.

use crate::fs_utils::{self, normalize, relative_path, resolve_link_target};
use crate::store::{Admission, ModuleStore};
use async_trait::async_trait;
use modlink_core::config::EngineConfig;
use modlink_core::error::{ModlinkError, Result};
use modlink_core::types::ModuleName;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

pub struct FileLinker {
    root: PathBuf,
    link_dir: PathBuf,
}

impl FileLinker {
    pub fn new(root: &Path, config: &EngineConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            link_dir: root.join(&config.link_dir),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn link_dir(&self) -> &Path {
        &self.link_dir
    }

    pub fn link_path(&self, name: &ModuleName) -> PathBuf {
        name.link_path(&self.link_dir)
    }

    /// Target to store in the link for `name` so that it reaches `path`.
    pub fn link_target(&self, name: &ModuleName, path: &Path) -> PathBuf {
        let link = self.link_path(name);
        let link_parent = link.parent().unwrap_or(self.link_dir.as_path());
        relative_path(link_parent, &self.absolutize(path))
    }

    /// Absolute file the existing link for `name` points at, if it is a symlink.
    pub async fn current_target(&self, name: &ModuleName) -> Option<PathBuf> {
        let link = self.link_path(name);
        fs_utils::read_symlink_target(&link)
            .await
            .map(|target| resolve_link_target(&link, &target))
    }

    /// Check whether a link for `name` to `path` can be created.
    ///
    /// Refuses when the slot holds real content, when a symlink there points
    /// elsewhere, or when a namespace segment exists as a non-directory.
    pub async fn can_add(&self, name: &ModuleName, path: &Path) -> Result<Admission> {
        let link = self.link_path(name);

        if let Ok(meta) = fs::symlink_metadata(&link).await {
            if !meta.file_type().is_symlink() {
                return Ok(refused(
                    name,
                    format!("{} already exists and is not a symlink", name),
                ));
            }

            let stored = fs::read_link(&link).await?;
            if resolve_link_target(&link, &stored) == self.absolutize(path) {
                return Ok(Admission::Present);
            }
            return Ok(refused(
                name,
                format!("{} is already linked to {}", name, stored.display()),
            ));
        }

        for dir in name.namespace_dirs() {
            let dir = self.link_dir.join(dir);
            if fs_utils::exists(&dir).await && !fs_utils::is_dir(&dir).await {
                return Ok(refused(
                    name,
                    format!("Some parts of {} already exist and are not directories", name),
                ));
            }
        }

        Ok(Admission::Vacant)
    }

    /// Create the link for `name`; a no-op if the correct link already exists.
    pub async fn add(&self, name: &ModuleName, path: &Path) -> Result<()> {
        match self.can_add(name, path).await? {
            Admission::Present => return Ok(()),
            Admission::Refused(err) => return Err(err),
            Admission::Vacant => {}
        }

        let link = self.link_path(name);
        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent).await?;
        }

        let target = self.link_target(name, path);
        fs_utils::link_file(&target, &link).await?;

        info!("Linked {} -> {}", link.display(), target.display());
        Ok(())
    }

    /// Whether the slot for `name` is empty or holds a symlink.
    pub async fn can_remove(&self, name: &ModuleName) -> bool {
        let link = self.link_path(name);
        !fs_utils::exists(&link).await || fs_utils::is_symlink(&link).await
    }

    /// Delete the link for `name` and prune namespace directories left empty.
    pub async fn remove_module(&self, name: &ModuleName) -> Result<()> {
        let link = self.link_path(name);
        if !self.can_remove(name).await {
            return Err(ModlinkError::NotASymlink(link));
        }

        if !fs_utils::exists(&link).await {
            return Ok(());
        }

        fs::remove_file(&link).await?;
        info!("Unlinked {}", link.display());

        for dir in name.namespace_dirs().iter().rev() {
            let dir = self.link_dir.join(dir);
            match fs_utils::dir_is_empty(&dir).await {
                Ok(true) => {
                    fs::remove_dir(&dir).await?;
                    debug!("Removed empty namespace directory {}", dir.display());
                }
                _ => break,
            }
        }

        Ok(())
    }

    /// Symlinks directly inside the link directory, as module names.
    pub async fn list_links(&self) -> Result<Vec<ModuleName>> {
        let mut entries = match fs::read_dir(&self.link_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let is_symlink = entry
                .file_type()
                .await
                .map(|ft| ft.is_symlink())
                .unwrap_or(false);
            if !is_symlink {
                continue;
            }
            if let Some(name) = entry
                .file_name()
                .to_str()
                .and_then(|s| ModuleName::new(s).ok())
            {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }

    fn absolutize(&self, path: &Path) -> PathBuf {
        normalize(&self.root.join(path))
    }
}

fn refused(name: &ModuleName, reason: String) -> Admission {
    Admission::Refused(ModlinkError::link_conflict(name.as_str(), reason))
}

#[async_trait]
impl ModuleStore for FileLinker {
    fn label(&self) -> &'static str {
        "file linker"
    }

    async fn can_add(&self, name: &ModuleName, path: &Path) -> Result<Admission> {
        FileLinker::can_add(self, name, path).await
    }

    async fn add(&self, name: &ModuleName, path: &Path) -> Result<()> {
        FileLinker::add(self, name, path).await
    }

    async fn can_remove(&self, name: &ModuleName) -> Result<bool> {
        Ok(FileLinker::can_remove(self, name).await)
    }

    async fn remove_module(&self, name: &ModuleName) -> Result<()> {
        FileLinker::remove_module(self, name).await
    }
}
