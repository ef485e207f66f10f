//! Domain types shared by the engine and the CLI.

use crate::error::{ModlinkError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Separator that marks a nested namespace inside a module name.
pub const MODULE_SEPARATOR: char = '/';

/// A logical module name declared by a source file.
///
/// Names are non-empty and may contain `/` to denote a nested namespace
/// (`scope/sub`). Every segment is a plain directory entry name, so a name can
/// never escape the link directory it is materialized in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleName(String);

impl ModuleName {
    /// Validate and wrap a module name.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && !name.contains(['\0', '\\'])
            && name
                .split(MODULE_SEPARATOR)
                .all(|segment| !segment.is_empty() && segment != "." && segment != "..");

        if valid {
            Ok(Self(name))
        } else {
            Err(ModlinkError::InvalidModuleName(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments of the name, outermost first.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(MODULE_SEPARATOR)
    }

    /// Whether the name lives inside a nested namespace.
    pub fn is_namespaced(&self) -> bool {
        self.0.contains(MODULE_SEPARATOR)
    }

    /// Namespace directories that must exist before the link itself, outermost first.
    ///
    /// For `a/b/c` this yields `a` and `a/b`.
    pub fn namespace_dirs(&self) -> Vec<PathBuf> {
        let segments: Vec<&str> = self.segments().collect();
        let mut dirs = Vec::with_capacity(segments.len().saturating_sub(1));
        let mut current = PathBuf::new();
        for segment in &segments[..segments.len() - 1] {
            current.push(segment);
            dirs.push(current.clone());
        }
        dirs
    }

    /// Location of this name under a link directory.
    pub fn link_path(&self, link_dir: &Path) -> PathBuf {
        let mut path = link_dir.to_path_buf();
        path.extend(self.segments());
        path
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ModuleName {
    type Error = ModlinkError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ModuleName {
    type Error = ModlinkError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ModuleName> for String {
    fn from(name: ModuleName) -> Self {
        name.0
    }
}

impl AsRef<str> for ModuleName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// What happened to a watched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Destroyed,
}

/// A single file-change signal for an absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileChange {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

impl FileChange {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ChangeKind::Created,
            path: path.into(),
        }
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ChangeKind::Modified,
            path: path.into(),
        }
    }

    pub fn destroyed(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ChangeKind::Destroyed,
            path: path.into(),
        }
    }

    /// Resolve a path reported relative to a watched root.
    pub fn relative_to(kind: ChangeKind, root: &Path, relative: &Path) -> Self {
        Self {
            kind,
            path: root.join(relative),
        }
    }
}
