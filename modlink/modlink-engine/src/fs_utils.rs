//! Race-tolerant filesystem probes and lexical path helpers.
//!
//! Probes never fail: a path that vanishes between two calls is reported as
//! absent. Path helpers are purely lexical and never touch the disk, so two
//! paths naming the same file through a symlinked directory compare unequal.

use modlink_core::error::Result;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Whether anything (including a dangling symlink) exists at `path`.
pub async fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).await.is_ok()
}

/// Whether `path` is itself a symbolic link.
pub async fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .await
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false)
}

/// Whether `path` is a real directory (not a symlink to one).
pub async fn is_dir(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

/// The raw target stored in a symlink, or `None` if `path` is not a symlink.
pub async fn read_symlink_target(path: &Path) -> Option<PathBuf> {
    if !is_symlink(path).await {
        return None;
    }
    fs::read_link(path).await.ok()
}

/// Create a symlink at `link` whose stored target is `target`.
pub async fn link_file(target: &Path, link: &Path) -> Result<()> {
    #[cfg(unix)]
    fs::symlink(target, link).await?;

    #[cfg(windows)]
    fs::symlink_file(target, link).await?;

    Ok(())
}

/// Whether a directory has no entries.
pub async fn dir_is_empty(path: &Path) -> std::io::Result<bool> {
    let mut entries = fs::read_dir(path).await?;
    Ok(entries.next_entry().await?.is_none())
}

/// Resolve `.` and `..` components without consulting the filesystem.
///
/// `..` never climbs above a root; leading `..` of a relative path is kept.
pub fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }

    parts.iter().map(|c| c.as_os_str()).collect()
}

/// Path that leads from directory `from_dir` to `to`.
///
/// Both paths are normalized first. If they share no common root (different
/// drive prefixes), `to` is returned unchanged.
pub fn relative_path(from_dir: &Path, to: &Path) -> PathBuf {
    let from = normalize(from_dir);
    let to = normalize(to);

    if from.has_root() != to.has_root() {
        return to;
    }

    let from_parts: Vec<Component<'_>> = from.components().collect();
    let to_parts: Vec<Component<'_>> = to.components().collect();

    if let (Some(Component::Prefix(a)), Some(Component::Prefix(b))) =
        (from_parts.first(), to_parts.first())
    {
        if a != b {
            return to.clone();
        }
    }

    let common = from_parts
        .iter()
        .zip(to_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..from_parts.len() {
        relative.push("..");
    }
    for part in &to_parts[common..] {
        relative.push(part.as_os_str());
    }

    if relative.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        relative
    }
}

/// Absolute location a symlink at `link` would point to given its stored `target`.
pub fn resolve_link_target(link: &Path, target: &Path) -> PathBuf {
    let base = link.parent().unwrap_or_else(|| Path::new(""));
    normalize(&base.join(target))
}

/// Render a relative path with `/` separators for the persisted record.
pub fn to_posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
