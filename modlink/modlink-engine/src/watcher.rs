//! File system watcher producing debounced, coalesced batches of file changes.
//!
//! Raw `notify` events are filtered (link directories, the persisted record and
//! paths outside the optional glob are dropped), converted to `FileChange`s and
//! queued per path. A coalescing task emits every queued change whose path has
//! been quiet for the debounce period, once per batch interval.

use globset::{Glob, GlobMatcher};
use modlink_core::config::{EngineConfig, WatchConfig};
use modlink_core::error::{ModlinkError, Result};
use modlink_core::types::{ChangeKind, FileChange};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Decides which paths under the watched root are worth reconciling.
#[derive(Debug, Clone)]
pub struct EventFilter {
    root: PathBuf,
    link_dir: OsString,
    map_file: OsString,
    map_tmp_file: OsString,
    pattern: Option<GlobMatcher>,
}

impl EventFilter {
    pub fn new(root: &Path, config: &EngineConfig) -> Result<Self> {
        let pattern = match &config.watch.pattern {
            Some(pattern) => Some(
                Glob::new(pattern)
                    .map_err(|e| {
                        ModlinkError::config(format!("invalid watch pattern {pattern:?}: {e}"))
                    })?
                    .compile_matcher(),
            ),
            None => None,
        };

        Ok(Self {
            root: root.to_path_buf(),
            link_dir: OsString::from(&config.link_dir),
            map_file: OsString::from(&config.map_file),
            map_tmp_file: OsString::from(format!("{}.tmp", config.map_file)),
            pattern,
        })
    }

    pub fn accepts(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };

        let inside_link_dir = relative
            .components()
            .any(|c| matches!(c, Component::Normal(part) if part == self.link_dir.as_os_str()));
        if inside_link_dir {
            return false;
        }

        if let Some(name) = relative.file_name() {
            if name == self.map_file.as_os_str() || name == self.map_tmp_file.as_os_str() {
                return false;
            }
        }

        match &self.pattern {
            Some(glob) => glob.is_match(relative),
            None => true,
        }
    }
}

/// Pending change for a path
#[derive(Debug, Clone)]
struct PendingChange {
    kind: ChangeKind,
    last_updated: Instant,
}

/// Recursive watch over one root directory.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    receiver: mpsc::UnboundedReceiver<Vec<FileChange>>,
    _coalescer_handle: JoinHandle<()>,
    root: PathBuf,
}

impl FileWatcher {
    /// Start watching `root` recursively.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(root: &Path, config: &EngineConfig) -> Result<Self> {
        let filter = EventFilter::new(root, config)?;
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (coalesced_tx, coalesced_rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for change in convert_event(event) {
                    if filter.accepts(&change.path) {
                        let _ = raw_tx.send(change);
                    }
                }
            }
            Err(e) => warn!("Watch error: {}", e),
        })
        .map_err(|e| ModlinkError::watch(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| {
                ModlinkError::watch(format!("Failed to watch {}: {}", root.display(), e))
            })?;

        info!("Watching {}", root.display());

        let coalescer_handle =
            tokio::spawn(coalesce_events(raw_rx, coalesced_tx, config.watch.clone()));

        Ok(Self {
            _watcher: watcher,
            receiver: coalesced_rx,
            _coalescer_handle: coalescer_handle,
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Receive the next batch of changes; `None` once the watcher has shut down.
    pub async fn recv(&mut self) -> Option<Vec<FileChange>> {
        self.receiver.recv().await
    }
}

/// Debounce and merge raw changes until the sending side closes.
async fn coalesce_events(
    mut raw_rx: mpsc::UnboundedReceiver<FileChange>,
    coalesced_tx: mpsc::UnboundedSender<Vec<FileChange>>,
    config: WatchConfig,
) {
    let mut pending: HashMap<PathBuf, PendingChange> = HashMap::new();
    let mut ticker = interval(config.batch_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            change = raw_rx.recv() => {
                let Some(change) = change else {
                    let rest = drain(&mut pending, |_| true);
                    if !rest.is_empty() {
                        let _ = coalesced_tx.send(rest);
                    }
                    break;
                };

                queue(&mut pending, change);

                if pending.len() >= config.max_batch_size {
                    warn!("Max batch size reached, forcing emission");
                    let forced = drain(&mut pending, |_| true);
                    if coalesced_tx.send(forced).is_err() {
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                let now = Instant::now();
                let ready = drain(&mut pending, |p| {
                    now.duration_since(p.last_updated) >= config.debounce()
                });
                if !ready.is_empty() && coalesced_tx.send(ready).is_err() {
                    // Receiver dropped
                    break;
                }
            }
        }
    }
}

fn queue(pending: &mut HashMap<PathBuf, PendingChange>, change: FileChange) {
    let now = Instant::now();
    match pending.get_mut(&change.path) {
        Some(existing) => {
            existing.kind = merge_kinds(existing.kind, change.kind);
            existing.last_updated = now;
            debug!("Coalesced event for: {}", change.path.display());
        }
        None => {
            debug!("Queued event for: {}", change.path.display());
            pending.insert(
                change.path,
                PendingChange {
                    kind: change.kind,
                    last_updated: now,
                },
            );
        }
    }
}

fn drain<F>(pending: &mut HashMap<PathBuf, PendingChange>, ready: F) -> Vec<FileChange>
where
    F: Fn(&PendingChange) -> bool,
{
    let mut out = Vec::new();
    pending.retain(|path, change| {
        if ready(change) {
            out.push(FileChange {
                kind: change.kind,
                path: path.clone(),
            });
            false
        } else {
            true
        }
    });
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

/// Merge two changes for the same path.
fn merge_kinds(old: ChangeKind, new: ChangeKind) -> ChangeKind {
    match (old, new) {
        (ChangeKind::Created, ChangeKind::Modified) => ChangeKind::Created,
        (ChangeKind::Destroyed, ChangeKind::Created) => ChangeKind::Modified,
        (_, new) => new,
    }
}

/// Convert a notify event into file changes.
///
/// A rename with both ends known becomes a destroy of the old path and a
/// create of the new one. Ambiguous renames are reported as modifications;
/// reconciling a path that no longer exists cleans up after it.
fn convert_event(event: Event) -> Vec<FileChange> {
    let Some(first) = event.paths.first().cloned() else {
        return Vec::new();
    };

    match event.kind {
        EventKind::Create(_) => vec![FileChange::created(first)],
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() >= 2 => vec![
            FileChange::destroyed(first),
            FileChange::created(event.paths[1].clone()),
        ],
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => vec![FileChange::destroyed(first)],
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => vec![FileChange::created(first)],
        EventKind::Modify(_) => vec![FileChange::modified(first)],
        EventKind::Remove(_) => vec![FileChange::destroyed(first)],
        _ => Vec::new(),
    }
}
