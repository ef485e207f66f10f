//! Implementations of the CLI subcommands.

use crate::output::{self, ConsoleNotifier};
use anyhow::{Context, Result, bail};
use modlink_core::{ChangeKind, EngineConfig, FileChange};
use modlink_engine::fs_utils::normalize;
use modlink_engine::{FileWatcher, ModuleMap, Reconciler};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Reconcile each file once, as if it had just been modified.
pub async fn process(files: Vec<PathBuf>, config: EngineConfig) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let changes: Vec<FileChange> = files
        .iter()
        .map(|file| FileChange::relative_to(ChangeKind::Modified, &cwd, file))
        .collect();

    let reconciler = Reconciler::new(config)?;
    let summary = reconciler.dispatch(&changes, &ConsoleNotifier).await;

    for report in &summary.reports {
        if let Some(name) = &report.declared {
            output::success(format!("{} provides {}", report.path.display(), name));
        }
        for removed in &report.removed {
            output::info(format!("Removed stale module {}", removed));
        }
    }

    if !summary.is_success() {
        bail!(
            "{} of {} file(s) could not be reconciled",
            summary.failures.len(),
            changes.len()
        );
    }
    Ok(())
}

/// Watch a directory and reconcile every change until interrupted.
pub async fn watch(dir: PathBuf, pattern: Option<String>, mut config: EngineConfig) -> Result<()> {
    let root = tokio::fs::canonicalize(&dir)
        .await
        .with_context(|| format!("Failed to resolve {}", dir.display()))?;
    if pattern.is_some() {
        config.watch.pattern = pattern;
    }

    let mut watcher = FileWatcher::new(&root, &config)
        .with_context(|| format!("failed to create watch on {}", root.display()))?;
    let reconciler = Reconciler::new(config)?;

    output::info(format!("Watching {} (Ctrl-C to stop)", root.display()));

    loop {
        tokio::select! {
            batch = watcher.recv() => {
                let Some(changes) = batch else {
                    info!("Watcher closed");
                    break;
                };
                debug!("Dispatching {} change(s)", changes.len());
                let summary = reconciler.dispatch(&changes, &ConsoleNotifier).await;
                let changed = summary
                    .reports
                    .iter()
                    .filter(|r| !r.bound.is_empty() || !r.removed.is_empty());
                for report in changed {
                    let path = report.path.display();
                    match &report.declared {
                        Some(name) => output::success(format!("{} provides {}", path, name)),
                        None => output::info(format!("{} provides no module", path)),
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                output::info("Stopping watcher");
                break;
            }
        }
    }

    Ok(())
}

/// Rebuild every link of a project root from its module map.
pub async fn relink(root: PathBuf, config: EngineConfig) -> Result<()> {
    let root = absolute(&root)?;

    let report = modlink_engine::relink(&root, &config)
        .await
        .with_context(|| format!("Failed to link all files in {}", root.display()))?;

    debug!(
        "{} link(s) created, {} already present",
        report.linked.len(),
        report.unchanged.len()
    );
    output::success(format!("Re-linked all files in {}", root.display()));
    Ok(())
}

/// Print the bindings persisted for a project root.
pub async fn list(root: PathBuf, json: bool, config: EngineConfig) -> Result<()> {
    let root = absolute(&root)?;
    let map = ModuleMap::new(&root, &config);

    let modules = if map.is_present().await {
        map.list_modules().await?
    } else {
        Default::default()
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&modules)?);
        return Ok(());
    }

    if modules.is_empty() {
        output::info(format!("No modules mapped in {}", root.display()));
        return Ok(());
    }

    for (name, path) in &modules {
        output::kv(name, path);
    }
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    let path = std::path::absolute(path)
        .with_context(|| format!("Failed to resolve {}", path.display()))?;
    Ok(normalize(&path))
}
