//! Event-driven reconciliation of one file against module maps and links.
//!
//! For a created or modified file the pipeline resolves its declaration, binds
//! it in the owning module map(s) together with its link, then sweeps the
//! owning link directories for links and bindings that still point at the
//! file under a name it no longer declares. A destroyed file only gets the
//! sweep.
//!
//! Each call is independent; nothing is remembered between events apart from
//! what the module maps and the filesystem hold.

use crate::builtins::ReservedNames;
use crate::fs_utils::{self, normalize};
use crate::marker::DeclarationMarker;
use crate::report::{FailureReport, Notifier};
use crate::resolver::FileDescriptor;
use crate::scope::{ProjectScope, ScopeRegistry};
use crate::store::{ModuleStore, commit_binding};
use futures::future::join_all;
use modlink_core::config::EngineConfig;
use modlink_core::error::{ModlinkError, Result};
use modlink_core::types::{ChangeKind, FileChange, ModuleName};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// What a single reconciliation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub path: PathBuf,
    /// Name the file declares, if it still exists and declares one
    pub declared: Option<ModuleName>,
    /// Roots in which a new binding was created
    pub bound: Vec<PathBuf>,
    /// Stale names removed by the sweep
    pub removed: Vec<ModuleName>,
    /// The path was a symlink or not a file and was left alone
    pub skipped: bool,
}

impl ReconcileReport {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            ..Default::default()
        }
    }
}

/// Outcome of dispatching one batch of changes.
#[derive(Debug, Default)]
pub struct DispatchSummary {
    pub reports: Vec<ReconcileReport>,
    pub failures: Vec<FailureReport>,
}

impl DispatchSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Reconciler {
    config: Arc<EngineConfig>,
    marker: DeclarationMarker,
    reserved: ReservedNames,
    scopes: Arc<ScopeRegistry>,
}

impl Reconciler {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let config = Arc::new(config);
        let scopes = Arc::new(ScopeRegistry::new(Arc::clone(&config)));
        Self::with_registry(config, scopes)
    }

    /// Build a reconciler that shares scopes with other components.
    pub fn with_registry(config: Arc<EngineConfig>, scopes: Arc<ScopeRegistry>) -> Result<Self> {
        let marker = DeclarationMarker::new(&config.marker)?;
        let reserved = ReservedNames::new(config.reserved_names.iter().cloned());
        Ok(Self {
            config,
            marker,
            reserved,
            scopes,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scopes(&self) -> &Arc<ScopeRegistry> {
        &self.scopes
    }

    /// Dispatch a file-change signal.
    pub async fn handle(&self, change: &FileChange) -> Result<ReconcileReport> {
        match change.kind {
            ChangeKind::Created | ChangeKind::Modified => self.process_file(&change.path).await,
            ChangeKind::Destroyed => self.delete_links_to(&change.path).await,
        }
    }

    /// Handle a batch of changes concurrently.
    ///
    /// A failing change is reported through `notifier` and never stops the
    /// rest of the batch. Changes against the same root are serialized by the
    /// root's scope lock.
    pub async fn dispatch(
        &self,
        changes: &[FileChange],
        notifier: &dyn Notifier,
    ) -> DispatchSummary {
        let outcomes = join_all(
            changes
                .iter()
                .map(|change| async move { (change, self.handle(change).await) }),
        )
        .await;

        let mut summary = DispatchSummary::default();
        for (change, outcome) in outcomes {
            match outcome {
                Ok(report) => summary.reports.push(report),
                Err(err) => {
                    let failure = FailureReport::from_error(&err, Some(&change.path));
                    notifier.notify(&failure);
                    summary.failures.push(failure);
                }
            }
        }
        summary
    }

    /// Reconcile a file that was created or modified.
    ///
    /// The sweep runs even when binding fails, so a rename to a conflicting
    /// name still releases the old name; the binding error is returned after.
    pub async fn process_file(&self, path: &Path) -> Result<ReconcileReport> {
        let descriptor = FileDescriptor::new(path, &self.config, &self.marker);

        if !descriptor.exists().await {
            debug!("{} no longer exists, cleaning up", path.display());
            return self.delete_links_to(path).await;
        }

        let mut report = ReconcileReport::new(descriptor.path());
        match descriptor.can_process().await {
            Ok(true) => {}
            Ok(false) | Err(ModlinkError::NotAFile(_)) => {
                debug!("Skipping {}: not a regular file", path.display());
                report.skipped = true;
                return Ok(report);
            }
            Err(err) => return Err(err),
        }

        report.declared = descriptor.resolve_declared_name().await;

        let bound = match &report.declared {
            Some(name) => self.bind(&descriptor, name).await,
            None => Ok(Vec::new()),
        };

        let removed = self.sweep(&descriptor, report.declared.as_ref()).await;
        report.bound = bound?;
        report.removed = removed?;
        Ok(report)
    }

    /// Remove every link and binding that points at a file that is gone.
    pub async fn delete_links_to(&self, path: &Path) -> Result<ReconcileReport> {
        let descriptor = FileDescriptor::new(path, &self.config, &self.marker);
        let mut report = ReconcileReport::new(descriptor.path());
        report.removed = self.sweep(&descriptor, None).await?;
        Ok(report)
    }

    async fn bind(
        &self,
        descriptor: &FileDescriptor<'_>,
        name: &ModuleName,
    ) -> Result<Vec<PathBuf>> {
        let project_root = descriptor.ensure_link_dir().await?;

        if self.reserved.contains(name) {
            return Err(ModlinkError::ReservedName(name.to_string()));
        }

        let mut roots = vec![project_root];
        if self.config.hoist_to_workspace {
            if let Some(workspace) = descriptor.resolve_workspace_root().await {
                if !roots.contains(&workspace) {
                    roots.push(workspace);
                }
            }
        }

        let mut bound = Vec::new();
        for root in roots {
            let scope = self.scopes.scope(&root);
            let _guard = scope.lock().await;

            self.evict_dangling_link(&scope, name).await?;

            let stores: [&dyn ModuleStore; 2] = [&scope.map, &scope.linker];
            if commit_binding(&stores, name, descriptor.path()).await? {
                info!(
                    "Bound {} to {} in {}",
                    name,
                    descriptor.path().display(),
                    root.display()
                );
                bound.push(root);
            }
        }

        Ok(bound)
    }

    /// Remove a link for `name` whose target file has disappeared.
    async fn evict_dangling_link(&self, scope: &ProjectScope, name: &ModuleName) -> Result<()> {
        let Some(target) = scope.linker.current_target(name).await else {
            return Ok(());
        };
        if fs_utils::exists(&target).await {
            return Ok(());
        }

        info!("Removing dangling link {} -> {}", name, target.display());
        scope.linker.remove_module(name).await?;
        if scope.map.bound_path(name).await? == Some(target) {
            scope.map.remove_module(name).await?;
        }
        Ok(())
    }

    async fn sweep(
        &self,
        descriptor: &FileDescriptor<'_>,
        declared: Option<&ModuleName>,
    ) -> Result<Vec<ModuleName>> {
        let mut removed = Vec::new();

        for scope in descriptor.resolve_owning_module_maps(&self.scopes).await {
            if !scope.is_materialized().await {
                continue;
            }
            let _guard = scope.lock().await;
            removed.extend(sweep_scope(&scope, descriptor.path(), declared).await?);
        }

        Ok(removed)
    }
}

/// Remove links and bindings in one root that point at `path` under a name
/// other than `declared`.
async fn sweep_scope(
    scope: &ProjectScope,
    path: &Path,
    declared: Option<&ModuleName>,
) -> Result<Vec<ModuleName>> {
    let target = normalize(path);

    let modules = if scope.map.is_present().await {
        scope.map.list_modules().await?
    } else {
        Default::default()
    };

    let candidates: BTreeSet<ModuleName> = scope
        .linker
        .list_links()
        .await?
        .into_iter()
        .chain(modules.keys().cloned())
        .collect();

    let mut removed = Vec::new();
    for name in candidates {
        if declared == Some(&name) {
            continue;
        }

        let link_hit = scope.linker.current_target(&name).await.as_ref() == Some(&target);
        let map_hit = modules
            .get(&name)
            .is_some_and(|recorded| scope.map.absolute_path_of(recorded) == target);

        if !link_hit && !map_hit {
            continue;
        }

        if link_hit {
            scope.linker.remove_module(&name).await?;
        }
        if map_hit {
            scope.map.remove_module(&name).await?;
        }

        info!(
            "Removed stale module {} for {} in {}",
            name,
            path.display(),
            scope.root().display()
        );
        removed.push(name);
    }

    Ok(removed)
}
