//! Persisted module name to file path bindings for one project root.
//!
//! The record lives at `<root>/<map_file>` as pretty-printed JSON with keys in
//! ascending order. Paths are stored relative to the root with `/` separators
//! so the record survives the root being moved.
//!
//! Every mutating call holds the map's lock across read, validate and write,
//! and rewrites the whole record before returning.

use crate::fs_utils::{self, normalize};
use crate::store::{Admission, ModuleStore};
use async_trait::async_trait;
use modlink_core::config::EngineConfig;
use modlink_core::error::{ModlinkError, Result};
use modlink_core::types::ModuleName;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

type Entries = BTreeMap<ModuleName, String>;

pub struct ModuleMap {
    root: PathBuf,
    record_path: PathBuf,
    entries: Mutex<Option<Entries>>,
}

impl ModuleMap {
    pub fn new(root: &Path, config: &EngineConfig) -> Self {
        Self::with_record_name(root, &config.map_file)
    }

    pub fn with_record_name(root: &Path, record_name: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            record_path: root.join(record_name),
            entries: Mutex::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    /// Whether the backing record exists on disk.
    pub async fn is_present(&self) -> bool {
        fs_utils::exists(&self.record_path).await
    }

    /// Load the record once; later calls are no-ops.
    ///
    /// A missing record is initialized empty and written immediately.
    pub async fn load(&self) -> Result<()> {
        let mut guard = self.entries.lock().await;
        self.loaded(&mut guard).await?;
        Ok(())
    }

    /// Check whether `name` may be bound to `path`.
    ///
    /// A binding whose file no longer exists is dropped first.
    ///
    /// # Errors
    ///
    /// `AlreadyMapped` if `name` is bound to a different existing file.
    pub async fn can_add(&self, name: &ModuleName, path: &Path) -> Result<()> {
        let mut guard = self.entries.lock().await;
        let entries = self.loaded(&mut guard).await?;
        self.check_add(entries, name, path).await.map(|_| ())
    }

    /// Bind `name` to `path` and persist the full record.
    pub async fn add(&self, name: &ModuleName, path: &Path) -> Result<()> {
        let mut guard = self.entries.lock().await;
        let entries = self.loaded(&mut guard).await?;

        if self.check_add(entries, name, path).await? {
            return Ok(());
        }

        let relative = self.relative_path_of(path);
        entries.insert(name.clone(), relative.clone());
        self.persist(entries).await?;

        info!("Mapped {} -> {} in {}", name, relative, self.record_path.display());
        Ok(())
    }

    /// Drop the binding for `name` if there is one, then persist.
    pub async fn remove_module(&self, name: &ModuleName) -> Result<()> {
        let mut guard = self.entries.lock().await;
        let entries = self.loaded(&mut guard).await?;

        if let Some(previous) = entries.remove(name) {
            info!("Unmapped {} (was {})", name, previous);
        }
        self.persist(entries).await
    }

    /// The name currently bound to `path`, if any.
    pub async fn existing_module_name(&self, path: &Path) -> Result<Option<ModuleName>> {
        let target = self.absolutize(path);
        let mut guard = self.entries.lock().await;
        let entries = self.loaded(&mut guard).await?;

        Ok(entries
            .iter()
            .find(|(_, bound)| self.absolute_path_of(bound) == target)
            .map(|(name, _)| name.clone()))
    }

    /// Absolute path currently bound to `name`, if any.
    pub async fn bound_path(&self, name: &ModuleName) -> Result<Option<PathBuf>> {
        let mut guard = self.entries.lock().await;
        let entries = self.loaded(&mut guard).await?;
        Ok(entries.get(name).map(|bound| self.absolute_path_of(bound)))
    }

    /// A snapshot of every binding.
    pub async fn list_modules(&self) -> Result<BTreeMap<ModuleName, String>> {
        let mut guard = self.entries.lock().await;
        Ok(self.loaded(&mut guard).await?.clone())
    }

    /// Record form of `path`: relative to the root, `/`-separated.
    pub fn relative_path_of(&self, path: &Path) -> String {
        fs_utils::to_posix(&fs_utils::relative_path(&self.root, &self.absolutize(path)))
    }

    /// Absolute form of a recorded path.
    pub fn absolute_path_of(&self, recorded: &str) -> PathBuf {
        normalize(&self.root.join(recorded))
    }

    fn absolutize(&self, path: &Path) -> PathBuf {
        normalize(&self.root.join(path))
    }

    async fn loaded<'a>(&self, slot: &'a mut Option<Entries>) -> Result<&'a mut Entries> {
        if slot.is_none() {
            let entries = self.read_record().await?;
            *slot = Some(entries);
        }
        Ok(slot.get_or_insert_with(Entries::new))
    }

    async fn read_record(&self) -> Result<Entries> {
        if !fs_utils::exists(&self.record_path).await {
            debug!("Initializing empty module map at {}", self.record_path.display());
            let entries = Entries::new();
            self.persist(&entries).await?;
            return Ok(entries);
        }

        let content = fs::read_to_string(&self.record_path).await?;
        if content.trim().is_empty() {
            return Ok(Entries::new());
        }

        let raw: BTreeMap<String, String> = serde_json::from_str(&content)
            .map_err(|e| ModlinkError::corrupt(&self.record_path, e.to_string()))?;

        raw.into_iter()
            .map(|(name, path)| {
                ModuleName::new(name)
                    .map(|name| (name, path))
                    .map_err(|e| ModlinkError::corrupt(&self.record_path, e.to_string()))
            })
            .collect()
    }

    /// Returns `true` if `name` is already bound to `path`.
    async fn check_add(
        &self,
        entries: &mut Entries,
        name: &ModuleName,
        path: &Path,
    ) -> Result<bool> {
        let Some(bound) = entries.get(name) else {
            return Ok(false);
        };

        let bound_path = self.absolute_path_of(bound);
        if !fs_utils::exists(&bound_path).await {
            info!(
                "Dropping stale mapping {} -> {}: file no longer exists",
                name, bound
            );
            entries.remove(name);
            self.persist(entries).await?;
            return Ok(false);
        }

        if bound_path == self.absolutize(path) {
            Ok(true)
        } else {
            Err(ModlinkError::AlreadyMapped {
                name: name.to_string(),
                existing: bound.clone(),
            })
        }
    }

    /// Rewrite the full record: temp file, then rename into place.
    async fn persist(&self, entries: &Entries) -> Result<()> {
        let mut content = serde_json::to_string_pretty(entries)?;
        content.push('\n');

        let temp_path = self.record_path.with_extension("json.tmp");
        let persist_err = |source| ModlinkError::Persist {
            path: self.record_path.clone(),
            source,
        };

        fs::write(&temp_path, content).await.map_err(persist_err)?;
        fs::rename(&temp_path, &self.record_path)
            .await
            .map_err(persist_err)?;

        debug!(
            "Persisted {} mapping(s) to {}",
            entries.len(),
            self.record_path.display()
        );
        Ok(())
    }
}

#[async_trait]
impl ModuleStore for ModuleMap {
    fn label(&self) -> &'static str {
        "module map"
    }

    async fn can_add(&self, name: &ModuleName, path: &Path) -> Result<Admission> {
        let mut guard = self.entries.lock().await;
        let entries = self.loaded(&mut guard).await?;
        match self.check_add(entries, name, path).await {
            Ok(true) => Ok(Admission::Present),
            Ok(false) => Ok(Admission::Vacant),
            Err(err @ ModlinkError::AlreadyMapped { .. }) => Ok(Admission::Refused(err)),
            Err(err) => Err(err),
        }
    }

    async fn add(&self, name: &ModuleName, path: &Path) -> Result<()> {
        ModuleMap::add(self, name, path).await
    }

    async fn can_remove(&self, _name: &ModuleName) -> Result<bool> {
        Ok(true)
    }

    async fn remove_module(&self, name: &ModuleName) -> Result<()> {
        ModuleMap::remove_module(self, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn name(s: &str) -> ModuleName {
        ModuleName::new(s).unwrap()
    }

    async fn project() -> (TempDir, ModuleMap) {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.js"), "").await.unwrap();
        fs::write(temp_dir.path().join("b.js"), "").await.unwrap();
        let map = ModuleMap::new(temp_dir.path(), &EngineConfig::default());
        (temp_dir, map)
    }

    async fn read_raw(map: &ModuleMap) -> String {
        fs::read_to_string(map.record_path()).await.unwrap()
    }

    #[tokio::test]
    async fn test_load_creates_empty_record() {
        let (_temp_dir, map) = project().await;
        assert!(!map.is_present().await);

        map.load().await.unwrap();

        assert!(map.is_present().await);
        assert_eq!(read_raw(&map).await.trim(), "{}");
    }

    #[tokio::test]
    async fn test_add_persists_relative_sorted_record() {
        let (temp_dir, map) = project().await;

        map.add(&name("zeta"), &temp_dir.path().join("b.js")).await.unwrap();
        map.add(&name("alpha"), &temp_dir.path().join("a.js")).await.unwrap();

        let raw = read_raw(&map).await;
        assert_eq!(raw, "{\n  \"alpha\": \"a.js\",\n  \"zeta\": \"b.js\"\n}\n");
    }

    #[tokio::test]
    async fn test_round_trip_through_fresh_instance() {
        let (temp_dir, map) = project().await;
        fs::create_dir(temp_dir.path().join("src")).await.unwrap();
        fs::write(temp_dir.path().join("src/c.js"), "").await.unwrap();

        map.add(&name("a"), &temp_dir.path().join("a.js")).await.unwrap();
        map.add(&name("scope/c"), &temp_dir.path().join("src/c.js")).await.unwrap();

        let fresh = ModuleMap::new(temp_dir.path(), &EngineConfig::default());
        assert_eq!(fresh.list_modules().await.unwrap(), map.list_modules().await.unwrap());
        assert_eq!(
            fresh.list_modules().await.unwrap().get(&name("scope/c")),
            Some(&"src/c.js".to_string())
        );
    }

    #[tokio::test]
    async fn test_conflicting_add_is_rejected() {
        let (temp_dir, map) = project().await;
        let a = temp_dir.path().join("a.js");
        let b = temp_dir.path().join("b.js");

        map.add(&name("foo"), &a).await.unwrap();
        let err = map.add(&name("foo"), &b).await.unwrap_err();

        match err {
            ModlinkError::AlreadyMapped { name, existing } => {
                assert_eq!(name, "foo");
                assert_eq!(existing, "a.js");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(map.bound_path(&name("foo")).await.unwrap(), Some(normalize(&a)));
    }

    #[tokio::test]
    async fn test_same_path_is_accepted_after_normalization() {
        let (temp_dir, map) = project().await;

        map.add(&name("foo"), &temp_dir.path().join("a.js")).await.unwrap();
        map.can_add(&name("foo"), &temp_dir.path().join("./sub/../a.js"))
            .await
            .unwrap();
        map.add(&name("foo"), &temp_dir.path().join("a.js")).await.unwrap();

        assert_eq!(map.list_modules().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_binding_is_cleaned_before_check() {
        let (temp_dir, map) = project().await;
        let a = temp_dir.path().join("a.js");
        let b = temp_dir.path().join("b.js");

        map.add(&name("foo"), &a).await.unwrap();
        fs::remove_file(&a).await.unwrap();

        map.can_add(&name("foo"), &b).await.unwrap();
        assert!(map.bound_path(&name("foo")).await.unwrap().is_none());

        map.add(&name("foo"), &b).await.unwrap();
        assert_eq!(map.bound_path(&name("foo")).await.unwrap(), Some(normalize(&b)));
    }

    #[tokio::test]
    async fn test_remove_module_is_noop_when_absent() {
        let (temp_dir, map) = project().await;
        map.add(&name("foo"), &temp_dir.path().join("a.js")).await.unwrap();

        map.remove_module(&name("bar")).await.unwrap();
        map.remove_module(&name("foo")).await.unwrap();

        assert!(map.list_modules().await.unwrap().is_empty());
        assert_eq!(read_raw(&map).await.trim(), "{}");
    }

    #[tokio::test]
    async fn test_existing_module_name() {
        let (temp_dir, map) = project().await;
        let a = temp_dir.path().join("a.js");

        map.add(&name("foo"), &a).await.unwrap();

        assert_eq!(map.existing_module_name(&a).await.unwrap(), Some(name("foo")));
        assert_eq!(
            map.existing_module_name(&temp_dir.path().join("b.js")).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_corrupt_record_is_fatal() {
        let (temp_dir, map) = project().await;
        fs::write(temp_dir.path().join("module-map.json"), "{ not json")
            .await
            .unwrap();

        let err = map.load().await.unwrap_err();
        assert!(matches!(err, ModlinkError::CorruptRecord { .. }));
    }

    #[tokio::test]
    async fn test_trait_reports_conflict_as_refusal() {
        let (temp_dir, map) = project().await;
        map.add(&name("foo"), &temp_dir.path().join("a.js")).await.unwrap();

        let store: &dyn ModuleStore = &map;
        let admission = store
            .can_add(&name("foo"), &temp_dir.path().join("b.js"))
            .await
            .unwrap();
        assert!(!admission.is_allowed());
        assert!(admission.reason().unwrap().contains("a.js"));

        let admission = store
            .can_add(&name("foo"), &temp_dir.path().join("a.js"))
            .await
            .unwrap();
        assert!(matches!(admission, Admission::Present));
    }
}
