//! The capability contract shared by the module map and the file linker.
//!
//! A binding is only complete when every store holds it. `commit_binding`
//! validates all stores before touching any of them, then applies them in
//! order and removes the binding again from stores already applied if a later
//! one fails.

use async_trait::async_trait;
use modlink_core::error::{ModlinkError, Result};
use modlink_core::types::ModuleName;
use std::path::Path;
use tracing::{debug, error, warn};

/// Answer to "may this name be bound to this path?".
#[derive(Debug)]
pub enum Admission {
    /// Nothing holds the name yet.
    Vacant,
    /// The name is already bound to the same path; adding is a no-op.
    Present,
    /// The name is held by something else.
    Refused(ModlinkError),
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Refused(_))
    }

    /// Human-readable reason for a refusal.
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Refused(err) => Some(err.to_string()),
            _ => None,
        }
    }
}

/// Something that binds module names to files.
#[async_trait]
pub trait ModuleStore: Send + Sync {
    /// Short label used in logs.
    fn label(&self) -> &'static str;

    async fn can_add(&self, name: &ModuleName, path: &Path) -> Result<Admission>;

    async fn add(&self, name: &ModuleName, path: &Path) -> Result<()>;

    async fn can_remove(&self, name: &ModuleName) -> Result<bool>;

    async fn remove_module(&self, name: &ModuleName) -> Result<()>;
}

/// Bind `name` to `path` in every store as one logical unit.
///
/// Returns `true` if any store changed. On failure, stores that were changed by
/// this call are rolled back; stores that already held the binding are left
/// alone.
pub async fn commit_binding(
    stores: &[&dyn ModuleStore],
    name: &ModuleName,
    path: &Path,
) -> Result<bool> {
    let mut pending = Vec::with_capacity(stores.len());
    for store in stores {
        match store.can_add(name, path).await? {
            Admission::Vacant => pending.push(*store),
            Admission::Present => debug!("{} already binds {}", store.label(), name),
            Admission::Refused(err) => return Err(err),
        }
    }

    let mut applied: Vec<&dyn ModuleStore> = Vec::with_capacity(pending.len());
    for store in pending {
        if let Err(err) = store.add(name, path).await {
            warn!(
                "Binding {} failed in {}, rolling back {} store(s): {}",
                name,
                store.label(),
                applied.len(),
                err
            );
            for done in applied.iter().rev() {
                if let Err(undo) = roll_back(*done, name).await {
                    error!("Failed to roll back {} in {}: {}", name, done.label(), undo);
                }
            }
            return Err(err);
        }
        applied.push(store);
    }

    Ok(!applied.is_empty())
}

/// Undo a binding this call applied, unless the store no longer allows it.
async fn roll_back(store: &dyn ModuleStore, name: &ModuleName) -> Result<()> {
    if !store.can_remove(name).await? {
        warn!("Not rolling back {} in {}: slot is held by something else", name, store.label());
        return Ok(());
    }
    store.remove_module(name).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    /// In-memory store that can be told to refuse or to fail on add.
    #[derive(Default)]
    struct FakeStore {
        names: Mutex<BTreeSet<String>>,
        refuse: bool,
        fail_add: bool,
        pin: bool,
    }

    impl FakeStore {
        fn holds(&self, name: &str) -> bool {
            self.names.lock().unwrap().contains(name)
        }
    }

    #[async_trait]
    impl ModuleStore for FakeStore {
        fn label(&self) -> &'static str {
            "fake"
        }

        async fn can_add(&self, name: &ModuleName, _path: &Path) -> Result<Admission> {
            if self.refuse {
                return Ok(Admission::Refused(ModlinkError::link_conflict(
                    name.as_str(),
                    "occupied",
                )));
            }
            if self.holds(name.as_str()) {
                Ok(Admission::Present)
            } else {
                Ok(Admission::Vacant)
            }
        }

        async fn add(&self, name: &ModuleName, _path: &Path) -> Result<()> {
            if self.fail_add {
                return Err(std::io::Error::other("disk full").into());
            }
            self.names.lock().unwrap().insert(name.to_string());
            Ok(())
        }

        async fn can_remove(&self, _name: &ModuleName) -> Result<bool> {
            Ok(!self.pin)
        }

        async fn remove_module(&self, name: &ModuleName) -> Result<()> {
            self.names.lock().unwrap().remove(name.as_str());
            Ok(())
        }
    }

    fn foo() -> ModuleName {
        ModuleName::new("foo").unwrap()
    }

    #[tokio::test]
    async fn test_commit_applies_all_stores() {
        let first = FakeStore::default();
        let second = FakeStore::default();

        let changed = commit_binding(&[&first, &second], &foo(), Path::new("/p/a.js"))
            .await
            .unwrap();

        assert!(changed);
        assert!(first.holds("foo"));
        assert!(second.holds("foo"));
    }

    #[tokio::test]
    async fn test_commit_rolls_back_on_apply_failure() {
        let first = FakeStore::default();
        let second = FakeStore {
            fail_add: true,
            ..Default::default()
        };

        let result = commit_binding(&[&first, &second], &foo(), Path::new("/p/a.js")).await;

        assert!(matches!(result, Err(ModlinkError::Io(_))));
        assert!(!first.holds("foo"), "first store must be rolled back");
    }

    #[tokio::test]
    async fn test_rollback_keeps_preexisting_bindings() {
        let first = FakeStore::default();
        first.names.lock().unwrap().insert("foo".to_string());
        let second = FakeStore {
            fail_add: true,
            ..Default::default()
        };

        let result = commit_binding(&[&first, &second], &foo(), Path::new("/p/a.js")).await;

        assert!(result.is_err());
        assert!(first.holds("foo"));
    }

    #[tokio::test]
    async fn test_rollback_skips_stores_that_cannot_remove() {
        let first = FakeStore {
            pin: true,
            ..Default::default()
        };
        let second = FakeStore {
            fail_add: true,
            ..Default::default()
        };

        let result = commit_binding(&[&first, &second], &foo(), Path::new("/p/a.js")).await;

        assert!(matches!(result, Err(ModlinkError::Io(_))));
        assert!(first.holds("foo"));
    }

    #[tokio::test]
    async fn test_refusal_touches_nothing() {
        let first = FakeStore::default();
        let second = FakeStore {
            refuse: true,
            ..Default::default()
        };

        let result = commit_binding(&[&first, &second], &foo(), Path::new("/p/a.js")).await;

        assert!(matches!(result, Err(ModlinkError::LinkConflict { .. })));
        assert!(!first.holds("foo"));
    }

    #[tokio::test]
    async fn test_commit_is_noop_when_present_everywhere() {
        let first = FakeStore::default();
        first.names.lock().unwrap().insert("foo".to_string());

        let changed = commit_binding(&[&first], &foo(), Path::new("/p/a.js"))
            .await
            .unwrap();
        assert!(!changed);
    }
}
