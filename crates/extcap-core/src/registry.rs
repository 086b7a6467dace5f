//! Interface Registry - which helper owns which interface name
//!
//! Rebuilt from scratch on every discovery pass. The first helper to claim a
//! name keeps it for the rest of the pass; later claims are rejected and an
//! existing mapping is never overwritten.

use crate::error::{ExtcapError, ExtcapResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Mapping from interface name to owning helper path
#[derive(Debug, Clone, Default)]
pub struct InterfaceRegistry {
    owners: HashMap<String, PathBuf>,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every mapping. Called at the start of each discovery pass.
    pub fn reset(&mut self) {
        debug!("Resetting interface registry ({} entries)", self.owners.len());
        self.owners.clear();
    }

    /// Owning helper of `name`
    pub fn lookup(&self, name: &str) -> Option<&Path> {
        self.owners.get(name).map(PathBuf::as_path)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.owners.contains_key(name)
    }

    /// Whether `name` is registered to exactly `helper`
    pub fn owns(&self, name: &str, helper: &Path) -> bool {
        self.lookup(name) == Some(helper)
    }

    /// Claim `name` for `helper`.
    ///
    /// Re-registering the same pair is a no-op. A claim by a different helper
    /// leaves the registry untouched and returns
    /// [`ExtcapError::OwnershipConflict`].
    pub fn register(&mut self, name: &str, helper: &Path) -> ExtcapResult<()> {
        match self.owners.get(name) {
            Some(owner) if owner == helper => Ok(()),
            Some(owner) => Err(ExtcapError::OwnershipConflict {
                interface: name.to_string(),
                owner: owner.clone(),
                claimant: helper.to_path_buf(),
            }),
            None => {
                self.owners.insert(name.to_string(), helper.to_path_buf());
                Ok(())
            }
        }
    }

    /// Interface names owned by `helper`, sorted
    pub fn interfaces_of(&self, helper: &Path) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .owners
            .iter()
            .filter(|(_, owner)| owner.as_path() == helper)
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_writer_wins() {
        let mut registry = InterfaceRegistry::new();
        let a = Path::new("/opt/extcap/a");
        let b = Path::new("/opt/extcap/b");

        registry.register("eth-ext", a).unwrap();
        let err = registry.register("eth-ext", b).unwrap_err();
        assert!(matches!(err, ExtcapError::OwnershipConflict { .. }));

        assert_eq!(registry.lookup("eth-ext"), Some(a));
        assert!(registry.owns("eth-ext", a));
        assert!(!registry.owns("eth-ext", b));
    }

    #[test]
    fn test_reregister_same_owner_is_noop() {
        let mut registry = InterfaceRegistry::new();
        let a = Path::new("/opt/extcap/a");
        registry.register("usb-ext", a).unwrap();
        registry.register("usb-ext", a).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut registry = InterfaceRegistry::new();
        registry.reset();
        registry
            .register("ble-ext", Path::new("/opt/extcap/b"))
            .unwrap();
        registry.reset();
        registry.reset();
        assert!(registry.is_empty());
        assert_eq!(registry.lookup("ble-ext"), None);
        assert!(!registry.contains("ble-ext"));
    }

    #[test]
    fn test_interfaces_of() {
        let mut registry = InterfaceRegistry::new();
        let a = Path::new("/opt/extcap/a");
        registry.register("usb-ext", a).unwrap();
        registry.register("eth-ext", a).unwrap();
        registry
            .register("ble-ext", Path::new("/opt/extcap/b"))
            .unwrap();
        assert_eq!(registry.interfaces_of(a), vec!["eth-ext", "usb-ext"]);
    }
}
