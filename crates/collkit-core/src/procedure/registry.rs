use crate::error::{Error, ErrorKind, ErrorOrigin};
use std::{collections::BTreeSet, sync::RwLock};
use thiserror::Error as ThisError;

///
/// RegistryError
///

#[derive(Debug, ThisError)]
pub enum RegistryError {
    #[error("method '{0}' already registered")]
    DuplicateMethodName(String),
}

impl From<RegistryError> for Error {
    fn from(err: RegistryError) -> Self {
        let kind = match &err {
            RegistryError::DuplicateMethodName(_) => ErrorKind::DuplicateMethodName,
        };

        Self::new(kind, ErrorOrigin::Procedure, err.to_string())
    }
}

///
/// MethodNameRegistry
///
/// Fully-qualified procedure names claimed so far, across every record
/// type wired by the same orchestrator. A name stays claimed once its
/// procedure is registered.
///

#[derive(Debug, Default)]
pub struct MethodNameRegistry {
    names: RwLock<BTreeSet<String>>,
}

impl MethodNameRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a name.
    pub fn register(&self, name: &str) -> Result<(), RegistryError> {
        let mut names = self
            .names
            .write()
            .expect("method name registry lock should not be poisoned");

        if !names.insert(name.to_string()) {
            return Err(RegistryError::DuplicateMethodName(name.to_string()));
        }

        Ok(())
    }

    /// Give back a claimed name whose procedure never got registered.
    pub fn release(&self, name: &str) -> bool {
        self.names
            .write()
            .expect("method name registry lock should not be poisoned")
            .remove(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names
            .read()
            .expect("method name registry lock should not be poisoned")
            .contains(name)
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.names
            .read()
            .expect("method name registry lock should not be poisoned")
            .iter()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names
            .read()
            .expect("method name registry lock should not be poisoned")
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_name_is_rejected() {
        let registry = MethodNameRegistry::new();
        registry
            .register("collections/things/add")
            .expect("initial registration should succeed");

        let err: Error = registry
            .register("collections/things/add")
            .expect_err("duplicate registration should fail")
            .into();
        assert_eq!(err.kind, ErrorKind::DuplicateMethodName);
        assert!(err.is_setup());
        assert!(
            err.message.contains("collections/things/add"),
            "duplicate registration should name the conflicting method"
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn names_are_sorted() {
        let registry = MethodNameRegistry::new();
        for name in ["b", "a", "c"] {
            registry.register(name).expect("distinct names should register");
        }

        assert_eq!(registry.names(), vec!["a", "b", "c"]);
        assert!(registry.contains("b"));
        assert!(!registry.contains("d"));
    }

    #[test]
    fn released_names_can_be_claimed_again() {
        let registry = MethodNameRegistry::new();
        registry.register("a").expect("first claim should succeed");

        assert!(registry.release("a"));
        assert!(!registry.release("a"));
        registry.register("a").expect("released name should be free");
    }
}
