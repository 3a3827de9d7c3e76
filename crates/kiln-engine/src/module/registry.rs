//! Per-context module namespace

use crate::error::EngineError;
use crate::value::ObjectRef;
use indexmap::IndexMap;
use kiln_sdk::ModuleInit;

/// State of one name in the module namespace
pub(crate) enum ModuleEntry {
    /// Top level still running; imports see the partial namespace
    Evaluating(ObjectRef),
    /// Fully evaluated or bound
    Ready(ObjectRef),
    /// Native module whose init runs on first import
    Lazy(ModuleInit),
    /// Resolution or evaluation failed; never retried
    Failed(String),
}

/// Names are unique: an entry is only ever replaced by a later state of the
/// same module, never by a second module.
#[derive(Default)]
pub(crate) struct ModuleRegistry {
    entries: IndexMap<String, ModuleEntry>,
    resolutions: usize,
}

impl ModuleRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&ModuleEntry> {
        self.entries.get(name)
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    fn claim(&mut self, name: &str, entry: ModuleEntry) -> Result<(), EngineError> {
        if self.entries.contains_key(name) {
            return Err(EngineError::InvariantViolation(format!(
                "module '{}' is already registered in this context",
                name
            )));
        }
        self.entries.insert(name.to_string(), entry);
        Ok(())
    }

    /// Register a module whose top level is about to run
    pub(crate) fn begin_evaluation(
        &mut self,
        name: &str,
        namespace: ObjectRef,
    ) -> Result<(), EngineError> {
        self.claim(name, ModuleEntry::Evaluating(namespace))
    }

    pub(crate) fn finish_evaluation(&mut self, name: &str) {
        if let Some(entry) = self.entries.get_mut(name) {
            if let ModuleEntry::Evaluating(namespace) = entry {
                *entry = ModuleEntry::Ready(namespace.clone());
            }
        }
    }

    /// Register a bound module under a fresh name
    pub(crate) fn insert_ready(&mut self, name: &str, namespace: ObjectRef) -> Result<(), EngineError> {
        self.claim(name, ModuleEntry::Ready(namespace))
    }

    pub(crate) fn insert_lazy(&mut self, name: &str, init: ModuleInit) -> Result<(), EngineError> {
        self.claim(name, ModuleEntry::Lazy(init))
    }

    /// Settle a lazy native module once its init has run
    pub(crate) fn settle(&mut self, name: &str, namespace: ObjectRef) {
        self.entries
            .insert(name.to_string(), ModuleEntry::Ready(namespace));
    }

    /// Cache a failure; later imports of `name` fail without resolving
    pub(crate) fn fail(&mut self, name: &str, reason: String) {
        self.entries
            .insert(name.to_string(), ModuleEntry::Failed(reason));
    }

    pub(crate) fn record_resolution(&mut self) {
        self.resolutions += 1;
    }

    pub(crate) fn resolution_count(&self) -> usize {
        self.resolutions
    }

    /// Names of modules that resolved, in registration order
    pub(crate) fn names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| !matches!(entry, ModuleEntry::Failed(_)))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Object, ObjectKind};
    use std::sync::Arc;

    fn namespace() -> ObjectRef {
        ObjectRef::from_object(Object::new(ObjectKind::Namespace, None))
    }

    #[test]
    fn test_names_are_unique() {
        let mut registry = ModuleRegistry::new();
        registry.insert_ready("a", namespace()).unwrap();
        assert!(matches!(
            registry.begin_evaluation("a", namespace()),
            Err(EngineError::InvariantViolation(_))
        ));
        let init: ModuleInit = Arc::new(|_| Ok(()));
        assert!(registry.insert_lazy("a", init).is_err());
    }

    #[test]
    fn test_evaluation_settles_to_ready() {
        let mut registry = ModuleRegistry::new();
        let ns = namespace();
        registry.begin_evaluation("m", ns.clone()).unwrap();
        assert!(matches!(registry.lookup("m"), Some(ModuleEntry::Evaluating(_))));
        registry.finish_evaluation("m");
        match registry.lookup("m") {
            Some(ModuleEntry::Ready(found)) => assert!(found.ptr_eq(&ns)),
            _ => panic!("expected a ready module"),
        }
    }

    #[test]
    fn test_failures_are_cached_but_not_listed() {
        let mut registry = ModuleRegistry::new();
        registry.insert_ready("ok", namespace()).unwrap();
        registry.fail("missing", "module not found".to_string());
        assert!(registry.contains("missing"));
        assert!(matches!(registry.lookup("missing"), Some(ModuleEntry::Failed(_))));
        assert_eq!(registry.names(), vec!["ok".to_string()]);
    }
}
