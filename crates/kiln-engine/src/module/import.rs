//! Import resolution for a context

use super::{normalize_specifier, ModuleEntry, ModuleSource};
use crate::context::Context;
use crate::error::EngineError;
use crate::loader::{RunError, UnitImage};
use crate::value::{ObjectRef, ScriptResult};
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

impl Context {
    /// Import a module into this context and return its namespace.
    ///
    /// `requested` is normalised against `referrer`. A name that is already
    /// in the namespace (including natives registered during composition)
    /// is returned without consulting the runtime's module loader.
    pub fn import_module(&mut self, requested: &str, referrer: &str) -> Result<ObjectRef, EngineError> {
        match self.resolve_import(requested, referrer) {
            Ok(namespace) => Ok(namespace),
            Err(RunError::Engine(err)) => Err(err),
            Err(RunError::Thrown(thrown)) => {
                Err(EngineError::UncaughtScriptFailure(self.failure_of(&thrown)))
            }
        }
    }

    /// `IMPORT` from script code: resolution failures become catchable
    /// `ModuleResolutionError` exceptions, a module's own throw propagates
    /// unchanged.
    pub(crate) fn import_from_script(&mut self, requested: &str, referrer: &str) -> ScriptResult<ObjectRef> {
        match self.resolve_import(requested, referrer) {
            Ok(namespace) => Ok(namespace),
            Err(RunError::Thrown(thrown)) => Err(thrown),
            Err(RunError::Engine(err)) => {
                let message = match err {
                    EngineError::ModuleResolution { name, reason } => {
                        format!("could not load module '{}': {}", name, reason)
                    }
                    other => other.to_string(),
                };
                Err(self.make_error("ModuleResolutionError", &message))
            }
        }
    }

    /// Names in the module namespace, in registration order
    pub fn module_names(&self) -> Vec<String> {
        self.modules.names()
    }

    /// How many times the module loader has been consulted
    pub fn resolution_count(&self) -> usize {
        self.modules.resolution_count()
    }

    fn resolve_import(&mut self, requested: &str, referrer: &str) -> Result<ObjectRef, RunError> {
        let name = normalize_specifier(requested, referrer);

        match self.modules.lookup(&name) {
            Some(ModuleEntry::Ready(namespace)) | Some(ModuleEntry::Evaluating(namespace)) => {
                return Ok(namespace.clone());
            }
            Some(ModuleEntry::Failed(reason)) => {
                return Err(RunError::Engine(EngineError::ModuleResolution {
                    name,
                    reason: reason.clone(),
                }));
            }
            Some(ModuleEntry::Lazy(init)) => {
                let init = init.clone();
                return self.init_lazy_native(&name, &init).map_err(RunError::Engine);
            }
            None => {}
        }

        self.modules.record_resolution();
        let Some(loader) = self.runtime().module_loader() else {
            return Err(self.resolution_failed(name, "no module loader is registered".to_string()));
        };

        debug!(
            context = self.id().as_u64(),
            module = %name,
            referrer,
            "resolving module"
        );
        let source = match loader.resolve(&name, referrer) {
            Ok(source) => source,
            Err(err) => return Err(self.resolution_failed(name, err.to_string())),
        };

        match source {
            ModuleSource::Native(module) => {
                let namespace = self.bind_native_module(&module);
                self.modules
                    .insert_ready(&name, namespace.clone())
                    .map_err(RunError::Engine)?;
                Ok(namespace)
            }
            ModuleSource::Compiled(bytes) => {
                let image = match UnitImage::from_bytes(&bytes) {
                    Ok(image) if image.unit.is_module() => Arc::new(image),
                    Ok(_) => {
                        return Err(self.resolution_failed(
                            name,
                            "unit was compiled in script mode".to_string(),
                        ))
                    }
                    Err(rejection) => return Err(self.resolution_failed(name, rejection.to_string())),
                };
                let result = self.run_unit(&image, Some(Rc::from(name.as_str())))?;
                result.namespace.ok_or_else(|| {
                    RunError::Engine(EngineError::InvariantViolation(format!(
                        "module '{}' produced no namespace",
                        name
                    )))
                })
            }
        }
    }

    fn resolution_failed(&mut self, name: String, reason: String) -> RunError {
        debug!(context = self.id().as_u64(), module = %name, %reason, "module resolution failed");
        self.modules.fail(&name, reason.clone());
        RunError::Engine(EngineError::ModuleResolution { name, reason })
    }
}
