//! Module resolution
//!
//! A context's module namespace maps normalised names to namespace objects.
//! Names are resolved at most once per context: native modules registered
//! up front are found in the registry directly, everything else goes
//! through the runtime's [`ModuleLoader`] on first import and the outcome,
//! success or failure, is cached.

mod import;
mod normalize;
mod registry;

pub use normalize::normalize_specifier;
pub(crate) use registry::{ModuleEntry, ModuleRegistry};

use kiln_sdk::NativeModule;
use std::fmt;
use thiserror::Error;

/// What a module loader produced for a name
pub enum ModuleSource {
    /// Serialized unit bytes; must be compiled in module mode
    Compiled(Vec<u8>),
    /// A host-implemented module
    Native(NativeModule),
}

impl fmt::Debug for ModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleSource::Compiled(bytes) => write!(f, "Compiled({} bytes)", bytes.len()),
            ModuleSource::Native(module) => write!(f, "Native({})", module.name()),
        }
    }
}

/// Why a module loader could not produce a module
#[derive(Debug, Error)]
pub enum ModuleLoadError {
    /// No module exists under the name
    #[error("module not found")]
    NotFound,

    /// The module source could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The loader refused the name
    #[error("{0}")]
    Rejected(String),
}

/// Module resolution callback, registered once per runtime.
///
/// `name` is already normalised against `referrer`, the name of the unit
/// that issued the import.
pub trait ModuleLoader: Send + Sync {
    /// Produce the module registered under `name`
    fn resolve(&self, name: &str, referrer: &str) -> Result<ModuleSource, ModuleLoadError>;
}

impl<F> ModuleLoader for F
where
    F: Fn(&str, &str) -> Result<ModuleSource, ModuleLoadError> + Send + Sync,
{
    fn resolve(&self, name: &str, referrer: &str) -> Result<ModuleSource, ModuleLoadError> {
        self(name, referrer)
    }
}
