//! Module loader reading compiled units from disk

use kiln_engine::{ModuleLoadError, ModuleLoader, ModuleSource};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Resolves normalised module names against a list of root directories.
///
/// The first root containing a file under the name wins. Absolute names and
/// names that climb out of the roots with `..` are refused.
#[derive(Debug, Clone)]
pub struct FsModuleLoader {
    roots: Vec<PathBuf>,
}

impl FsModuleLoader {
    /// Create a loader searching `roots` in order
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    /// Search roots in order
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn candidates(&self, name: &str) -> Result<Vec<PathBuf>, ModuleLoadError> {
        let relative = Path::new(name);
        if relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        }) {
            return Err(ModuleLoadError::Rejected(format!(
                "'{}' escapes the module roots",
                name
            )));
        }
        Ok(self.roots.iter().map(|root| root.join(relative)).collect())
    }
}

impl ModuleLoader for FsModuleLoader {
    fn resolve(&self, name: &str, referrer: &str) -> Result<ModuleSource, ModuleLoadError> {
        for path in self.candidates(name)? {
            if path.is_file() {
                debug!(module = name, referrer, path = %path.display(), "module found on disk");
                let bytes = std::fs::read(&path)?;
                return Ok(ModuleSource::Compiled(bytes));
            }
        }
        Err(ModuleLoadError::NotFound)
    }
}
