//! Host configuration
//!
//! Read from a TOML file named by `KILN_CONFIG`. Every section and field
//! has a default, so an empty file (or no file) gives the reference setup:
//! all capability groups, no limits, and the `fib` extension registered as
//! `examples/fib.so`.
//!
//! ```toml
//! [capabilities]
//! eval = false
//!
//! [limits]
//! memory_limit = 67108864
//!
//! [modules]
//! roots = ["lib", "."]
//!
//! [[native_modules]]
//! name = "examples/fib.so"
//! extension = "fib"
//! ```

use crate::extensions;
use kiln_engine::{CapabilitySet, RuntimeOptions, DEFAULT_MAX_STACK_DEPTH};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "KILN_CONFIG";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Cannot read config '{}': {source}", path.display())]
    Read {
        /// Config path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The file is not valid TOML or has unknown keys
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A native module names an extension this host does not provide
    #[error("Unknown native extension '{0}'")]
    UnknownExtension(String),

    /// Two native modules share a name
    #[error("Native module '{0}' is configured twice")]
    DuplicateModule(String),
}

/// Top-level host configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Capability groups installed into every context
    pub capabilities: CapabilitySet,
    /// Runtime limits
    pub limits: LimitsConfig,
    /// Log output
    pub logging: LoggingConfig,
    /// Module resolution from disk
    pub modules: ModulesConfig,
    /// Native extensions bound into every context
    pub native_modules: Vec<NativeModuleConfig>,
    /// Unit loading policy
    pub unit: UnitConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            capabilities: CapabilitySet::reference(),
            limits: LimitsConfig::default(),
            logging: LoggingConfig::default(),
            modules: ModulesConfig::default(),
            native_modules: vec![NativeModuleConfig {
                name: "examples/fib.so".to_string(),
                extension: "fib".to_string(),
                lazy: false,
            }],
            unit: UnitConfig::default(),
        }
    }
}

/// `[limits]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Heap budget in bytes shared by all contexts
    pub memory_limit: Option<usize>,
    /// Maximum number of live contexts, workers included
    pub max_contexts: Option<usize>,
    /// Maximum nesting of script calls
    pub max_stack_depth: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            memory_limit: None,
            max_contexts: None,
            max_stack_depth: DEFAULT_MAX_STACK_DEPTH,
        }
    }
}

impl LimitsConfig {
    /// Runtime options carrying these limits
    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            memory_limit: self.memory_limit,
            max_contexts: self.max_contexts,
            max_stack_depth: self.max_stack_depth,
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter used when `KILN_LOG` is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// `[modules]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModulesConfig {
    /// Directories searched, in order, for imported units
    pub roots: Vec<PathBuf>,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from(".")],
        }
    }
}

/// One `[[native_modules]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NativeModuleConfig {
    /// Name scripts import
    pub name: String,
    /// Built-in extension providing the module
    pub extension: String,
    /// Run the extension's init on first import instead of at composition
    #[serde(default)]
    pub lazy: bool,
}

/// `[unit]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UnitConfig {
    /// Override the shareable flag recorded in the unit
    pub shareable: Option<bool>,
}

impl HostConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: HostConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load the file named by `KILN_CONFIG`, or the defaults when it is unset
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::load(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }

    /// Check native module entries against the available extensions
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen: Vec<&str> = Vec::new();
        for module in &self.native_modules {
            if extensions::lookup(&module.extension).is_none() {
                return Err(ConfigError::UnknownExtension(module.extension.clone()));
            }
            if seen.contains(&module.name.as_str()) {
                return Err(ConfigError::DuplicateModule(module.name.clone()));
            }
            seen.push(&module.name);
        }
        Ok(())
    }
}
