//! Kiln Runtime
//!
//! Binds the engine to a host process: composes fully configured contexts,
//! provides the std helpers and host modules, reads configuration, and runs
//! a unit through the host lifecycle to an exit status.

pub mod config;
pub mod context_factory;
pub mod demo;
pub mod error;
pub mod extensions;
pub mod fs_loader;
pub mod helpers;
pub mod host;
pub mod logging;

pub use config::{ConfigError, HostConfig};
pub use context_factory::{ContextFactory, NativeExtension};
pub use error::HostError;
pub use fs_loader::FsModuleLoader;
pub use host::{BytesSource, FileSource, Host, HostOutcome, HostState, UnitSource};
