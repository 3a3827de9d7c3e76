//! Context composition
//!
//! A [`ContextFactory`] turns a runtime into a fully configured context:
//! capability groups first, then the std helpers and host modules, then
//! the native extensions. Workers are built by the same factory so they
//! see the same capabilities and modules as the primary context.

use crate::config::{ConfigError, HostConfig};
use crate::extensions;
use crate::helpers;
use kiln_engine::{
    CapabilityRegistrar, CapabilitySet, ConsoleSink, Context, EngineError, InitPolicy, Runtime, StdoutSink,
    WorkerContextFactory,
};
use kiln_sdk::ModuleInit;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A native module bound into every context the factory creates
#[derive(Clone)]
pub struct NativeExtension {
    /// Name scripts import
    pub name: String,
    /// Fills in the module's exports
    pub init: ModuleInit,
    /// When `init` runs
    pub policy: InitPolicy,
}

impl fmt::Debug for NativeExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeExtension")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish()
    }
}

/// Builds configured contexts
#[derive(Clone)]
pub struct ContextFactory {
    capabilities: CapabilitySet,
    native_modules: Vec<NativeExtension>,
    helpers: bool,
    args: Vec<String>,
    console: Arc<dyn ConsoleSink>,
}

impl ContextFactory {
    /// Factory installing `capabilities` and the std helpers, writing
    /// console output to stdout
    pub fn new(capabilities: CapabilitySet) -> Self {
        Self {
            capabilities,
            native_modules: Vec::new(),
            helpers: true,
            args: Vec::new(),
            console: Arc::new(StdoutSink),
        }
    }

    /// Factory for the capabilities and native modules in `config`
    pub fn from_config(config: &HostConfig) -> Result<Self, ConfigError> {
        let mut factory = Self::new(config.capabilities);
        for module in &config.native_modules {
            let init = extensions::lookup(&module.extension)
                .ok_or_else(|| ConfigError::UnknownExtension(module.extension.clone()))?;
            let policy = if module.lazy {
                InitPolicy::Lazy
            } else {
                InitPolicy::Eager
            };
            factory = factory.with_native_module(&module.name, init, policy);
        }
        Ok(factory)
    }

    /// Bind a native module under `name`
    pub fn with_native_module(mut self, name: &str, init: ModuleInit, policy: InitPolicy) -> Self {
        self.native_modules.push(NativeExtension {
            name: name.to_string(),
            init,
            policy,
        });
        self
    }

    /// Install `console`, `print`, `scriptArgs` and the `std`/`os` modules
    pub fn with_helpers(mut self, enabled: bool) -> Self {
        self.helpers = enabled;
        self
    }

    /// Arguments exposed as `scriptArgs`
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Where `console.log` output goes
    pub fn with_console(mut self, console: Arc<dyn ConsoleSink>) -> Self {
        self.console = console;
        self
    }

    /// Capability groups installed by this factory
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Create and compose a context under `runtime`.
    ///
    /// On failure the partly built context is dropped, which releases its
    /// slot in the runtime.
    pub fn create(&self, runtime: &Runtime) -> Result<Context, EngineError> {
        let mut ctx = Context::new_raw(runtime)?;
        CapabilityRegistrar::install(&mut ctx, &self.capabilities)?;
        ctx.set_console(self.console.clone());
        if self.helpers {
            helpers::install(&mut ctx, &self.args)?;
        }
        for module in &self.native_modules {
            ctx.register_native_module(&module.name, module.init.clone(), module.policy)?;
        }
        debug!(
            context = ctx.id().as_u64(),
            natives = self.native_modules.len(),
            "context composed"
        );
        Ok(ctx)
    }

    /// Worker factory reproducing this configuration.
    ///
    /// Workers get an empty `scriptArgs`.
    pub fn into_worker_factory(self) -> WorkerContextFactory {
        let factory = self.with_args(Vec::new());
        Arc::new(move |runtime: &Runtime| factory.create(runtime))
    }
}

impl fmt::Debug for ContextFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextFactory")
            .field("capabilities", &self.capabilities)
            .field("native_modules", &self.native_modules)
            .field("helpers", &self.helpers)
            .field("args", &self.args)
            .finish()
    }
}
