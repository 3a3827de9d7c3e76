//! Host entry point
//!
//! [`Host::run`] drives one unit through the host lifecycle:
//!
//! ```text
//! Created → RuntimeReady → ContextReady → Loaded → Executing → Draining → Terminated
//! ```
//!
//! Every state is entered at most once and in this order. A failure while
//! building the runtime, composing the context or loading the unit jumps
//! straight to `Terminated`; whatever was acquired is released context
//! first, runtime second.

use crate::config::HostConfig;
use crate::context_factory::ContextFactory;
use crate::error::HostError;
use crate::fs_loader::FsModuleLoader;
use kiln_engine::{
    BytecodeLoader, ConsoleSink, EngineError, JobLoop, LoadOptions, Runtime, ScriptFailure,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Lifecycle states of a host run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HostState {
    /// Nothing acquired yet
    Created,
    /// Runtime built and hooks installed
    RuntimeReady,
    /// Primary context composed
    ContextReady,
    /// Unit verified
    Loaded,
    /// Top level running
    Executing,
    /// Job loop running
    Draining,
    /// Everything released
    Terminated,
}

/// Where unit bytes come from
pub trait UnitSource {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// The encoded unit
    fn bytes(&self) -> Result<Vec<u8>, HostError>;

    /// Directory searched first for the unit's imports
    fn base_dir(&self) -> Option<PathBuf> {
        None
    }
}

/// Unit bytes already in memory
#[derive(Debug, Clone)]
pub struct BytesSource {
    name: String,
    bytes: Vec<u8>,
}

impl BytesSource {
    /// Wrap `bytes` under a diagnostic `name`
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

impl UnitSource for BytesSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn bytes(&self) -> Result<Vec<u8>, HostError> {
        Ok(self.bytes.clone())
    }
}

/// A unit file on disk
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    name: String,
}

impl FileSource {
    /// Source reading `path` when the host loads it
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self { path, name }
    }

    /// Path of the unit file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UnitSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn bytes(&self) -> Result<Vec<u8>, HostError> {
        std::fs::read(&self.path).map_err(|source| HostError::ReadUnit {
            path: self.path.clone(),
            source,
        })
    }

    fn base_dir(&self) -> Option<PathBuf> {
        self.path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }
}

/// Result of [`Host::run`]
#[derive(Debug)]
pub struct HostOutcome {
    /// Process exit status
    pub status: i32,
    /// Last state entered before `Terminated`
    pub reached: HostState,
    /// Exceptions that escaped jobs during draining
    pub failures: Vec<ScriptFailure>,
    /// The failure that ended the run early, if any
    pub error: Option<HostError>,
}

impl HostOutcome {
    /// Whether the run drained cleanly with status 0
    pub fn is_success(&self) -> bool {
        self.status == 0 && self.error.is_none()
    }
}

/// What a run that got past loading produced
struct Completion {
    status: i32,
    failures: Vec<ScriptFailure>,
}

struct Progress<'a> {
    unit: &'a str,
    state: HostState,
}

impl<'a> Progress<'a> {
    fn new(unit: &'a str) -> Self {
        Self {
            unit,
            state: HostState::Created,
        }
    }

    fn advance(&mut self, next: HostState) {
        debug_assert!(next > self.state, "{:?} -> {:?}", self.state, next);
        debug!(unit = self.unit, from = ?self.state, to = ?next, "host state");
        self.state = next;
    }
}

/// Runs units under a [`HostConfig`]
pub struct Host {
    config: HostConfig,
    console: Option<Arc<dyn ConsoleSink>>,
}

impl Host {
    /// Host for `config`, printing console output to stdout
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            console: None,
        }
    }

    /// Send console output of every context, workers included, to `console`
    pub fn with_console(mut self, console: Arc<dyn ConsoleSink>) -> Self {
        self.console = Some(console);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Load `source`, run its top level and drain the job loop.
    ///
    /// `args` become the unit's `scriptArgs`.
    pub fn run(&self, source: &dyn UnitSource, args: &[String]) -> HostOutcome {
        let mut progress = Progress::new(source.name());
        info!(unit = source.name(), "host starting");

        let result = match Runtime::new(self.config.limits.runtime_options()) {
            Ok(runtime) => {
                let result = self.run_in(&runtime, source, args, &mut progress);
                // The context is gone by now; a live one here is a host bug
                match runtime.destroy() {
                    Ok(()) => result,
                    Err(err) => result.and(Err(EngineError::from(err).into())),
                }
            }
            Err(err) => Err(err.into()),
        };

        let reached = progress.state;
        progress.advance(HostState::Terminated);

        let outcome = match result {
            Ok(done) => HostOutcome {
                status: done.status,
                reached,
                failures: done.failures,
                error: None,
            },
            Err(err) => HostOutcome {
                status: err.exit_status(),
                reached,
                failures: Vec::new(),
                error: Some(err),
            },
        };
        info!(
            unit = source.name(),
            status = outcome.status,
            reached = ?outcome.reached,
            job_failures = outcome.failures.len(),
            "host finished"
        );
        outcome
    }

    fn run_in(
        &self,
        runtime: &Runtime,
        source: &dyn UnitSource,
        args: &[String],
        progress: &mut Progress<'_>,
    ) -> Result<Completion, HostError> {
        let roots = source
            .base_dir()
            .into_iter()
            .chain(self.config.modules.roots.iter().cloned())
            .collect();
        runtime.set_module_loader(Arc::new(FsModuleLoader::new(roots)));

        let mut factory = ContextFactory::from_config(&self.config)?.with_args(args.to_vec());
        if let Some(console) = &self.console {
            factory = factory.with_console(console.clone());
        }
        runtime.set_worker_context_factory(factory.clone().into_worker_factory());
        progress.advance(HostState::RuntimeReady);

        let mut ctx = factory.create(runtime)?;
        progress.advance(HostState::ContextReady);

        let bytes = source.bytes()?;
        let options = LoadOptions {
            shareable: self.config.unit.shareable,
        };
        let unit = BytecodeLoader::load_with(&bytes, options)?;
        progress.advance(HostState::Loaded);

        progress.advance(HostState::Executing);
        BytecodeLoader::bind_and_run(&unit, &mut ctx, unit.eval_flags())?;

        progress.advance(HostState::Draining);
        let report = JobLoop::drain(&mut ctx);
        let status = ctx.exit_request().unwrap_or(0);
        ctx.destroy();

        Ok(Completion {
            status,
            failures: report.failures,
        })
    }
}
