//! Runtime: the top-level engine instance
//!
//! A runtime owns the limits and the host hooks (module loader, worker
//! factory, source compiler) shared by every context created under it.
//! Contexts keep a handle to their runtime, so a runtime's state always
//! outlives them; [`Runtime::destroy`] refuses while any context is alive.

use crate::context::Context;
use crate::error::{DestroyError, EngineError};
use crate::module::ModuleLoader;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Smallest memory limit that can hold a context heap
pub const MIN_HEAP_BYTES: usize = 64 * 1024;

/// Default maximum nesting of script calls
pub const DEFAULT_MAX_STACK_DEPTH: usize = 256;

/// Creates worker contexts on behalf of `os.Worker`
pub type WorkerContextFactory = Arc<dyn Fn(&Runtime) -> Result<Context, EngineError> + Send + Sync>;

/// External compiler used by the dynamic-evaluation capability
pub trait SourceCompiler: Send + Sync {
    /// Compile script-mode source text into unit bytes
    fn compile(&self, source: &str, name: &str) -> Result<Vec<u8>, String>;
}

/// Unique identifier for a runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuntimeId(u64);

impl RuntimeId {
    fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        RuntimeId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Limits applied to a runtime and its contexts
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Heap budget in bytes shared by all contexts (None = unlimited)
    pub memory_limit: Option<usize>,
    /// Maximum number of simultaneously live contexts (None = unlimited)
    pub max_contexts: Option<usize>,
    /// Maximum nesting of script calls
    pub max_stack_depth: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            memory_limit: None,
            max_contexts: None,
            max_stack_depth: DEFAULT_MAX_STACK_DEPTH,
        }
    }
}

pub(crate) struct RuntimeShared {
    pub(crate) id: RuntimeId,
    pub(crate) options: RuntimeOptions,
    live_contexts: AtomicUsize,
    heap_bytes: AtomicUsize,
    peak_heap_bytes: AtomicUsize,
    worker_factory: RwLock<Option<WorkerContextFactory>>,
    module_loader: RwLock<Option<Arc<dyn ModuleLoader>>>,
    source_compiler: RwLock<Option<Arc<dyn SourceCompiler>>>,
}

impl RuntimeShared {
    /// Charge heap bytes; false once the budget is exceeded
    pub(crate) fn charge(&self, bytes: usize) -> bool {
        let total = self.heap_bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;

        let mut peak = self.peak_heap_bytes.load(Ordering::Relaxed);
        while total > peak {
            match self.peak_heap_bytes.compare_exchange_weak(
                peak,
                total,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(p) => peak = p,
            }
        }

        self.options.memory_limit.map_or(true, |limit| total <= limit)
    }

    pub(crate) fn release(&self, bytes: usize) {
        self.heap_bytes.fetch_sub(bytes, Ordering::Relaxed);
    }
}

/// Handle to a runtime; clones refer to the same instance
#[derive(Clone)]
pub struct Runtime {
    shared: Arc<RuntimeShared>,
}

impl Runtime {
    /// Create a runtime with the given limits
    pub fn new(options: RuntimeOptions) -> Result<Self, EngineError> {
        if let Some(limit) = options.memory_limit {
            if limit < MIN_HEAP_BYTES {
                return Err(EngineError::ResourceExhausted(format!(
                    "memory limit of {} bytes is below the minimum heap of {} bytes",
                    limit, MIN_HEAP_BYTES
                )));
            }
        }
        if options.max_contexts == Some(0) {
            return Err(EngineError::ResourceExhausted(
                "max_contexts of 0 leaves no room for a context".to_string(),
            ));
        }

        let shared = Arc::new(RuntimeShared {
            id: RuntimeId::new(),
            options,
            live_contexts: AtomicUsize::new(0),
            heap_bytes: AtomicUsize::new(0),
            peak_heap_bytes: AtomicUsize::new(0),
            worker_factory: RwLock::new(None),
            module_loader: RwLock::new(None),
            source_compiler: RwLock::new(None),
        });
        debug!(runtime = shared.id.as_u64(), "runtime created");
        Ok(Self { shared })
    }

    pub(crate) fn shared(&self) -> &Arc<RuntimeShared> {
        &self.shared
    }

    /// Runtime ID
    pub fn id(&self) -> RuntimeId {
        self.shared.id
    }

    /// Limits this runtime was created with
    pub fn options(&self) -> &RuntimeOptions {
        &self.shared.options
    }

    /// Number of contexts currently alive
    pub fn live_contexts(&self) -> usize {
        self.shared.live_contexts.load(Ordering::Relaxed)
    }

    /// Bytes currently charged by all contexts
    pub fn heap_usage(&self) -> usize {
        self.shared.heap_bytes.load(Ordering::Relaxed)
    }

    /// Highest heap usage seen
    pub fn peak_heap_usage(&self) -> usize {
        self.shared.peak_heap_bytes.load(Ordering::Relaxed)
    }

    /// Install the worker factory, replacing any previous one
    pub fn set_worker_context_factory(&self, factory: WorkerContextFactory) {
        *self.shared.worker_factory.write() = Some(factory);
    }

    /// The installed worker factory
    pub fn worker_context_factory(&self) -> Option<WorkerContextFactory> {
        self.shared.worker_factory.read().clone()
    }

    /// Install the module resolution callback, replacing any previous one
    pub fn set_module_loader(&self, loader: Arc<dyn ModuleLoader>) {
        *self.shared.module_loader.write() = Some(loader);
    }

    /// The installed module loader
    pub fn module_loader(&self) -> Option<Arc<dyn ModuleLoader>> {
        self.shared.module_loader.read().clone()
    }

    /// Install the source compiler used by `eval`
    pub fn set_source_compiler(&self, compiler: Arc<dyn SourceCompiler>) {
        *self.shared.source_compiler.write() = Some(compiler);
    }

    /// The installed source compiler
    pub fn source_compiler(&self) -> Option<Arc<dyn SourceCompiler>> {
        self.shared.source_compiler.read().clone()
    }

    /// Reserve a context slot
    pub(crate) fn acquire_context(&self) -> Result<(), EngineError> {
        let count = self.shared.live_contexts.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(max) = self.shared.options.max_contexts {
            if count > max {
                self.shared.live_contexts.fetch_sub(1, Ordering::Relaxed);
                return Err(EngineError::ResourceExhausted(format!(
                    "runtime already holds the maximum of {} contexts",
                    max
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn release_context(&self) {
        self.shared.live_contexts.fetch_sub(1, Ordering::Relaxed);
    }

    /// Destroy the runtime.
    ///
    /// Fails while contexts created from it are alive, returning the
    /// runtime unchanged inside the error.
    pub fn destroy(self) -> Result<(), DestroyError> {
        let live = self.live_contexts();
        if live > 0 {
            return Err(DestroyError {
                runtime: self,
                live_contexts: live,
            });
        }
        debug!(runtime = self.shared.id.as_u64(), "runtime destroyed");
        Ok(())
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("id", &self.shared.id)
            .field("live_contexts", &self.live_contexts())
            .field("heap_usage", &self.heap_usage())
            .finish()
    }
}
