//! Execution contexts
//!
//! Each Context is an isolated realm:
//! - its own global object and intrinsic prototypes
//! - the capability groups installed into it
//! - a module registry, job queue, timer queue and worker slots
//! - heap accounting charged against its runtime
//!
//! A context starts in the [`Phase::Configuring`] phase, during which
//! capability groups and native modules may be installed. The first script
//! execution moves it to [`Phase::Executing`] for the rest of its life.

use crate::capability::{Capability, CapabilitySet};
use crate::error::{EngineError, ScriptFailure};
use crate::heap::Heap;
use crate::jobs::{Job, JobQueue};
use crate::module::ModuleRegistry;
use crate::runtime::Runtime;
use crate::timers::TimerQueue;
use crate::value::{Callable, HostFn, Object, ObjectKind, ObjectRef, ScriptResult, Value};
use crate::worker::{ParentPort, WorkerSlot};
use crate::conv;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::io::Write;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Unique identifier for a Context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        ContextId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Lifecycle phase of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Capabilities and native modules may still be installed
    Configuring,
    /// Script code has run; the installation window is closed
    Executing,
}

/// Destination of `console.log` and `print`
pub trait ConsoleSink: Send + Sync {
    /// Write one line
    fn write_line(&self, line: &str);
}

/// Writes console output to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl ConsoleSink for StdoutSink {
    fn write_line(&self, line: &str) {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        // A closed pipe is not the script's problem
        let _ = writeln!(out, "{}", line);
        let _ = out.flush();
    }
}

/// Collects console output in memory
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines written so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl ConsoleSink for MemorySink {
    fn write_line(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}

/// Error kinds that get their own prototype in every realm
pub(crate) const ERROR_KINDS: [&str; 8] = [
    "TypeError",
    "RangeError",
    "ReferenceError",
    "SyntaxError",
    "EvalError",
    "InternalError",
    "ModuleResolutionError",
    "DataCloneError",
];

/// Prototype objects created with every realm
pub(crate) struct Intrinsics {
    pub(crate) object_proto: ObjectRef,
    pub(crate) function_proto: ObjectRef,
    pub(crate) array_proto: ObjectRef,
    pub(crate) error_proto: ObjectRef,
    pub(crate) error_protos: FxHashMap<&'static str, ObjectRef>,
    pub(crate) string_proto: ObjectRef,
    pub(crate) number_proto: ObjectRef,
    pub(crate) boolean_proto: ObjectRef,
    pub(crate) bigint_proto: ObjectRef,
    pub(crate) date_proto: ObjectRef,
    pub(crate) regexp_proto: ObjectRef,
    pub(crate) map_proto: ObjectRef,
    pub(crate) set_proto: ObjectRef,
    pub(crate) array_buffer_proto: ObjectRef,
    pub(crate) uint8_array_proto: ObjectRef,
    pub(crate) promise_proto: ObjectRef,
}

impl Intrinsics {
    fn new(heap: &mut Heap) -> Self {
        let object_proto = heap.allocate(Object::new(ObjectKind::Ordinary, None));
        let derive = |heap: &mut Heap| {
            heap.allocate(Object::new(ObjectKind::Ordinary, Some(object_proto.clone())))
        };
        let function_proto = derive(heap);
        let array_proto = derive(heap);
        let error_proto = derive(heap);
        let string_proto = derive(heap);
        let number_proto = derive(heap);
        let boolean_proto = derive(heap);
        let bigint_proto = derive(heap);
        let date_proto = derive(heap);
        let regexp_proto = derive(heap);
        let map_proto = derive(heap);
        let set_proto = derive(heap);
        let array_buffer_proto = derive(heap);
        let uint8_array_proto = derive(heap);
        let promise_proto = derive(heap);

        error_proto.set_own("name", Value::from("Error"));
        error_proto.set_own("message", Value::from(""));

        let mut error_protos = FxHashMap::default();
        for kind in ERROR_KINDS {
            let proto = heap.allocate(Object::new(ObjectKind::Ordinary, Some(error_proto.clone())));
            proto.set_own("name", Value::from(kind));
            proto.set_own("message", Value::from(""));
            error_protos.insert(kind, proto);
        }

        Self {
            object_proto,
            function_proto,
            array_proto,
            error_proto,
            error_protos,
            string_proto,
            number_proto,
            boolean_proto,
            bigint_proto,
            date_proto,
            regexp_proto,
            map_proto,
            set_proto,
            array_buffer_proto,
            uint8_array_proto,
            promise_proto,
        }
    }
}

/// An isolated execution realm
pub struct Context {
    id: ContextId,
    runtime: Runtime,
    pub(crate) heap: Heap,
    global: ObjectRef,
    pub(crate) intrinsics: Intrinsics,
    capabilities: CapabilitySet,
    phase: Phase,
    pub(crate) modules: ModuleRegistry,
    pub(crate) jobs: JobQueue,
    pub(crate) timers: TimerQueue,
    pub(crate) workers: Vec<WorkerSlot>,
    pub(crate) parent_port: Option<ParentPort>,
    console: Arc<dyn ConsoleSink>,
    pub(crate) call_depth: usize,
    pub(crate) unit_stack: Vec<Rc<str>>,
    pub(crate) pending_rejections: Vec<ObjectRef>,
    exit_request: Option<i32>,
}

impl Context {
    /// Create an empty realm: a global object and nothing else.
    ///
    /// Fails with `ResourceExhausted` when the runtime is at its context
    /// limit or its heap budget cannot hold another realm.
    pub fn new_raw(runtime: &Runtime) -> Result<Self, EngineError> {
        runtime.acquire_context()?;

        let mut heap = Heap::new(runtime.shared().clone());
        let intrinsics = Intrinsics::new(&mut heap);
        let global = heap.allocate(Object::new(
            ObjectKind::Ordinary,
            Some(intrinsics.object_proto.clone()),
        ));

        let mut context = Self {
            id: ContextId::new(),
            runtime: runtime.clone(),
            heap,
            global,
            intrinsics,
            capabilities: CapabilitySet::none(),
            phase: Phase::Configuring,
            modules: ModuleRegistry::new(),
            jobs: JobQueue::new(),
            timers: TimerQueue::new(),
            workers: Vec::new(),
            parent_port: None,
            console: Arc::new(StdoutSink),
            call_depth: 0,
            unit_stack: Vec::new(),
            pending_rejections: Vec::new(),
            exit_request: None,
        };

        if context.heap.take_exhausted() {
            return Err(EngineError::ResourceExhausted(
                "heap budget cannot hold a new context".to_string(),
            ));
        }

        debug!(
            context = context.id.as_u64(),
            runtime = runtime.id().as_u64(),
            "context created"
        );
        Ok(context)
    }

    /// Context ID
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Owning runtime
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// The global object
    pub fn global(&self) -> ObjectRef {
        self.global.clone()
    }

    /// Capability groups installed so far
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub(crate) fn mark_installed(&mut self, capability: Capability) {
        self.capabilities.set(capability, true);
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the installation window is still open
    pub fn is_configuring(&self) -> bool {
        self.phase == Phase::Configuring
    }

    /// Close the installation window
    pub(crate) fn enter_execution(&mut self) {
        if self.phase == Phase::Configuring {
            self.phase = Phase::Executing;
            debug!(context = self.id.as_u64(), "installation window closed");
        }
    }

    /// Replace the console sink
    pub fn set_console(&mut self, console: Arc<dyn ConsoleSink>) {
        self.console = console;
    }

    /// The console sink
    pub fn console(&self) -> Arc<dyn ConsoleSink> {
        self.console.clone()
    }

    /// Bytes this context has charged against the runtime
    pub fn heap_charged(&self) -> usize {
        self.heap.charged()
    }

    /// Number of objects still reachable from somewhere
    pub fn live_objects(&self) -> usize {
        self.heap.live_objects()
    }

    // ────────────────────────────────────────────────────────────────
    // Allocation
    // ────────────────────────────────────────────────────────────────

    pub(crate) fn alloc(&mut self, kind: ObjectKind, proto: Option<ObjectRef>) -> ObjectRef {
        self.heap.allocate(Object::new(kind, proto))
    }

    /// Create a plain object
    pub fn new_object(&mut self) -> ObjectRef {
        let proto = self.intrinsics.object_proto.clone();
        self.alloc(ObjectKind::Ordinary, Some(proto))
    }

    /// Create an array
    pub fn new_array(&mut self, items: Vec<Value>) -> ObjectRef {
        let proto = self.intrinsics.array_proto.clone();
        self.alloc(ObjectKind::Array(items), Some(proto))
    }

    /// Create a function implemented by the host
    pub fn new_function<F>(&mut self, name: &str, f: F) -> ObjectRef
    where
        F: Fn(&mut Context, &Value, &[Value]) -> ScriptResult + 'static,
    {
        let f: HostFn = Rc::new(f);
        self.new_callable(name, Callable::Host(f))
    }

    pub(crate) fn new_callable(&mut self, name: &str, callable: Callable) -> ObjectRef {
        let proto = self.intrinsics.function_proto.clone();
        let function = self.alloc(ObjectKind::Function(callable), Some(proto));
        function.set_own("name", Value::from(name));
        function
    }

    /// Create a module namespace object
    pub(crate) fn new_namespace(&mut self) -> ObjectRef {
        self.alloc(ObjectKind::Namespace, None)
    }

    /// Create an error object of the given kind (`TypeError`, ...)
    pub fn make_error(&mut self, kind: &str, message: &str) -> Value {
        let proto = self
            .intrinsics
            .error_protos
            .get(kind)
            .cloned()
            .unwrap_or_else(|| self.intrinsics.error_proto.clone());
        let error = self.alloc(ObjectKind::Error, Some(proto));
        error.set_own("message", Value::from(message));
        Value::Object(error)
    }

    /// Convert a thrown value into a host-side failure record
    pub fn failure_of(&self, thrown: &Value) -> ScriptFailure {
        if let Value::Object(o) = thrown {
            if matches!(o.borrow().kind, ObjectKind::Error) {
                let name = conv::chain_get(o, "name")
                    .map(|v| conv::to_string(&v))
                    .unwrap_or_else(|| "Error".to_string());
                let message = conv::chain_get(o, "message")
                    .map(|v| conv::to_string(&v))
                    .unwrap_or_default();
                return ScriptFailure::new(name, message);
            }
        }
        ScriptFailure::new("", conv::to_string(thrown))
    }

    // ────────────────────────────────────────────────────────────────
    // Globals
    // ────────────────────────────────────────────────────────────────

    /// Define a global binding
    pub fn set_global(&mut self, name: &str, value: Value) {
        self.global.set_own(name, value);
    }

    /// Read a global binding
    pub fn get_global(&self, name: &str) -> Option<Value> {
        conv::chain_get(&self.global, name)
    }

    // ────────────────────────────────────────────────────────────────
    // Jobs and exit requests
    // ────────────────────────────────────────────────────────────────

    /// Append a job to the queue
    pub fn enqueue_job(&mut self, job: Job) {
        self.jobs.push(job);
    }

    /// Append a job that calls `function` with `this` and `args`
    pub fn enqueue_call(&mut self, function: Value, this: Value, args: Vec<Value>) {
        self.jobs.push(Job::call(function, this, args));
    }

    /// Number of jobs waiting
    pub fn pending_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Number of timers waiting
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Record that the script asked the host to exit with `code`
    pub fn request_exit(&mut self, code: i32) {
        debug!(context = self.id.as_u64(), code, "exit requested");
        self.exit_request = Some(code);
    }

    /// Exit status requested by the script, if any
    pub fn exit_request(&self) -> Option<i32> {
        self.exit_request
    }

    /// Name of the unit whose code is running, used as the referrer for
    /// relative module names
    pub fn current_unit(&self) -> Option<Rc<str>> {
        self.unit_stack.last().cloned()
    }

    /// Tear the context down: pending jobs and timers are discarded
    /// unexecuted, workers are destroyed, the heap budget is returned.
    pub fn destroy(self) {
        drop(self);
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        let discarded = self.jobs.len() + self.timers.len();
        if discarded > 0 {
            warn!(
                context = self.id.as_u64(),
                discarded, "discarding pending jobs and timers at teardown"
            );
        }
        self.jobs.clear();
        self.timers.clear();
        self.workers.clear();
        self.parent_port = None;
        self.pending_rejections.clear();
        self.heap.teardown();
        self.runtime.release_context();
        debug!(context = self.id.as_u64(), "context destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimeOptions;

    fn runtime() -> Runtime {
        Runtime::new(RuntimeOptions::default()).unwrap()
    }

    #[test]
    fn test_new_raw_is_empty() {
        let rt = runtime();
        let ctx = Context::new_raw(&rt).unwrap();
        assert!(ctx.is_configuring());
        assert!(ctx.global().borrow().props.is_empty());
        assert_eq!(*ctx.capabilities(), CapabilitySet::none());
        assert_eq!(rt.live_contexts(), 1);
    }

    #[test]
    fn test_destroy_releases_runtime() {
        let rt = runtime();
        let ctx = Context::new_raw(&rt).unwrap();
        assert!(rt.heap_usage() > 0);
        ctx.destroy();
        assert_eq!(rt.live_contexts(), 0);
        assert_eq!(rt.heap_usage(), 0);
        assert!(rt.destroy().is_ok());
    }

    #[test]
    fn test_context_limit() {
        let rt = Runtime::new(RuntimeOptions {
            max_contexts: Some(1),
            ..Default::default()
        })
        .unwrap();
        let first = Context::new_raw(&rt).unwrap();
        assert!(matches!(
            Context::new_raw(&rt),
            Err(EngineError::ResourceExhausted(_))
        ));
        drop(first);
        assert!(Context::new_raw(&rt).is_ok());
    }

    #[test]
    fn test_failure_of_error_and_plain_value() {
        let rt = runtime();
        let mut ctx = Context::new_raw(&rt).unwrap();
        let err = ctx.make_error("TypeError", "x is not a function");
        assert_eq!(
            ctx.failure_of(&err).to_string(),
            "TypeError: x is not a function"
        );
        assert_eq!(ctx.failure_of(&Value::Number(7.0)).to_string(), "7");
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemorySink::new();
        let writer: Arc<dyn ConsoleSink> = Arc::new(sink.clone());
        writer.write_line("one");
        writer.write_line("two");
        assert_eq!(sink.lines(), vec!["one", "two"]);
    }
}
