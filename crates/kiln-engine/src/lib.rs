//! Kiln Engine
//!
//! Embeds the Kiln scripting engine into a host process:
//! - [`Runtime`]: memory budget, stack limit and host hooks shared by contexts
//! - [`Context`]: one realm with its own globals, job queue and timers
//! - [`CapabilityRegistrar`]: installs groups of built-ins before execution
//! - [`BytecodeLoader`]: verifies units and runs their top level
//! - Module resolution with a per-context cache, plus native modules
//! - [`JobLoop`]: drains promise jobs, timers and worker messages
//!
//! Script exceptions are plain [`Value`]s carried by [`ScriptResult`]; they
//! turn into an [`EngineError`] only when they escape to the host.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod capability;
mod context;
pub mod conv;
mod error;
mod heap;
mod interpreter;
mod jobs;
mod loader;
mod module;
mod native;
mod ops;
mod runtime;
mod timers;
mod value;
mod worker;

pub use capability::{Capability, CapabilityRegistrar, CapabilitySet};
pub use context::{ConsoleSink, Context, ContextId, MemorySink, Phase, StdoutSink};
pub use error::{DestroyError, EngineError, ScriptFailure, UnitRejection};
pub use interpreter::Closure;
pub use jobs::{DrainReport, Job, JobLoop};
pub use loader::{BytecodeLoader, CompiledUnit, EvalFlags, ExecutionResult, LoadOptions};
pub use module::{normalize_specifier, ModuleLoadError, ModuleLoader, ModuleSource};
pub use native::InitPolicy;
pub use runtime::{
    Runtime, RuntimeId, RuntimeOptions, SourceCompiler, WorkerContextFactory, DEFAULT_MAX_STACK_DEPTH,
    MIN_HEAP_BYTES,
};
pub use value::{ByteStore, ByteView, Callable, HostFn, MapKey, Object, ObjectKind, ObjectRef, RegExpData, ScriptResult, Value};
pub use timers::MAX_TIMER_DELAY;
pub use worker::{spawn_worker, ClonedValue};
