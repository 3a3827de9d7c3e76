//! Bytecode loading and binding
//!
//! Loading decodes and verifies a unit completely before anything runs.
//! The resulting [`CompiledUnit`] is an immutable image behind an `Arc`;
//! binding it to a context creates fresh unit-level state for that context.

use crate::context::{Context, ContextId};
use crate::error::{EngineError, UnitRejection};
use crate::interpreter::{Closure, UnitEnv};
use crate::value::{Callable, ObjectRef, Value};
use kiln_bytecode::{verify_unit, Unit};
use num_bigint::BigInt;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

/// Decoded, verified unit plus constants materialised for execution
pub(crate) struct UnitImage {
    pub(crate) unit: Unit,
    pub(crate) bigints: Vec<BigInt>,
}

impl UnitImage {
    pub(crate) fn prepare(unit: Unit) -> Result<Self, UnitRejection> {
        verify_unit(&unit)?;
        let bigints = unit
            .constants
            .bigints
            .iter()
            .map(|literal| {
                literal
                    .parse::<BigInt>()
                    .map_err(|_| UnitRejection::BigIntLiteral(literal.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { unit, bigints })
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, UnitRejection> {
        Self::prepare(Unit::decode(bytes)?)
    }
}

/// Options applied while loading
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Override the unit's shareable flag
    pub shareable: Option<bool>,
}

/// Evaluation mode requested by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalFlags {
    module: bool,
}

impl EvalFlags {
    /// Module mode: unit-local bindings, imports and exports
    pub fn module() -> Self {
        Self { module: true }
    }

    /// Script mode: top-level bindings live on the global object
    pub fn script() -> Self {
        Self { module: false }
    }

    /// Whether module mode was requested
    pub fn is_module(&self) -> bool {
        self.module
    }

    fn describe(module: bool) -> &'static str {
        if module {
            "module"
        } else {
            "script"
        }
    }
}

/// Outcome of running a unit's top level
#[derive(Debug)]
pub struct ExecutionResult {
    /// Completion value of the top level
    pub value: Value,
    /// The unit's namespace in module mode
    pub namespace: Option<ObjectRef>,
}

/// A loaded unit, ready to be bound to contexts
#[derive(Clone)]
pub struct CompiledUnit {
    image: Arc<UnitImage>,
    shareable: bool,
    bindings: Arc<Mutex<FxHashSet<ContextId>>>,
}

impl CompiledUnit {
    /// Name recorded in the unit
    pub fn name(&self) -> &str {
        &self.image.unit.name
    }

    /// Whether the unit was compiled in module mode
    pub fn is_module(&self) -> bool {
        self.image.unit.is_module()
    }

    /// Whether the unit may be bound to more than one context
    pub fn is_shareable(&self) -> bool {
        self.shareable
    }

    /// The evaluation mode the unit was compiled for
    pub fn eval_flags(&self) -> EvalFlags {
        if self.is_module() {
            EvalFlags::module()
        } else {
            EvalFlags::script()
        }
    }

    /// Module specifiers the unit imports
    pub fn imports(&self) -> &[String] {
        &self.image.unit.imports
    }

    fn bind(&self, context: ContextId) -> Result<(), EngineError> {
        let mut bound = self.bindings.lock();
        if bound.contains(&context) {
            return Err(EngineError::InvariantViolation(format!(
                "unit '{}' already ran in context #{}",
                self.name(),
                context.as_u64()
            )));
        }
        if !self.shareable {
            if let Some(owner) = bound.iter().next() {
                return Err(EngineError::InvariantViolation(format!(
                    "unit '{}' is not shareable and is bound to context #{}",
                    self.name(),
                    owner.as_u64()
                )));
            }
        }
        bound.insert(context);
        Ok(())
    }
}

impl fmt::Debug for CompiledUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledUnit")
            .field("name", &self.name())
            .field("module", &self.is_module())
            .field("shareable", &self.shareable)
            .field("functions", &self.image.unit.functions.len())
            .finish()
    }
}

/// Why running a unit stopped early
pub(crate) enum RunError {
    Engine(EngineError),
    Thrown(Value),
}

/// Loads units and runs them in contexts
pub struct BytecodeLoader;

impl BytecodeLoader {
    /// Decode and verify unit bytes
    pub fn load(bytes: &[u8]) -> Result<CompiledUnit, EngineError> {
        Self::load_with(bytes, LoadOptions::default())
    }

    /// Decode and verify unit bytes with options
    pub fn load_with(bytes: &[u8], options: LoadOptions) -> Result<CompiledUnit, EngineError> {
        let image = UnitImage::from_bytes(bytes)?;
        Ok(Self::finish(image, options))
    }

    /// Verify an in-memory unit, e.g. one assembled with `UnitBuilder`
    pub fn from_unit(unit: Unit, options: LoadOptions) -> Result<CompiledUnit, EngineError> {
        let image = UnitImage::prepare(unit)?;
        Ok(Self::finish(image, options))
    }

    fn finish(image: UnitImage, options: LoadOptions) -> CompiledUnit {
        let shareable = options.shareable.unwrap_or_else(|| image.unit.is_shareable());
        debug!(
            unit = %image.unit.name,
            module = image.unit.is_module(),
            shareable,
            functions = image.unit.functions.len(),
            "unit loaded"
        );
        CompiledUnit {
            image: Arc::new(image),
            shareable,
            bindings: Arc::new(Mutex::new(FxHashSet::default())),
        }
    }

    /// Bind `unit` to `ctx` and run its top level.
    ///
    /// Jobs queued by the top level stay queued; draining them is the
    /// job loop's business.
    pub fn bind_and_run(
        unit: &CompiledUnit,
        ctx: &mut Context,
        flags: EvalFlags,
    ) -> Result<ExecutionResult, EngineError> {
        if flags.is_module() != unit.is_module() {
            return Err(UnitRejection::ModeMismatch {
                name: unit.name().to_string(),
                compiled: EvalFlags::describe(unit.is_module()),
                requested: EvalFlags::describe(flags.is_module()),
            }
            .into());
        }
        unit.bind(ctx.id())?;

        debug!(
            unit = unit.name(),
            context = ctx.id().as_u64(),
            "running top level"
        );
        let module_name = unit.is_module().then(|| Rc::from(unit.name()));
        match ctx.run_unit(&unit.image, module_name) {
            Ok(result) => Ok(result),
            Err(RunError::Engine(err)) => Err(err),
            Err(RunError::Thrown(thrown)) => {
                Err(EngineError::UncaughtScriptFailure(ctx.failure_of(&thrown)))
            }
        }
    }
}

impl Context {
    /// Run a unit's top level.
    ///
    /// In module mode the namespace is registered under `module_name`
    /// before any code runs, so cyclic imports see the partial namespace.
    pub(crate) fn run_unit(
        &mut self,
        image: &Arc<UnitImage>,
        module_name: Option<Rc<str>>,
    ) -> Result<ExecutionResult, RunError> {
        self.enter_execution();

        let (name, namespace) = match module_name {
            Some(name) => {
                let namespace = self.new_namespace();
                self.modules
                    .begin_evaluation(&name, namespace.clone())
                    .map_err(RunError::Engine)?;
                (name, Some(namespace))
            }
            None => (Rc::from(image.unit.name.as_str()), None),
        };
        let is_module = namespace.is_some();

        let env = Rc::new(UnitEnv::new(image.clone(), name.clone(), namespace.clone()));
        let closure = Rc::new(Closure { env, function: 0 });
        let result = self.invoke(Callable::Bytecode(closure), &Value::Undefined, &[]);

        match result {
            Ok(value) => {
                if is_module {
                    self.modules.finish_evaluation(&name);
                }
                Ok(ExecutionResult { value, namespace })
            }
            Err(thrown) => {
                if is_module {
                    let reason = self.failure_of(&thrown).to_string();
                    self.modules.fail(&name, reason);
                }
                Err(RunError::Thrown(thrown))
            }
        }
    }
}
