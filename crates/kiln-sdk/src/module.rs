//! Native module definition

use crate::convert::{FromNative, ToNative};
use crate::error::NativeResult;
use crate::value::NativeValue;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Native function signature.
///
/// Receives the call arguments (missing arguments are not padded) and
/// returns a value or an error that the engine raises as a script exception.
pub type NativeFn = Arc<dyn Fn(&[NativeValue]) -> NativeResult<NativeValue> + Send + Sync>;

/// Module initializer.
///
/// Called at most once per context with an empty module named after the
/// registration; it fills in functions and values.
pub type ModuleInit = Arc<dyn Fn(&mut NativeModule) -> NativeResult<()> + Send + Sync>;

/// Native module definition.
///
/// Function and value tables keep registration order, which is the order
/// exports appear in the module namespace.
#[derive(Clone)]
pub struct NativeModule {
    name: String,
    version: String,
    functions: IndexMap<String, NativeFn>,
    values: IndexMap<String, NativeValue>,
}

impl NativeModule {
    /// Create a new native module.
    ///
    /// # Arguments
    /// * `name` - Module name as scripts import it (e.g. "examples/fib.so")
    /// * `version` - Semantic version (e.g. "1.0.0")
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        NativeModule {
            name: name.into(),
            version: version.into(),
            functions: IndexMap::new(),
            values: IndexMap::new(),
        }
    }

    /// Run an initializer against a fresh module
    pub fn from_init(name: impl Into<String>, init: &ModuleInit) -> NativeResult<Self> {
        let mut module = NativeModule::new(name, "0.0.0");
        init(&mut module)?;
        Ok(module)
    }

    /// Register an untyped function
    pub fn register_function<F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(&[NativeValue]) -> NativeResult<NativeValue> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(func));
        self
    }

    /// Register a function without arguments
    pub fn function0<R, F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        R: ToNative,
        F: Fn() -> R + Send + Sync + 'static,
    {
        self.register_function(name, move |_args| Ok(func().to_native()))
    }

    /// Register a one-argument function with typed conversion
    pub fn function1<A, R, F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        A: FromNative,
        R: ToNative,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        self.register_function(name, move |args| {
            let a = A::from_native(arg(args, 0))?;
            Ok(func(a).to_native())
        })
    }

    /// Register a two-argument function with typed conversion
    pub fn function2<A, B, R, F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        A: FromNative,
        B: FromNative,
        R: ToNative,
        F: Fn(A, B) -> R + Send + Sync + 'static,
    {
        self.register_function(name, move |args| {
            let a = A::from_native(arg(args, 0))?;
            let b = B::from_native(arg(args, 1))?;
            Ok(func(a, b).to_native())
        })
    }

    /// Export a constant value
    pub fn register_value(&mut self, name: impl Into<String>, value: NativeValue) -> &mut Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Set the module version
    pub fn set_version(&mut self, version: impl Into<String>) -> &mut Self {
        self.version = version.into();
        self
    }

    /// Get module name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get module version
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Get function by name
    pub fn get_function(&self, name: &str) -> Option<NativeFn> {
        self.functions.get(name).cloned()
    }

    /// Registered functions in registration order
    pub fn functions(&self) -> impl Iterator<Item = (&str, &NativeFn)> {
        self.functions.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Exported constants in registration order
    pub fn values(&self) -> impl Iterator<Item = (&str, &NativeValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Get all function names
    pub fn function_names(&self) -> Vec<&str> {
        self.functions.keys().map(|s| s.as_str()).collect()
    }

    /// Get number of registered functions
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }
}

static UNDEFINED: NativeValue = NativeValue::Undefined;

fn arg(args: &[NativeValue], index: usize) -> &NativeValue {
    args.get(index).unwrap_or(&UNDEFINED)
}

impl fmt::Debug for NativeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeModule")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("functions", &self.function_names())
            .field("values", &self.values)
            .finish()
    }
}
