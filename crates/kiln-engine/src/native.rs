//! Native extension binding
//!
//! Host modules written against `kiln-sdk` are bound into a context's
//! module namespace. Only primitives cross the boundary; an object argument
//! is a `TypeError` at the call site.

use crate::context::Context;
use crate::error::EngineError;
use crate::value::{ObjectRef, Value};
use kiln_sdk::{ModuleInit, NativeError, NativeModule, NativeValue};
use num_traits::ToPrimitive;
use tracing::debug;

/// When a native module's init function runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitPolicy {
    /// At registration, so init failures surface during composition
    #[default]
    Eager,
    /// On first import
    Lazy,
}

fn to_native(value: &Value) -> Result<NativeValue, String> {
    match value {
        Value::Undefined => Ok(NativeValue::Undefined),
        Value::Null => Ok(NativeValue::Null),
        Value::Bool(b) => Ok(NativeValue::Bool(*b)),
        Value::Number(n) => Ok(NativeValue::number(*n)),
        Value::String(s) => Ok(NativeValue::String(s.to_string())),
        Value::BigInt(b) => b
            .to_i64()
            .map(NativeValue::Int)
            .ok_or_else(|| "BigInt argument does not fit in 64 bits".to_string()),
        Value::Object(_) => Err("objects cannot be passed to native functions".to_string()),
    }
}

fn from_native(value: NativeValue) -> Value {
    match value {
        NativeValue::Undefined => Value::Undefined,
        NativeValue::Null => Value::Null,
        NativeValue::Bool(b) => Value::Bool(b),
        NativeValue::Int(i) => Value::Number(i as f64),
        NativeValue::Float(f) => Value::Number(f),
        NativeValue::String(s) => Value::from(s),
    }
}

impl Context {
    /// Register a native module under `name`.
    ///
    /// Only allowed while the context is still being configured. With
    /// [`InitPolicy::Eager`] the init function runs now and its failure is
    /// returned as `NativeModuleInit`; with [`InitPolicy::Lazy`] it runs on
    /// first import. It never runs more than once per context.
    pub fn register_native_module(
        &mut self,
        name: &str,
        init: ModuleInit,
        policy: InitPolicy,
    ) -> Result<(), EngineError> {
        self.check_registration(name)?;
        match policy {
            InitPolicy::Eager => {
                let module = NativeModule::from_init(name, &init).map_err(|source| {
                    EngineError::NativeModuleInit {
                        name: name.to_string(),
                        source,
                    }
                })?;
                let namespace = self.bind_native_module(&module);
                self.modules.insert_ready(name, namespace)?;
            }
            InitPolicy::Lazy => self.modules.insert_lazy(name, init)?,
        }
        debug!(
            context = self.id().as_u64(),
            module = name,
            ?policy,
            "native module registered"
        );
        Ok(())
    }

    /// Register a module whose exports are the own properties of `exports`
    pub fn register_host_module(&mut self, name: &str, exports: &ObjectRef) -> Result<(), EngineError> {
        self.check_registration(name)?;
        let namespace = self.new_namespace();
        let entries: Vec<(String, Value)> = exports
            .borrow()
            .props
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, value) in entries {
            namespace.set_own(key, value);
        }
        self.modules.insert_ready(name, namespace)?;
        debug!(context = self.id().as_u64(), module = name, "host module registered");
        Ok(())
    }

    fn check_registration(&self, name: &str) -> Result<(), EngineError> {
        if !self.is_configuring() {
            return Err(EngineError::InvariantViolation(format!(
                "module '{}' registered after script execution began",
                name
            )));
        }
        if self.modules.contains(name) {
            return Err(EngineError::InvariantViolation(format!(
                "module '{}' is already registered in this context",
                name
            )));
        }
        Ok(())
    }

    pub(crate) fn init_lazy_native(&mut self, name: &str, init: &ModuleInit) -> Result<ObjectRef, EngineError> {
        match NativeModule::from_init(name, init) {
            Ok(module) => {
                let namespace = self.bind_native_module(&module);
                self.modules.settle(name, namespace.clone());
                debug!(context = self.id().as_u64(), module = name, "lazy native module initialized");
                Ok(namespace)
            }
            Err(source) => {
                self.modules.fail(name, source.to_string());
                Err(EngineError::NativeModuleInit {
                    name: name.to_string(),
                    source,
                })
            }
        }
    }

    /// Expose a native module's functions and values as a namespace
    pub(crate) fn bind_native_module(&mut self, module: &NativeModule) -> ObjectRef {
        let namespace = self.new_namespace();
        for (export, function) in module.functions() {
            let function = function.clone();
            let export_name = export.to_string();
            let bound = self.new_function(export, move |ctx, _this, args| {
                let args = args
                    .iter()
                    .map(to_native)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|message| ctx.type_error(format!("{}: {}", export_name, message)))?;
                match function(&args) {
                    Ok(result) => Ok(from_native(result)),
                    Err(err) => Err(native_exception(ctx, &export_name, err)),
                }
            });
            namespace.set_own(export, Value::Object(bound));
        }
        for (export, value) in module.values() {
            namespace.set_own(export, from_native(value.clone()));
        }
        namespace
    }
}

fn native_exception(ctx: &mut Context, function: &str, err: NativeError) -> Value {
    let kind = match err {
        NativeError::TypeMismatch { .. } | NativeError::ArgumentError(_) => "TypeError",
        NativeError::ModuleError(_) => "Error",
    };
    ctx.make_error(kind, &format!("{}: {}", function, err))
}
