//! Capability groups
//!
//! A [`CapabilitySet`] declares which groups of built-ins a context gets.
//! [`CapabilityRegistrar::install`] checks the whole request first and then
//! installs the missing groups in a fixed order, so the caller's order
//! never matters and a rejected request installs nothing.
//!
//! Omitting a group removes its globals and prototype methods entirely;
//! scripts cannot observe a disabled group.

mod base;
mod bigint;
mod collections;
pub(crate) mod date;
mod eval;
mod json;
mod normalize;
pub(crate) mod promise;
mod proxy;
mod regexp;
mod typed_arrays;

use crate::context::Context;
use crate::error::EngineError;
use crate::value::{ObjectRef, ScriptResult, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A group of built-ins that can be granted to a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Object model, arrays, errors, `Math`, strings and numbers
    BaseObjects,
    /// `Date`
    Date,
    /// `eval`
    Eval,
    /// `String.prototype.normalize`
    StringNormalize,
    /// `RegExp`
    RegExp,
    /// `JSON`
    Json,
    /// `Proxy` and `Reflect`
    Proxy,
    /// `Map` and `Set`
    MapSet,
    /// `ArrayBuffer` and `Uint8Array`
    TypedArrays,
    /// `Promise` and `queueMicrotask`
    Promise,
    /// `BigInt` and BigInt literals
    BigInt,
}

impl Capability {
    /// Every group, in installation order
    pub const ALL: [Capability; 11] = [
        Capability::BaseObjects,
        Capability::Date,
        Capability::Eval,
        Capability::StringNormalize,
        Capability::RegExp,
        Capability::Json,
        Capability::Proxy,
        Capability::MapSet,
        Capability::TypedArrays,
        Capability::Promise,
        Capability::BigInt,
    ];

    /// Configuration key of the group
    pub fn name(self) -> &'static str {
        match self {
            Capability::BaseObjects => "base_objects",
            Capability::Date => "date",
            Capability::Eval => "eval",
            Capability::StringNormalize => "string_normalize",
            Capability::RegExp => "regexp",
            Capability::Json => "json",
            Capability::Proxy => "proxy",
            Capability::MapSet => "map_set",
            Capability::TypedArrays => "typed_arrays",
            Capability::Promise => "promise",
            Capability::BigInt => "bigint",
        }
    }
}

/// Which capability groups a context gets.
///
/// Missing keys in a configuration file take the reference value (enabled).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CapabilitySet {
    /// Object model, arrays, errors, `Math`, strings and numbers
    pub base_objects: bool,
    /// `Date`
    pub date: bool,
    /// `eval`
    pub eval: bool,
    /// `String.prototype.normalize`
    pub string_normalize: bool,
    /// `RegExp`
    pub regexp: bool,
    /// `JSON`
    pub json: bool,
    /// `Proxy` and `Reflect`
    pub proxy: bool,
    /// `Map` and `Set`
    pub map_set: bool,
    /// `ArrayBuffer` and `Uint8Array`
    pub typed_arrays: bool,
    /// `Promise` and `queueMicrotask`
    pub promise: bool,
    /// `BigInt` and BigInt literals
    pub bigint: bool,
}

impl Default for CapabilitySet {
    fn default() -> Self {
        Self::reference()
    }
}

impl CapabilitySet {
    /// Every group enabled
    pub fn reference() -> Self {
        Self {
            base_objects: true,
            date: true,
            eval: true,
            string_normalize: true,
            regexp: true,
            json: true,
            proxy: true,
            map_set: true,
            typed_arrays: true,
            promise: true,
            bigint: true,
        }
    }

    /// No group enabled
    pub fn none() -> Self {
        Self {
            base_objects: false,
            date: false,
            eval: false,
            string_normalize: false,
            regexp: false,
            json: false,
            proxy: false,
            map_set: false,
            typed_arrays: false,
            promise: false,
            bigint: false,
        }
    }

    fn slot(&mut self, capability: Capability) -> &mut bool {
        match capability {
            Capability::BaseObjects => &mut self.base_objects,
            Capability::Date => &mut self.date,
            Capability::Eval => &mut self.eval,
            Capability::StringNormalize => &mut self.string_normalize,
            Capability::RegExp => &mut self.regexp,
            Capability::Json => &mut self.json,
            Capability::Proxy => &mut self.proxy,
            Capability::MapSet => &mut self.map_set,
            Capability::TypedArrays => &mut self.typed_arrays,
            Capability::Promise => &mut self.promise,
            Capability::BigInt => &mut self.bigint,
        }
    }

    /// Whether `capability` is enabled
    pub fn contains(&self, capability: Capability) -> bool {
        match capability {
            Capability::BaseObjects => self.base_objects,
            Capability::Date => self.date,
            Capability::Eval => self.eval,
            Capability::StringNormalize => self.string_normalize,
            Capability::RegExp => self.regexp,
            Capability::Json => self.json,
            Capability::Proxy => self.proxy,
            Capability::MapSet => self.map_set,
            Capability::TypedArrays => self.typed_arrays,
            Capability::Promise => self.promise,
            Capability::BigInt => self.bigint,
        }
    }

    /// Enable or disable `capability`
    pub fn set(&mut self, capability: Capability, enabled: bool) {
        *self.slot(capability) = enabled;
    }

    /// Builder form of [`set`](Self::set)
    pub fn with(mut self, capability: Capability, enabled: bool) -> Self {
        self.set(capability, enabled);
        self
    }

    /// Enabled groups in installation order
    pub fn enabled(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.contains(*c))
    }
}

/// Installs capability groups into contexts
pub struct CapabilityRegistrar;

impl CapabilityRegistrar {
    /// Install every group in `set` that `ctx` does not have yet.
    ///
    /// Fails with `CapabilityInstallFailure`, before installing anything,
    /// when the context has already run script code or when a group is
    /// requested without the base object model.
    pub fn install(ctx: &mut Context, set: &CapabilitySet) -> Result<(), EngineError> {
        let missing: Vec<Capability> = set
            .enabled()
            .filter(|c| !ctx.capabilities().contains(*c))
            .collect();
        let Some(first) = missing.first().copied() else {
            return Ok(());
        };

        if !ctx.is_configuring() {
            return Err(EngineError::CapabilityInstallFailure {
                capability: first.name(),
                reason: "the installation window closed when script execution began".to_string(),
            });
        }

        let base_available = set.base_objects || ctx.capabilities().base_objects;
        if !base_available {
            if let Some(dependent) = missing.iter().find(|c| **c != Capability::BaseObjects) {
                return Err(EngineError::CapabilityInstallFailure {
                    capability: dependent.name(),
                    reason: "requires the base_objects group".to_string(),
                });
            }
        }

        for capability in missing {
            match capability {
                Capability::BaseObjects => base::install(ctx),
                Capability::Date => date::install(ctx),
                Capability::Eval => eval::install(ctx),
                Capability::StringNormalize => normalize::install(ctx),
                Capability::RegExp => regexp::install(ctx),
                Capability::Json => json::install(ctx),
                Capability::Proxy => proxy::install(ctx),
                Capability::MapSet => collections::install(ctx),
                Capability::TypedArrays => typed_arrays::install(ctx),
                Capability::Promise => promise::install(ctx),
                Capability::BigInt => bigint::install(ctx),
            }
            if ctx.heap.take_exhausted() {
                return Err(EngineError::CapabilityInstallFailure {
                    capability: capability.name(),
                    reason: "heap budget exhausted".to_string(),
                });
            }
            ctx.mark_installed(capability);
            debug!(
                context = ctx.id().as_u64(),
                capability = capability.name(),
                "capability installed"
            );
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────
// Helpers shared by the groups
// ────────────────────────────────────────────────────────────────────────

/// Argument `index`, or `undefined`
pub(crate) fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

/// Define a host function as an own property of `target`
pub(crate) fn method<F>(ctx: &mut Context, target: &ObjectRef, name: &str, f: F)
where
    F: Fn(&mut Context, &Value, &[Value]) -> ScriptResult + 'static,
{
    let function = ctx.new_function(name, f);
    target.set_own(name, Value::Object(function));
}

/// Define a global constructor linked to `proto`
pub(crate) fn constructor<F>(ctx: &mut Context, name: &str, proto: &ObjectRef, f: F) -> ObjectRef
where
    F: Fn(&mut Context, &Value, &[Value]) -> ScriptResult + 'static,
{
    let function = ctx.new_function(name, f);
    function.set_own("prototype", Value::Object(proto.clone()));
    proto.set_own("constructor", Value::Object(function.clone()));
    ctx.set_global(name, Value::Object(function.clone()));
    function
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Runtime, RuntimeOptions};

    fn context() -> Context {
        let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
        Context::new_raw(&runtime).unwrap()
    }

    #[test]
    fn test_reference_and_none() {
        let reference = CapabilitySet::reference();
        assert!(Capability::ALL.iter().all(|c| reference.contains(*c)));
        assert_eq!(CapabilitySet::default(), reference);
        assert_eq!(CapabilitySet::none().enabled().count(), 0);
    }

    #[test]
    fn test_set_and_with() {
        let set = CapabilitySet::none()
            .with(Capability::BaseObjects, true)
            .with(Capability::Json, true);
        assert_eq!(
            set.enabled().collect::<Vec<_>>(),
            vec![Capability::BaseObjects, Capability::Json]
        );
    }

    #[test]
    fn test_install_reference_set() {
        let mut ctx = context();
        CapabilityRegistrar::install(&mut ctx, &CapabilitySet::reference()).unwrap();
        assert_eq!(*ctx.capabilities(), CapabilitySet::reference());
        for name in [
            "globalThis", "Object", "Array", "Math", "Date", "eval", "RegExp", "JSON", "Proxy",
            "Reflect", "Map", "Set", "ArrayBuffer", "Uint8Array", "Promise", "BigInt",
        ] {
            assert!(ctx.get_global(name).is_some(), "missing {}", name);
        }
    }

    #[test]
    fn test_install_is_idempotent() {
        let mut ctx = context();
        let set = CapabilitySet::none().with(Capability::BaseObjects, true);
        CapabilityRegistrar::install(&mut ctx, &set).unwrap();
        let object = ctx.get_global("Object").unwrap();
        CapabilityRegistrar::install(&mut ctx, &set).unwrap();
        let again = ctx.get_global("Object").unwrap();
        assert!(crate::conv::strict_equals(&object, &again));
    }

    #[test]
    fn test_groups_need_base_objects() {
        let mut ctx = context();
        let set = CapabilitySet::none().with(Capability::Json, true);
        let err = CapabilityRegistrar::install(&mut ctx, &set).unwrap_err();
        assert!(matches!(
            err,
            EngineError::CapabilityInstallFailure { capability: "json", .. }
        ));
        assert!(ctx.get_global("JSON").is_none());

        // Base installed earlier satisfies the dependency
        let base = CapabilitySet::none().with(Capability::BaseObjects, true);
        CapabilityRegistrar::install(&mut ctx, &base).unwrap();
        CapabilityRegistrar::install(&mut ctx, &set).unwrap();
        assert!(ctx.get_global("JSON").is_some());
    }

    #[test]
    fn test_window_closes_after_execution() {
        let mut ctx = context();
        let base = CapabilitySet::none().with(Capability::BaseObjects, true);
        CapabilityRegistrar::install(&mut ctx, &base).unwrap();
        let noop = ctx.new_function("noop", |_, _, _| Ok(Value::Undefined));
        ctx.call(&Value::Object(noop), &Value::Undefined, &[]).unwrap();

        let err = CapabilityRegistrar::install(&mut ctx, &CapabilitySet::reference()).unwrap_err();
        assert!(matches!(err, EngineError::CapabilityInstallFailure { .. }));
        assert!(ctx.get_global("Date").is_none());
        // Nothing missing: not an error even after the window closed
        assert!(CapabilityRegistrar::install(&mut ctx, &base).is_ok());
    }

    #[test]
    fn test_deserialize_partial_set() {
        let set: CapabilitySet = serde_json::from_str(r#"{"eval": false, "bigint": false}"#).unwrap();
        assert!(set.base_objects);
        assert!(!set.eval);
        assert!(!set.bigint);
        assert!(serde_json::from_str::<CapabilitySet>(r#"{"evil": true}"#).is_err());
    }
}
