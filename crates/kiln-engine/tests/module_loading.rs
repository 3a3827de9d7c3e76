//! Integration tests for module resolution
//!
//! Covers specifier normalisation, the per-context module cache, failure
//! caching, cyclic imports and native modules.

use kiln_bytecode::{FunctionBuilder, Opcode, UnitBuilder};
use kiln_engine::{
    conv, BytecodeLoader, CapabilityRegistrar, CapabilitySet, Context, EngineError, EvalFlags, InitPolicy,
    LoadOptions, ModuleLoadError, ModuleSource, Runtime, RuntimeOptions, Value,
};
use kiln_sdk::{ModuleInit, NativeModule};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Encoded module-mode unit whose top level is produced by `body`
fn module_bytes(name: &str, body: impl FnOnce(&mut FunctionBuilder)) -> Vec<u8> {
    let mut builder = UnitBuilder::module(name);
    let mut main = FunctionBuilder::new("", 0, 1);
    body(&mut main);
    builder.entry(main).unwrap();
    builder.finish().encode()
}

/// Loader over a fixed table of modules, recording every name it is asked for
struct TableLoader {
    modules: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<String>>,
}

impl TableLoader {
    fn install(runtime: &Runtime, modules: Vec<(&str, Vec<u8>)>) -> Arc<TableLoader> {
        let loader = Arc::new(TableLoader {
            modules: modules.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            requests: Mutex::new(Vec::new()),
        });
        runtime.set_module_loader(loader.clone());
        loader
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl kiln_engine::ModuleLoader for TableLoader {
    fn resolve(&self, name: &str, _referrer: &str) -> Result<ModuleSource, ModuleLoadError> {
        self.requests.lock().unwrap().push(name.to_string());
        self.modules
            .get(name)
            .cloned()
            .map(ModuleSource::Compiled)
            .ok_or(ModuleLoadError::NotFound)
    }
}

fn context(runtime: &Runtime) -> Context {
    let mut ctx = Context::new_raw(runtime).unwrap();
    CapabilityRegistrar::install(&mut ctx, &CapabilitySet::reference()).unwrap();
    ctx
}

fn run_module(ctx: &mut Context, bytes: Vec<u8>) -> Result<kiln_engine::ObjectRef, EngineError> {
    let unit = BytecodeLoader::load_with(&bytes, LoadOptions::default())?;
    let result = BytecodeLoader::bind_and_run(&unit, ctx, EvalFlags::module())?;
    Ok(result.namespace.expect("module mode yields a namespace"))
}

fn util_module() -> Vec<u8> {
    module_bytes("util.js", |f| {
        f.const_i32(42).export("answer").op(Opcode::ReturnUndefined);
    })
}

#[test]
fn test_import_normalises_and_caches() {
    let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
    let loader = TableLoader::install(&runtime, vec![("lib/util.js", util_module())]);
    let mut ctx = context(&runtime);

    let main = module_bytes("lib/main.js", |f| {
        f.import("./util.js")
            .get_field("answer")
            .export("first")
            .import("../lib/util.js")
            .get_field("answer")
            .export("second")
            .op(Opcode::ReturnUndefined);
    });
    let namespace = run_module(&mut ctx, main).unwrap();

    assert_eq!(namespace.get_own("first").unwrap().as_number(), Some(42.0));
    assert_eq!(namespace.get_own("second").unwrap().as_number(), Some(42.0));
    assert_eq!(loader.requests(), vec!["lib/util.js"]);
    assert_eq!(ctx.resolution_count(), 1);
    assert_eq!(ctx.module_names(), vec!["lib/main.js", "lib/util.js"]);
}

#[test]
fn test_each_context_has_its_own_cache() {
    let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
    let loader = TableLoader::install(&runtime, vec![("util.js", util_module())]);

    for _ in 0..2 {
        let mut ctx = context(&runtime);
        let namespace = ctx.import_module("./util.js", "main.js").unwrap();
        assert_eq!(namespace.get_own("answer").unwrap().as_number(), Some(42.0));
    }
    assert_eq!(loader.requests().len(), 2);
}

#[test]
fn test_missing_module_failure_is_cached() {
    let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
    let loader = TableLoader::install(&runtime, Vec::new());
    let mut ctx = context(&runtime);

    for _ in 0..2 {
        let err = ctx.import_module("nowhere.js", "").unwrap_err();
        match err {
            EngineError::ModuleResolution { name, .. } => assert_eq!(name, "nowhere.js"),
            other => panic!("expected a resolution error, got {:?}", other),
        }
    }
    assert_eq!(loader.requests().len(), 1);
    assert!(ctx.module_names().is_empty());
}

#[test]
fn test_resolution_error_is_catchable_in_script() {
    let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
    TableLoader::install(&runtime, Vec::new());
    let mut ctx = context(&runtime);

    let main = module_bytes("main.js", |f| {
        let handler = f.label();
        let done = f.label();
        f.jump(Opcode::TryBegin, handler)
            .import("./missing.js")
            .op(Opcode::Pop)
            .op(Opcode::TryEnd)
            .const_str("no error")
            .export("caught")
            .jump(Opcode::Jmp, done);
        f.bind(handler);
        f.get_field("name").export("caught");
        f.bind(done);
        f.op(Opcode::ReturnUndefined);
    });
    let namespace = run_module(&mut ctx, main).unwrap();
    assert_eq!(
        namespace.get_own("caught").unwrap().as_str(),
        Some("ModuleResolutionError")
    );
}

#[test]
fn test_throwing_module_is_cached_as_failed() {
    let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
    let broken = module_bytes("broken.js", |f| {
        f.const_str("module exploded").op(Opcode::Throw);
    });
    let loader = TableLoader::install(&runtime, vec![("broken.js", broken)]);
    let mut ctx = context(&runtime);

    match ctx.import_module("broken.js", "").unwrap_err() {
        EngineError::UncaughtScriptFailure(failure) => assert_eq!(failure.message, "module exploded"),
        other => panic!("expected the module's exception, got {:?}", other),
    }
    match ctx.import_module("broken.js", "").unwrap_err() {
        EngineError::ModuleResolution { reason, .. } => assert!(reason.contains("module exploded")),
        other => panic!("expected a cached failure, got {:?}", other),
    }
    assert_eq!(loader.requests().len(), 1);
}

#[test]
fn test_cyclic_import_sees_partial_namespace() {
    let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
    // b.js reads a.x before a.js has exported it
    let b = module_bytes("b.js", |f| {
        f.import("./a.js")
            .get_field("x")
            .op(Opcode::Typeof)
            .export("seen")
            .op(Opcode::ReturnUndefined);
    });
    let a = module_bytes("a.js", |f| {
        f.import("./b.js")
            .store_local(0)
            .const_i32(1)
            .export("x")
            .load_local(0)
            .get_field("seen")
            .export("from_b")
            .op(Opcode::ReturnUndefined);
    });
    TableLoader::install(&runtime, vec![("a.js", a), ("b.js", b)]);
    let mut ctx = context(&runtime);

    let namespace = ctx.import_module("a.js", "").unwrap();
    assert_eq!(namespace.get_own("from_b").unwrap().as_str(), Some("undefined"));
    assert_eq!(namespace.get_own("x").unwrap().as_number(), Some(1.0));
}

#[test]
fn test_script_mode_unit_is_not_a_module() {
    let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
    let mut script = UnitBuilder::script("plain.js");
    script.entry(FunctionBuilder::new("", 0, 0)).unwrap();
    TableLoader::install(&runtime, vec![("plain.js", script.finish().encode())]);
    let mut ctx = context(&runtime);

    let err = ctx.import_module("plain.js", "").unwrap_err();
    assert!(err.to_string().contains("script mode"), "{}", err);
}

#[test]
fn test_native_module_import() {
    let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
    let mut ctx = context(&runtime);
    let init: ModuleInit = Arc::new(|module: &mut NativeModule| {
        module.function2("add", |a: f64, b: f64| a + b);
        Ok(())
    });
    ctx.register_native_module("math", init, InitPolicy::Eager).unwrap();

    let main = module_bytes("main.js", |f| {
        f.import("math")
            .const_i32(2)
            .const_i32(3)
            .call_method("add", 2)
            .export("sum")
            .op(Opcode::ReturnUndefined);
    });
    let namespace = run_module(&mut ctx, main).unwrap();
    assert_eq!(namespace.get_own("sum").unwrap().as_number(), Some(5.0));
    // Natives never reach the module loader
    assert_eq!(ctx.resolution_count(), 0);
}

#[test]
fn test_lazy_native_runs_init_on_first_import() {
    let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
    let mut ctx = context(&runtime);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let init: ModuleInit = Arc::new(move |module: &mut NativeModule| {
        counter.fetch_add(1, Ordering::SeqCst);
        module.function0("hello", || "hi");
        Ok(())
    });
    ctx.register_native_module("greeter", init, InitPolicy::Lazy).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let first = ctx.import_module("greeter", "").unwrap();
    let second = ctx.import_module("greeter", "").unwrap();
    assert!(first.ptr_eq(&second));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let result = ctx
        .call_method(&Value::Object(first), "hello", &[])
        .unwrap();
    assert_eq!(conv::to_string(&result), "hi");
}
