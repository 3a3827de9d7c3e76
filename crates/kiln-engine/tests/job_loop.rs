//! Integration tests for the job loop: promise ordering, timers and workers

use kiln_bytecode::{FunctionBuilder, Opcode, UnitBuilder};
use kiln_engine::{
    conv, spawn_worker, BytecodeLoader, CapabilityRegistrar, CapabilitySet, Context, EvalFlags, JobLoop,
    LoadOptions, ModuleLoadError, ModuleSource, Runtime, RuntimeOptions, Value, WorkerContextFactory,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

type Log = Rc<RefCell<Vec<String>>>;

fn context(runtime: &Runtime) -> Context {
    let mut ctx = Context::new_raw(runtime).unwrap();
    CapabilityRegistrar::install(&mut ctx, &CapabilitySet::reference()).unwrap();
    ctx
}

/// Define a global `name(x)` that appends `name:x` to the log
fn define_logger(ctx: &mut Context, log: &Log, name: &'static str) {
    let log = log.clone();
    let function = ctx.new_function(name, move |_, _, args| {
        let text = args.first().map(conv::to_string).unwrap_or_default();
        log.borrow_mut().push(format!("{}:{}", name, text));
        Ok(Value::Undefined)
    });
    ctx.set_global(name, Value::Object(function));
}

fn run_script(ctx: &mut Context, body: impl FnOnce(&mut FunctionBuilder)) {
    let mut builder = UnitBuilder::script("main.js");
    let mut main = FunctionBuilder::new("", 0, 2);
    body(&mut main);
    builder.entry(main).unwrap();
    let unit = BytecodeLoader::from_unit(builder.finish(), LoadOptions::default()).unwrap();
    BytecodeLoader::bind_and_run(&unit, ctx, EvalFlags::script()).unwrap();
}

#[test]
fn test_reactions_before_timers_in_fifo_order() {
    let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
    let mut ctx = context(&runtime);
    let log: Log = Rc::default();
    for name in ["sync", "then", "micro", "timer"] {
        define_logger(&mut ctx, &log, name);
    }

    let timer = ctx.get_global("timer").unwrap();
    ctx.set_timeout(timer, 0.0, vec![Value::from("t")]);

    run_script(&mut ctx, |f| {
        f.load_global("Promise")
            .const_str("p")
            .call_method("resolve", 1)
            .load_global("then")
            .call_method("then", 1)
            .op(Opcode::Pop)
            .load_global("queueMicrotask")
            .load_global("micro")
            .call(1)
            .op(Opcode::Pop)
            .load_global("sync")
            .const_str("s")
            .call(1)
            .op(Opcode::ReturnUndefined);
    });
    assert_eq!(*log.borrow(), vec!["sync:s"]);

    let report = JobLoop::drain(&mut ctx);
    assert_eq!(*log.borrow(), vec!["sync:s", "then:p", "micro:", "timer:t"]);
    assert_eq!(report.timers_fired, 1);
    assert!(report.is_clean());
}

#[test]
fn test_promise_chain_settles_in_order() {
    let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
    let mut ctx = context(&runtime);
    let log: Log = Rc::default();
    define_logger(&mut ctx, &log, "step");

    // new Promise(r => r(1)).then(x => x + 1).then(step)
    let mut builder = UnitBuilder::script("chain.js");
    let mut executor = FunctionBuilder::new("executor", 1, 1);
    executor
        .load_local(0)
        .const_i32(1)
        .call(1)
        .op(Opcode::ReturnUndefined);
    let executor = builder.function(executor).unwrap();
    let mut increment = FunctionBuilder::new("increment", 1, 1);
    increment
        .load_local(0)
        .const_i32(1)
        .op(Opcode::Add)
        .op(Opcode::Return);
    let increment = builder.function(increment).unwrap();

    let mut main = FunctionBuilder::new("", 0, 0);
    main.load_global("Promise")
        .make_closure(executor)
        .call(1)
        .make_closure(increment)
        .call_method("then", 1)
        .load_global("step")
        .call_method("then", 1)
        .op(Opcode::Pop)
        .op(Opcode::ReturnUndefined);
    builder.entry(main).unwrap();
    let unit = BytecodeLoader::from_unit(builder.finish(), LoadOptions::default()).unwrap();
    BytecodeLoader::bind_and_run(&unit, &mut ctx, EvalFlags::script()).unwrap();

    assert!(log.borrow().is_empty());
    JobLoop::drain(&mut ctx);
    assert_eq!(*log.borrow(), vec!["step:2"]);
}

#[test]
fn test_rejection_without_handler_is_reported() {
    let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
    let mut ctx = context(&runtime);
    run_script(&mut ctx, |f| {
        f.load_global("Promise")
            .const_str("nope")
            .call_method("reject", 1)
            .op(Opcode::Pop)
            .op(Opcode::ReturnUndefined);
    });
    let report = JobLoop::drain(&mut ctx);
    assert_eq!(report.unhandled_rejections, 1);
    assert!(report.is_clean());
}

#[test]
fn test_throwing_job_is_recorded_and_loop_continues() {
    let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
    let mut ctx = context(&runtime);
    let log: Log = Rc::default();
    define_logger(&mut ctx, &log, "after");

    let thrower = ctx.new_function("thrower", |ctx, _, _| Err(ctx.range_error("bad timer")));
    ctx.set_timeout(Value::Object(thrower), 0.0, Vec::new());
    let after = ctx.get_global("after").unwrap();
    ctx.set_timeout(after, 1.0, vec![Value::from("ok")]);

    let report = JobLoop::drain(&mut ctx);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].to_string(), "RangeError: bad timer");
    assert_eq!(*log.borrow(), vec!["after:ok"]);
}

#[test]
fn test_cleared_timer_never_fires() {
    let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
    let mut ctx = context(&runtime);
    let log: Log = Rc::default();
    define_logger(&mut ctx, &log, "tick");

    let tick = ctx.get_global("tick").unwrap();
    let id = ctx.set_timeout(tick, 5.0, Vec::new());
    assert!(ctx.clear_timeout(id));
    let report = JobLoop::drain(&mut ctx);
    assert_eq!(report.timers_fired, 0);
    assert!(log.borrow().is_empty());
}

// ────────────────────────────────────────────────────────────────────────
// Workers
// ────────────────────────────────────────────────────────────────────────

/// Worker module: `parent.onmessage = e => parent.postMessage(e.data * 2)`
fn doubling_worker() -> Vec<u8> {
    let mut builder = UnitBuilder::module("worker.js");
    let mut handler = FunctionBuilder::new("onmessage", 1, 1);
    handler
        .load_global("parent")
        .load_local(0)
        .get_field("data")
        .const_i32(2)
        .op(Opcode::Mul)
        .call_method("postMessage", 1)
        .op(Opcode::Pop)
        .op(Opcode::ReturnUndefined);
    let handler = builder.function(handler).unwrap();

    let mut main = FunctionBuilder::new("", 0, 0);
    main.load_global("parent")
        .make_closure(handler)
        .set_field("onmessage")
        .op(Opcode::ReturnUndefined);
    builder.entry(main).unwrap();
    builder.finish().encode()
}

fn worker_runtime() -> Runtime {
    let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
    let worker = doubling_worker();
    runtime.set_module_loader(Arc::new(move |name: &str, _referrer: &str| {
        if name == "worker.js" {
            Ok(ModuleSource::Compiled(worker.clone()))
        } else {
            Err(ModuleLoadError::NotFound)
        }
    }));
    let factory: WorkerContextFactory = Arc::new(|runtime: &Runtime| {
        let mut ctx = Context::new_raw(runtime)?;
        CapabilityRegistrar::install(&mut ctx, &CapabilitySet::reference())?;
        Ok(ctx)
    });
    runtime.set_worker_context_factory(factory);
    runtime
}

#[test]
fn test_worker_round_trip() {
    let runtime = worker_runtime();
    let mut ctx = context(&runtime);
    let log: Log = Rc::default();

    let handle = spawn_worker(&mut ctx, "worker.js").unwrap();
    assert_eq!(runtime.live_contexts(), 2);

    let sink = log.clone();
    let onmessage = ctx.new_function("onmessage", move |ctx, _, args| {
        let event = args.first().cloned().unwrap_or_default();
        let data = ctx.get_property(&event, "data")?;
        sink.borrow_mut().push(conv::to_string(&data));
        Ok(Value::Undefined)
    });
    handle.set_own("onmessage", Value::Object(onmessage));

    let handle = Value::Object(handle);
    ctx.call_method(&handle, "postMessage", &[Value::from(21)])
        .unwrap();
    let report = JobLoop::drain(&mut ctx);

    assert_eq!(*log.borrow(), vec!["42"]);
    assert!(report.messages_delivered >= 2);
    assert!(report.is_clean());
}

#[test]
fn test_worker_messages_are_copies() {
    let runtime = worker_runtime();
    let mut ctx = context(&runtime);
    let handle = Value::Object(spawn_worker(&mut ctx, "worker.js").unwrap());

    let function = ctx.new_function("f", |_, _, _| Ok(Value::Undefined));
    let thrown = ctx
        .call_method(&handle, "postMessage", &[Value::Object(function)])
        .unwrap_err();
    assert_eq!(ctx.failure_of(&thrown).name, "DataCloneError");
}

#[test]
fn test_unknown_worker_module_is_resolution_error() {
    let runtime = worker_runtime();
    let mut ctx = context(&runtime);
    let thrown = spawn_worker(&mut ctx, "missing.js").unwrap_err();
    assert_eq!(ctx.failure_of(&thrown).name, "ModuleResolutionError");
}
