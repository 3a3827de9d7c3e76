//! Lifecycle, exit status and failure reporting

use crate::harness::{module, run_bytes, run_source, script};
use kiln_bytecode::{FunctionBuilder, Opcode};
use kiln_engine::EngineError;
use kiln_runtime::{demo, BytesSource, HostConfig, HostError, HostState};

#[test]
fn test_hello_world_and_arithmetic() {
    let bytes = script("hello.js", |unit, main| {
        let mut add = FunctionBuilder::new("add", 2, 2);
        add.load_local(0).load_local(1).op(Opcode::Add).op(Opcode::Return);
        let add = unit.function(add).unwrap();

        // Deferred output proves the top level finished before draining
        main.load_global("Promise")
            .const_str("later")
            .call_method("resolve", 1)
            .load_global("print")
            .call_method("then", 1)
            .op(Opcode::Pop)
            .load_global("console")
            .const_str("Hello World")
            .call_method("log", 1)
            .op(Opcode::Pop)
            .load_global("console")
            .make_closure(add)
            .const_i32(20)
            .const_i32(22)
            .call(2)
            .call_method("log", 1)
            .op(Opcode::Pop)
            .op(Opcode::ReturnUndefined);
    });

    let run = run_bytes("hello.js", bytes);
    assert!(run.outcome.is_success(), "{:?}", run.outcome);
    assert_eq!(run.outcome.reached, HostState::Draining);
    assert_eq!(run.lines, vec!["Hello World", "42", "later"]);
}

#[test]
fn test_embedded_fib_demo() {
    let run = run_source(HostConfig::default(), &demo::embedded().unwrap(), &[]);
    assert_eq!(run.outcome.status, 0);
    assert_eq!(run.lines, vec!["Hello World", "fib(10)= 55"]);
}

#[test]
fn test_fib_import_uses_native_registration() {
    // A file shadowing the native name would fail verification if the
    // loader were ever asked for it
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("examples")).unwrap();
    std::fs::write(root.path().join("examples/fib.so"), b"\x7fELF not a unit").unwrap();

    let mut config = HostConfig::default();
    config.modules.roots = vec![root.path().to_path_buf()];
    let run = run_source(config, &demo::embedded().unwrap(), &[]);
    assert!(run.outcome.is_success(), "{:?}", run.outcome);
    assert_eq!(run.lines[1], "fib(10)= 55");
}

#[test]
fn test_fib_import_fails_without_registration() {
    let mut config = HostConfig::default();
    config.native_modules.clear();
    let run = run_source(config, &demo::embedded().unwrap(), &[]);
    assert_eq!(run.outcome.status, 1);
    match run.outcome.error {
        Some(HostError::Engine(EngineError::UncaughtScriptFailure(failure))) => {
            assert_eq!(failure.name, "ModuleResolutionError");
            assert!(failure.message.contains("examples/fib.so"), "{}", failure.message);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_top_level_throw_skips_job_loop() {
    let bytes = script("throw.js", |_, main| {
        main.load_global("console")
            .const_str("before")
            .call_method("log", 1)
            .op(Opcode::Pop)
            .load_global("Error")
            .const_str("boom")
            .call(1)
            .op(Opcode::Throw)
            .load_global("console")
            .const_str("after")
            .call_method("log", 1)
            .op(Opcode::Pop)
            .op(Opcode::ReturnUndefined);
    });

    let run = run_bytes("throw.js", bytes);
    assert_eq!(run.outcome.status, 1);
    assert_eq!(run.outcome.reached, HostState::Executing);
    assert!(run.outcome.failures.is_empty());
    assert_eq!(run.lines, vec!["before"]);
    match run.outcome.error {
        Some(HostError::Engine(EngineError::UncaughtScriptFailure(failure))) => {
            assert_eq!(failure.to_string(), "Error: boom");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_malformed_unit_never_executes() {
    let run = run_bytes("junk.bin", b"KLBC but not really a unit".to_vec());
    assert_eq!(run.outcome.status, 2);
    assert_eq!(run.outcome.reached, HostState::ContextReady);
    assert!(matches!(
        run.outcome.error,
        Some(HostError::Engine(EngineError::MalformedUnit(_)))
    ));
    assert!(run.lines.is_empty());

    let mut valid = script("ok.js", |_, main| {
        main.op(Opcode::ReturnUndefined);
    });
    valid.truncate(valid.len() - 3);
    assert_eq!(run_bytes("ok.js", valid).outcome.status, 2);
}

#[test]
fn test_job_failure_keeps_status_zero() {
    let bytes = module("jobs.js", |unit, main| {
        let mut fail = FunctionBuilder::new("fail", 0, 0);
        fail.load_global("RangeError")
            .const_str("bad timer")
            .call(1)
            .op(Opcode::Throw);
        let fail = unit.function(fail).unwrap();

        main.import("os")
            .store_local(0)
            .load_local(0)
            .make_closure(fail)
            .const_i32(0)
            .call_method("setTimeout", 2)
            .op(Opcode::Pop)
            .load_local(0)
            .load_global("print")
            .const_i32(1)
            .const_str("still running")
            .call_method("setTimeout", 3)
            .op(Opcode::Pop)
            .op(Opcode::ReturnUndefined);
    });

    let run = run_bytes("jobs.js", bytes);
    assert_eq!(run.outcome.status, 0);
    assert!(run.outcome.error.is_none());
    assert_eq!(run.outcome.failures.len(), 1);
    assert_eq!(run.outcome.failures[0].to_string(), "RangeError: bad timer");
    assert_eq!(run.lines, vec!["still running"]);
}

#[test]
fn test_std_exit_overrides_status() {
    let bytes = module("exit.js", |_, main| {
        main.import("os")
            .load_global("print")
            .const_i32(0)
            .const_str("timer")
            .call_method("setTimeout", 3)
            .op(Opcode::Pop)
            .import("std")
            .const_i32(4)
            .call_method("exit", 1)
            .op(Opcode::Pop)
            .load_global("console")
            .const_str("after exit")
            .call_method("log", 1)
            .op(Opcode::Pop)
            .op(Opcode::ReturnUndefined);
    });

    let run = run_bytes("exit.js", bytes);
    assert_eq!(run.outcome.status, 4);
    assert!(run.outcome.error.is_none());
    assert_eq!(run.lines, vec!["after exit"]);
}

#[test]
fn test_script_args_pass_through() {
    let bytes = script("args.js", |_, main| {
        main.load_global("console")
            .load_global("scriptArgs")
            .call_method("log", 1)
            .op(Opcode::Pop)
            .op(Opcode::ReturnUndefined);
    });
    let run = run_source(
        HostConfig::default(),
        &BytesSource::new("args.js", bytes),
        &["--verbose", "x"],
    );
    assert_eq!(run.lines, vec!["--verbose,x"]);
}

#[test]
fn test_disabled_capability_is_absent() {
    let bytes = script("json.js", |_, main| {
        main.load_global("JSON")
            .op(Opcode::Pop)
            .op(Opcode::ReturnUndefined);
    });
    let config = HostConfig::from_toml_str("[capabilities]\njson = false\n").unwrap();
    let run = run_source(config, &BytesSource::new("json.js", bytes), &[]);
    assert_eq!(run.outcome.status, 1);
    match run.outcome.error {
        Some(HostError::Engine(EngineError::UncaughtScriptFailure(failure))) => {
            assert_eq!(failure.name, "ReferenceError");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_capability_without_base_fails_before_loading() {
    let config = HostConfig::from_toml_str("[capabilities]\nbase_objects = false\n").unwrap();
    let bytes = script("never.js", |_, main| {
        main.op(Opcode::ReturnUndefined);
    });
    let run = run_source(config, &BytesSource::new("never.js", bytes), &[]);
    assert_eq!(run.outcome.status, 3);
    assert_eq!(run.outcome.reached, HostState::RuntimeReady);
    assert!(matches!(
        run.outcome.error,
        Some(HostError::Engine(EngineError::CapabilityInstallFailure { .. }))
    ));
}

#[test]
fn test_memory_limit_below_minimum() {
    let config = HostConfig::from_toml_str("[limits]\nmemory_limit = 1024\n").unwrap();
    let run = run_bytes_with(config);
    assert_eq!(run.outcome.status, 3);
    assert_eq!(run.outcome.reached, HostState::Created);
    assert!(matches!(
        run.outcome.error,
        Some(HostError::Engine(EngineError::ResourceExhausted(_)))
    ));
}

fn run_bytes_with(config: HostConfig) -> crate::harness::Run {
    let bytes = script("m.js", |_, main| {
        main.op(Opcode::ReturnUndefined);
    });
    run_source(config, &BytesSource::new("m.js", bytes), &[])
}
