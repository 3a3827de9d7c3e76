//! Module resolution through the host

use crate::harness::{module, run_source};
use kiln_bytecode::Opcode;
use kiln_engine::EngineError;
use kiln_runtime::{BytesSource, FileSource, HostConfig, HostError};

fn answer_module() -> Vec<u8> {
    module("lib/answer.js", |_, main| {
        main.const_i32(42).export("answer").op(Opcode::ReturnUndefined);
    })
}

/// `import * as m from specifier; console.log(m.answer)`
fn importer(name: &str, specifier: &str) -> Vec<u8> {
    module(name, |_, main| {
        main.load_global("console")
            .import(specifier)
            .get_field("answer")
            .call_method("log", 1)
            .op(Opcode::Pop)
            .op(Opcode::ReturnUndefined);
    })
}

#[test]
fn test_imports_resolve_next_to_unit_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("lib")).unwrap();
    std::fs::write(dir.path().join("lib/answer.js"), answer_module()).unwrap();
    let main = dir.path().join("main.klbc");
    std::fs::write(&main, importer("main.js", "./lib/answer.js")).unwrap();

    let mut config = HostConfig::default();
    config.modules.roots.clear();
    let run = run_source(config, &FileSource::new(&main), &[]);
    assert!(run.outcome.is_success(), "{:?}", run.outcome);
    assert_eq!(run.lines, vec!["42"]);
}

#[test]
fn test_configured_roots_are_searched() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("lib")).unwrap();
    std::fs::write(dir.path().join("lib/answer.js"), answer_module()).unwrap();

    let mut config = HostConfig::default();
    config.modules.roots = vec![dir.path().join("empty"), dir.path().to_path_buf()];
    let source = BytesSource::new("app/main.js", importer("app/main.js", "../lib/answer.js"));
    let run = run_source(config, &source, &[]);
    assert!(run.outcome.is_success(), "{:?}", run.outcome);
    assert_eq!(run.lines, vec!["42"]);
}

#[test]
fn test_missing_module_is_uncaught_resolution_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = HostConfig::default();
    config.modules.roots = vec![dir.path().to_path_buf()];
    let source = BytesSource::new("main.js", importer("main.js", "./nowhere.js"));
    let run = run_source(config, &source, &[]);
    assert_eq!(run.outcome.status, 1);
    match run.outcome.error {
        Some(HostError::Engine(EngineError::UncaughtScriptFailure(failure))) => {
            assert_eq!(failure.name, "ModuleResolutionError");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_lazy_native_module_from_config() {
    let config = HostConfig::from_toml_str(
        r#"
        [[native_modules]]
        name = "math/fib"
        extension = "fib"
        lazy = true
        "#,
    )
    .unwrap();
    let bytes = module("main.js", |_, main| {
        main.load_global("console")
            .import("math/fib")
            .const_i32(20)
            .call_method("fib", 1)
            .call_method("log", 1)
            .op(Opcode::Pop)
            .op(Opcode::ReturnUndefined);
    });
    let run = run_source(config, &BytesSource::new("main.js", bytes), &[]);
    assert!(run.outcome.is_success(), "{:?}", run.outcome);
    assert_eq!(run.lines, vec!["6765"]);
}
