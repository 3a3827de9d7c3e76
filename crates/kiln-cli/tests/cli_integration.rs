//! Integration tests for the `kiln` binary.
//!
//! Units are assembled with `kiln-bytecode`, written to a temp dir and run
//! through the real executable.

use kiln_bytecode::{FunctionBuilder, Opcode, UnitBuilder};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn kiln() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_kiln"));
    command.env_remove("KILN_CONFIG").env_remove("KILN_LOG");
    command
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn write_script(dir: &Path, file: &str, body: impl FnOnce(&mut FunctionBuilder)) -> PathBuf {
    let mut builder = UnitBuilder::script(file);
    let mut main = FunctionBuilder::new("", 0, 2);
    body(&mut main);
    builder.entry(main).unwrap();
    let path = dir.join(file);
    std::fs::write(&path, builder.finish().encode()).unwrap();
    path
}

fn log_literal(main: &mut FunctionBuilder, text: &str) {
    main.load_global("console")
        .const_str(text)
        .call_method("log", 1)
        .op(Opcode::Pop);
}

// ────────────────────────────────────────────────────────────────────────────
// Embedded demo
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_embedded_demo() {
    let output = kiln().output().unwrap();
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "Hello World\nfib(10)= 55\n");
}

// ────────────────────────────────────────────────────────────────────────────
// Unit files
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_runs_unit_file() {
    let dir = tempfile::tempdir().unwrap();
    let unit = write_script(dir.path(), "hello.klbc", |main| {
        log_literal(main, "Hello World");
        main.op(Opcode::ReturnUndefined);
    });
    let output = kiln().arg(&unit).output().unwrap();
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "Hello World\n");
}

#[test]
fn test_script_args_are_passed_through() {
    let dir = tempfile::tempdir().unwrap();
    let unit = write_script(dir.path(), "args.klbc", |main| {
        main.load_global("console")
            .load_global("scriptArgs")
            .call_method("log", 1)
            .op(Opcode::Pop)
            .op(Opcode::ReturnUndefined);
    });
    let output = kiln()
        .arg(&unit)
        .args(["--flag", "value"])
        .output()
        .unwrap();
    assert_eq!(stdout(&output), "--flag,value\n");
}

#[test]
fn test_uncaught_exception_exits_1() {
    let dir = tempfile::tempdir().unwrap();
    let unit = write_script(dir.path(), "throw.klbc", |main| {
        main.load_global("TypeError")
            .const_str("nope")
            .call(1)
            .op(Opcode::Throw);
    });
    let output = kiln().arg(&unit).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("error: "), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("TypeError: nope"));
}

#[test]
fn test_corrupt_unit_exits_2() {
    let dir = tempfile::tempdir().unwrap();
    let unit = dir.path().join("corrupt.klbc");
    std::fs::write(&unit, b"definitely not bytecode").unwrap();
    let output = kiln().arg(&unit).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(stdout(&output).is_empty());
}

#[test]
fn test_missing_unit_exits_3() {
    let dir = tempfile::tempdir().unwrap();
    let output = kiln().arg(dir.path().join("missing.klbc")).output().unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert!(stderr(&output).contains("Cannot read unit"));
}

#[test]
fn test_std_exit_status() {
    let dir = tempfile::tempdir().unwrap();
    let mut builder = UnitBuilder::module("exit.js");
    let mut main = FunctionBuilder::new("", 0, 0);
    main.import("std")
        .const_i32(9)
        .call_method("exit", 1)
        .op(Opcode::Pop)
        .op(Opcode::ReturnUndefined);
    builder.entry(main).unwrap();
    let unit = dir.path().join("exit.klbc");
    std::fs::write(&unit, builder.finish().encode()).unwrap();

    let output = kiln().arg(&unit).output().unwrap();
    assert_eq!(output.status.code(), Some(9));
}

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_disables_capability() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("kiln.toml");
    std::fs::write(&config, "[capabilities]\njson = false\n").unwrap();
    let unit = write_script(dir.path(), "json.klbc", |main| {
        main.load_global("JSON").op(Opcode::Pop).op(Opcode::ReturnUndefined);
    });

    let output = kiln().arg(&unit).env("KILN_CONFIG", &config).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("ReferenceError"), "stderr: {}", stderr(&output));
}

#[test]
fn test_invalid_config_exits_3() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("kiln.toml");
    std::fs::write(&config, "[limits]\nthreads = 8\n").unwrap();

    let output = kiln().env("KILN_CONFIG", &config).output().unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert!(stderr(&output).contains("KILN_CONFIG"), "stderr: {}", stderr(&output));
    assert!(stdout(&output).is_empty());
}
