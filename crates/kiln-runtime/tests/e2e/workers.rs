//! Workers spawned through `os.Worker`

use crate::harness::{module, run_source};
use kiln_bytecode::{FunctionBuilder, Opcode};
use kiln_runtime::{FileSource, HostConfig};

/// `parent.onmessage = e => parent.postMessage(e.data * 2)`
fn doubling_worker() -> Vec<u8> {
    module("worker.js", |unit, main| {
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
        let handler = unit.function(handler).unwrap();

        main.load_global("parent")
            .make_closure(handler)
            .set_field("onmessage")
            .op(Opcode::ReturnUndefined);
    })
}

/// Spawns `worker.js`, logs whatever comes back, sends it `21`
fn primary() -> Vec<u8> {
    module("main.js", |unit, main| {
        let mut reply = FunctionBuilder::new("onmessage", 1, 1);
        reply
            .load_global("console")
            .const_str("reply")
            .load_local(0)
            .get_field("data")
            .call_method("log", 2)
            .op(Opcode::Pop)
            .op(Opcode::ReturnUndefined);
        let reply = unit.function(reply).unwrap();

        main.import("os")
            .const_str("worker.js")
            .call_method("Worker", 1)
            .store_local(0)
            .load_local(0)
            .make_closure(reply)
            .set_field("onmessage")
            .load_local(0)
            .const_i32(21)
            .call_method("postMessage", 1)
            .op(Opcode::Pop)
            .op(Opcode::ReturnUndefined);
    })
}

#[test]
fn test_worker_round_trip_through_host() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("worker.js"), doubling_worker()).unwrap();
    let main = dir.path().join("main.klbc");
    std::fs::write(&main, primary()).unwrap();

    let run = run_source(HostConfig::default(), &FileSource::new(&main), &[]);
    assert!(run.outcome.is_success(), "{:?}", run.outcome);
    assert_eq!(run.lines, vec!["reply 42"]);
}

#[test]
fn test_worker_respects_context_limit() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("worker.js"), doubling_worker()).unwrap();
    let main = dir.path().join("main.klbc");
    std::fs::write(&main, primary()).unwrap();

    let config = HostConfig::from_toml_str("[limits]\nmax_contexts = 1\n").unwrap();
    let run = run_source(config, &FileSource::new(&main), &[]);
    assert_eq!(run.outcome.status, 1);
    assert!(run.lines.is_empty());
}
