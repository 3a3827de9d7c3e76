//! Shared helpers for end-to-end tests

use kiln_bytecode::{FunctionBuilder, UnitBuilder};
use kiln_engine::MemorySink;
use kiln_runtime::{BytesSource, Host, HostConfig, HostOutcome, UnitSource};
use std::sync::Arc;

/// Encoded script-mode unit
pub fn script(name: &str, build: impl FnOnce(&mut UnitBuilder, &mut FunctionBuilder)) -> Vec<u8> {
    let mut builder = UnitBuilder::script(name);
    let mut main = FunctionBuilder::new("", 0, 4);
    build(&mut builder, &mut main);
    builder.entry(main).unwrap();
    builder.finish().encode()
}

/// Encoded module-mode unit
pub fn module(name: &str, build: impl FnOnce(&mut UnitBuilder, &mut FunctionBuilder)) -> Vec<u8> {
    let mut builder = UnitBuilder::module(name);
    let mut main = FunctionBuilder::new("", 0, 4);
    build(&mut builder, &mut main);
    builder.entry(main).unwrap();
    builder.finish().encode()
}

/// Result of a captured run
pub struct Run {
    pub outcome: HostOutcome,
    pub lines: Vec<String>,
}

/// Run `source` under `config`, capturing console output
pub fn run_source(config: HostConfig, source: &dyn UnitSource, args: &[&str]) -> Run {
    let sink = MemorySink::new();
    let host = Host::new(config).with_console(Arc::new(sink.clone()));
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    let outcome = host.run(source, &args);
    Run {
        outcome,
        lines: sink.lines(),
    }
}

/// Run in-memory unit bytes under the default configuration
pub fn run_bytes(name: &str, bytes: Vec<u8>) -> Run {
    run_source(HostConfig::default(), &BytesSource::new(name, bytes), &[])
}
