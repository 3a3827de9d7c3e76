//! Std helpers and host modules
//!
//! Globals: `console.log`, `print` and `scriptArgs`.
//!
//! Modules:
//! - `std`: `loadFile(path)`, `getenv(name)`, `puts(text)`, `exit(code)`
//! - `os`: `setTimeout(fn, ms, ...args)`, `clearTimeout(id)`, `now()`,
//!   `Worker(specifier)`
//!
//! Console output goes to the context's console sink, one line per call.

use kiln_engine::{conv, spawn_worker, Context, EngineError, ObjectRef, ScriptResult, Value};
use std::sync::OnceLock;
use std::time::Instant;

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn define(ctx: &mut Context, target: &ObjectRef, name: &str, f: fn(&mut Context, &Value, &[Value]) -> ScriptResult) {
    let function = ctx.new_function(name, f);
    target.set_own(name, Value::Object(function));
}

/// Install the globals and register the `std` and `os` modules
pub fn install(ctx: &mut Context, args: &[String]) -> Result<(), EngineError> {
    let console = ctx.new_object();
    define(ctx, &console, "log", log);
    ctx.set_global("console", Value::Object(console));

    let print = ctx.new_function("print", log);
    ctx.set_global("print", Value::Object(print));

    let items = args.iter().map(|a| Value::from(a.as_str())).collect();
    let script_args = ctx.new_array(items);
    ctx.set_global("scriptArgs", Value::Object(script_args));

    let std_exports = ctx.new_object();
    define(ctx, &std_exports, "loadFile", load_file);
    define(ctx, &std_exports, "getenv", getenv);
    define(ctx, &std_exports, "puts", puts);
    define(ctx, &std_exports, "exit", exit);
    ctx.register_host_module("std", &std_exports)?;

    let os_exports = ctx.new_object();
    define(ctx, &os_exports, "setTimeout", set_timeout);
    define(ctx, &os_exports, "clearTimeout", clear_timeout);
    define(ctx, &os_exports, "now", now);
    define(ctx, &os_exports, "Worker", worker);
    ctx.register_host_module("os", &os_exports)?;
    Ok(())
}

/// Render arguments the way `console.log` prints them
pub fn format_line(args: &[Value]) -> String {
    args.iter().map(conv::to_string).collect::<Vec<_>>().join(" ")
}

fn log(ctx: &mut Context, _this: &Value, args: &[Value]) -> ScriptResult {
    ctx.console().write_line(&format_line(args));
    Ok(Value::Undefined)
}

// ────────────────────────────────────────────────────────────────────────
// std
// ────────────────────────────────────────────────────────────────────────

fn load_file(_ctx: &mut Context, _this: &Value, args: &[Value]) -> ScriptResult {
    let path = conv::to_string(&arg(args, 0));
    match std::fs::read_to_string(&path) {
        Ok(text) => Ok(Value::from(text)),
        Err(_) => Ok(Value::Null),
    }
}

fn getenv(_ctx: &mut Context, _this: &Value, args: &[Value]) -> ScriptResult {
    let name = conv::to_string(&arg(args, 0));
    Ok(std::env::var(name).map(Value::from).unwrap_or_default())
}

fn puts(ctx: &mut Context, _this: &Value, args: &[Value]) -> ScriptResult {
    ctx.console().write_line(&conv::to_string(&arg(args, 0)));
    Ok(Value::Undefined)
}

fn exit(ctx: &mut Context, _this: &Value, args: &[Value]) -> ScriptResult {
    let code = match arg(args, 0) {
        Value::Undefined => 0,
        other => conv::to_integer(conv::to_number(&other)).clamp(i32::MIN as f64, i32::MAX as f64) as i32,
    };
    ctx.request_exit(code);
    Ok(Value::Undefined)
}

// ────────────────────────────────────────────────────────────────────────
// os
// ────────────────────────────────────────────────────────────────────────

fn set_timeout(ctx: &mut Context, _this: &Value, args: &[Value]) -> ScriptResult {
    let callback = arg(args, 0);
    if !callback.is_callable() {
        return Err(ctx.type_error("setTimeout: callback is not a function"));
    }
    let delay = conv::to_number(&arg(args, 1));
    let extra = args.iter().skip(2).cloned().collect();
    let id = ctx.set_timeout(callback, delay, extra);
    Ok(Value::Number(id as f64))
}

fn clear_timeout(ctx: &mut Context, _this: &Value, args: &[Value]) -> ScriptResult {
    let id = conv::to_number(&arg(args, 0));
    if id.is_finite() && id >= 0.0 {
        ctx.clear_timeout(id as u64);
    }
    Ok(Value::Undefined)
}

fn now(_ctx: &mut Context, _this: &Value, _args: &[Value]) -> ScriptResult {
    static START: OnceLock<Instant> = OnceLock::new();
    let start = START.get_or_init(Instant::now);
    Ok(Value::Number(start.elapsed().as_secs_f64() * 1000.0))
}

fn worker(ctx: &mut Context, _this: &Value, args: &[Value]) -> ScriptResult {
    let specifier = conv::to_string(&arg(args, 0));
    let handle = spawn_worker(ctx, &specifier)?;
    Ok(Value::Object(handle))
}
