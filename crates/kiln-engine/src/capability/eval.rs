//! Global `eval`, backed by the runtime's source compiler

use super::{arg, method};
use crate::context::Context;
use crate::loader::{RunError, UnitImage};
use crate::value::{ScriptResult, Value};
use std::sync::Arc;
use tracing::debug;

pub(super) fn install(ctx: &mut Context) {
    let global = ctx.global();
    method(ctx, &global, "eval", |ctx, _, args| eval(ctx, arg(args, 0)));
}

fn eval(ctx: &mut Context, source: Value) -> ScriptResult {
    let text = match &source {
        Value::String(text) => text.clone(),
        _ => return Ok(source),
    };
    let Some(compiler) = ctx.runtime().source_compiler() else {
        return Err(ctx.internal_error("eval is not supported: no source compiler is installed"));
    };

    let bytes = compiler
        .compile(&text, "<eval>")
        .map_err(|reason| ctx.syntax_error(reason))?;
    let image = match UnitImage::from_bytes(&bytes) {
        Ok(image) => image,
        Err(rejection) => return Err(ctx.syntax_error(rejection.to_string())),
    };
    if image.unit.is_module() {
        return Err(ctx.syntax_error("eval cannot run module code"));
    }

    debug!(context = ctx.id().as_u64(), bytes = bytes.len(), "eval");
    match ctx.run_unit(&Arc::new(image), None) {
        Ok(result) => Ok(result.value),
        Err(RunError::Thrown(thrown)) => Err(thrown),
        Err(RunError::Engine(err)) => Err(ctx.internal_error(err.to_string())),
    }
}
