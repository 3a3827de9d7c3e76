//! `JSON.parse` and `JSON.stringify` over `serde_json`

use super::{arg, method};
use crate::context::Context;
use crate::conv;
use crate::ops::PROPERTY_BYTES;
use crate::value::{ObjectKind, ObjectRef, ScriptResult, Value};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value as Json};

/// Largest magnitude printed as an integer
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

pub(super) fn install(ctx: &mut Context) {
    let json = ctx.new_object();
    method(ctx, &json, "parse", |ctx, _, args| {
        let text = conv::to_string(&arg(args, 0));
        match serde_json::from_str::<Json>(&text) {
            Ok(parsed) => Ok(from_json(ctx, parsed)),
            Err(err) => Err(ctx.syntax_error(format!("JSON.parse: {}", err))),
        }
    });
    method(ctx, &json, "stringify", |ctx, _, args| {
        let mut stack = Vec::new();
        let Some(tree) = to_json(ctx, &arg(args, 0), &mut stack)? else {
            return Ok(Value::Undefined);
        };
        let indent = indent_of(&arg(args, 2));
        let text = if indent.is_empty() {
            serde_json::to_string(&tree)
        } else {
            let mut out = Vec::new();
            let mut serializer =
                serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(indent.as_bytes()));
            tree.serialize(&mut serializer)
                .map(|_| String::from_utf8_lossy(&out).into_owned())
        };
        text.map(Value::from)
            .map_err(|err| ctx.internal_error(format!("JSON.stringify: {}", err)))
    });
    ctx.set_global("JSON", Value::Object(json));
}

fn from_json(ctx: &mut Context, json: Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        Json::String(s) => Value::from(s),
        Json::Array(items) => {
            let items = items.into_iter().map(|item| from_json(ctx, item)).collect();
            Value::Object(ctx.new_array(items))
        }
        Json::Object(entries) => {
            let object = ctx.new_object();
            ctx.heap.charge(entries.len() * PROPERTY_BYTES);
            for (key, item) in entries {
                let item = from_json(ctx, item);
                object.set_own(key, item);
            }
            Value::Object(object)
        }
    }
}

fn indent_of(value: &Value) -> String {
    match value {
        Value::Number(n) => " ".repeat(conv::to_integer(*n).clamp(0.0, 10.0) as usize),
        Value::String(s) => s.chars().take(10).collect(),
        _ => String::new(),
    }
}

fn number_to_json(n: f64) -> Json {
    if !n.is_finite() {
        Json::Null
    } else if n.fract() == 0.0 && n.abs() < MAX_EXACT_INTEGER {
        Json::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map(Json::Number).unwrap_or(Json::Null)
    }
}

/// `None` for values JSON omits (undefined, functions)
fn to_json(ctx: &mut Context, value: &Value, stack: &mut Vec<usize>) -> ScriptResult<Option<Json>> {
    let object = match value {
        Value::Undefined => return Ok(None),
        Value::Null => return Ok(Some(Json::Null)),
        Value::Bool(b) => return Ok(Some(Json::Bool(*b))),
        Value::Number(n) => return Ok(Some(number_to_json(*n))),
        Value::String(s) => return Ok(Some(Json::String(s.to_string()))),
        Value::BigInt(_) => return Err(ctx.type_error("Do not know how to serialize a BigInt")),
        Value::Object(o) => o,
    };
    if object.is_callable() {
        return Ok(None);
    }
    if let ObjectKind::Date(t) = object.borrow().kind {
        return Ok(Some(crate::capability::date::iso_string(t).map(Json::String).unwrap_or(Json::Null)));
    }
    if stack.contains(&object.addr()) {
        return Err(ctx.type_error("Converting circular structure to JSON"));
    }
    if stack.len() >= conv::MAX_NESTING_DEPTH {
        return Err(ctx.range_error("Maximum call stack size exceeded"));
    }

    stack.push(object.addr());
    let result = if let Some(items) = ctx.array_items(value) {
        array_to_json(ctx, items, stack)
    } else {
        object_to_json(ctx, object, value, stack)
    };
    stack.pop();
    result.map(Some)
}

fn array_to_json(ctx: &mut Context, items: Vec<Value>, stack: &mut Vec<usize>) -> ScriptResult<Json> {
    let mut out = Vec::with_capacity(items.len());
    for item in &items {
        out.push(to_json(ctx, item, stack)?.unwrap_or(Json::Null));
    }
    Ok(Json::Array(out))
}

fn object_to_json(
    ctx: &mut Context,
    object: &ObjectRef,
    value: &Value,
    stack: &mut Vec<usize>,
) -> ScriptResult<Json> {
    let mut out = Map::new();
    for key in ctx.own_keys(object) {
        let item = ctx.get_property(value, &key)?;
        if let Some(json) = to_json(ctx, &item, stack)? {
            out.insert(key, json);
        }
    }
    Ok(Json::Object(out))
}
