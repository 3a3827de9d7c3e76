//! Base object model: `Object`, `Function.prototype`, `Array`, errors,
//! `Math`, `String`, `Number`, `Boolean` and the global conversion helpers.

use super::{arg, constructor, method};
use crate::context::{Context, ERROR_KINDS};
use crate::conv;
use crate::ops::ELEMENT_BYTES;
use crate::value::{ObjectKind, ObjectRef, ScriptResult, Value};
use rand::Rng;

pub(super) fn install(ctx: &mut Context) {
    let global = ctx.global();
    ctx.set_global("globalThis", Value::Object(global));
    ctx.set_global("NaN", Value::Number(f64::NAN));
    ctx.set_global("Infinity", Value::Number(f64::INFINITY));
    ctx.set_global("undefined", Value::Undefined);

    install_object(ctx);
    install_function(ctx);
    install_array(ctx);
    install_errors(ctx);
    install_math(ctx);
    install_string(ctx);
    install_number(ctx);

    let proto = ctx.intrinsics.boolean_proto.clone();
    constructor(ctx, "Boolean", &proto, |_, _, args| {
        Ok(Value::Bool(conv::to_boolean(&arg(args, 0))))
    });

    let global = ctx.global();
    method(ctx, &global, "parseInt", |_, _, args| {
        let text = conv::to_string(&arg(args, 0));
        let radix = conv::to_integer(conv::to_number(&arg(args, 1))) as u32;
        Ok(Value::Number(parse_int(&text, radix)))
    });
    method(ctx, &global, "parseFloat", |_, _, args| {
        Ok(Value::Number(parse_float(&conv::to_string(&arg(args, 0)))))
    });
    method(ctx, &global, "isNaN", |_, _, args| {
        Ok(Value::Bool(conv::to_number(&arg(args, 0)).is_nan()))
    });
    method(ctx, &global, "isFinite", |_, _, args| {
        Ok(Value::Bool(conv::to_number(&arg(args, 0)).is_finite()))
    });
}

/// Receiver as an object, or a `TypeError` naming the method
fn this_object(ctx: &mut Context, this: &Value, method: &str) -> ScriptResult<ObjectRef> {
    match this {
        Value::Object(o) => Ok(o.clone()),
        other => Err(ctx.type_error(format!(
            "{} called on {}",
            method,
            conv::to_string(other)
        ))),
    }
}

fn this_array(ctx: &mut Context, this: &Value, method: &str) -> ScriptResult<(ObjectRef, Vec<Value>)> {
    if let Value::Object(o) = this {
        if let Some(items) = ctx.array_items(this) {
            return Ok((o.clone(), items));
        }
    }
    Err(ctx.type_error(format!("Array.prototype.{} called on a non-array", method)))
}

fn with_items<T>(array: &ObjectRef, f: impl FnOnce(&mut Vec<Value>) -> T) -> Option<T> {
    match &mut array.borrow_mut().kind {
        ObjectKind::Array(items) => Some(f(items)),
        _ => None,
    }
}

// ────────────────────────────────────────────────────────────────────────
// Object
// ────────────────────────────────────────────────────────────────────────

fn install_object(ctx: &mut Context) {
    let proto = ctx.intrinsics.object_proto.clone();
    let object = constructor(ctx, "Object", &proto, |ctx, _, args| match arg(args, 0) {
        Value::Object(o) => Ok(Value::Object(o)),
        _ => Ok(Value::Object(ctx.new_object())),
    });

    method(ctx, &object, "keys", |ctx, _, args| {
        let target = this_object(ctx, &arg(args, 0), "Object.keys")?;
        let keys = ctx.own_keys(&target).into_iter().map(Value::from).collect();
        Ok(Value::Object(ctx.new_array(keys)))
    });
    method(ctx, &object, "values", |ctx, _, args| {
        let value = arg(args, 0);
        let target = this_object(ctx, &value, "Object.values")?;
        let mut values = Vec::new();
        for key in ctx.own_keys(&target) {
            values.push(ctx.get_property(&value, &key)?);
        }
        Ok(Value::Object(ctx.new_array(values)))
    });
    method(ctx, &object, "entries", |ctx, _, args| {
        let value = arg(args, 0);
        let target = this_object(ctx, &value, "Object.entries")?;
        let mut entries = Vec::new();
        for key in ctx.own_keys(&target) {
            let item = ctx.get_property(&value, &key)?;
            let pair = ctx.new_array(vec![Value::from(key), item]);
            entries.push(Value::Object(pair));
        }
        Ok(Value::Object(ctx.new_array(entries)))
    });
    method(ctx, &object, "assign", |ctx, _, args| {
        let target = arg(args, 0);
        this_object(ctx, &target, "Object.assign")?;
        for source in args.iter().skip(1) {
            let Value::Object(o) = source else { continue };
            for key in ctx.own_keys(o) {
                let item = ctx.get_property(source, &key)?;
                ctx.set_property(&target, &key, item)?;
            }
        }
        Ok(target)
    });
    method(ctx, &object, "getPrototypeOf", |ctx, _, args| {
        let target = this_object(ctx, &arg(args, 0), "Object.getPrototypeOf")?;
        let proto = target.borrow().proto.clone();
        Ok(proto.map(Value::Object).unwrap_or(Value::Null))
    });
    method(ctx, &object, "create", |ctx, _, args| {
        let proto = match arg(args, 0) {
            Value::Object(o) => Some(o),
            Value::Null => None,
            _ => return Err(ctx.type_error("Object prototype may only be an Object or null")),
        };
        Ok(Value::Object(ctx.alloc(ObjectKind::Ordinary, proto)))
    });

    method(ctx, &proto, "hasOwnProperty", |ctx, this, args| {
        let target = this_object(ctx, this, "hasOwnProperty")?;
        let key = conv::to_string(&arg(args, 0));
        Ok(Value::Bool(ctx.own_keys(&target).contains(&key)))
    });
    method(ctx, &proto, "toString", |_, this, _| {
        Ok(Value::from(match this {
            Value::Object(o) if matches!(o.borrow().kind, ObjectKind::Ordinary) => {
                "[object Object]".to_string()
            }
            other => conv::to_string(other),
        }))
    });
}

// ────────────────────────────────────────────────────────────────────────
// Function.prototype
// ────────────────────────────────────────────────────────────────────────

fn install_function(ctx: &mut Context) {
    let proto = ctx.intrinsics.function_proto.clone();
    method(ctx, &proto, "call", |ctx, this, args| {
        let receiver = arg(args, 0);
        let rest = args.get(1..).unwrap_or(&[]);
        ctx.call(this, &receiver, rest)
    });
    method(ctx, &proto, "apply", |ctx, this, args| {
        let receiver = arg(args, 0);
        let list = match arg(args, 1) {
            Value::Undefined | Value::Null => Vec::new(),
            other => match ctx.array_items(&other) {
                Some(items) => items,
                None => return Err(ctx.type_error("argument list must be an array")),
            },
        };
        ctx.call(this, &receiver, &list)
    });
    method(ctx, &proto, "bind", |ctx, this, args| {
        if !this.is_callable() {
            return Err(ctx.type_error("Bind must be called on a function"));
        }
        let target = this.clone();
        let receiver = arg(args, 0);
        let bound: Vec<Value> = args.get(1..).unwrap_or(&[]).to_vec();
        let bound_fn = ctx.new_function("bound", move |ctx, _, args| {
            let mut all = bound.clone();
            all.extend_from_slice(args);
            ctx.call(&target, &receiver, &all)
        });
        Ok(Value::Object(bound_fn))
    });
}

// ────────────────────────────────────────────────────────────────────────
// Array
// ────────────────────────────────────────────────────────────────────────

fn install_array(ctx: &mut Context) {
    let proto = ctx.intrinsics.array_proto.clone();
    let array = constructor(ctx, "Array", &proto, |ctx, _, args| {
        if let [Value::Number(n)] = args {
            if *n < 0.0 || n.fract() != 0.0 || *n >= u32::MAX as f64 {
                return Err(ctx.range_error("invalid array length"));
            }
            let items = vec![Value::Undefined; *n as usize];
            return Ok(Value::Object(ctx.new_array(items)));
        }
        Ok(Value::Object(ctx.new_array(args.to_vec())))
    });
    method(ctx, &array, "isArray", |ctx, _, args| {
        Ok(Value::Bool(ctx.array_items(&arg(args, 0)).is_some()))
    });

    method(ctx, &proto, "push", |ctx, this, args| {
        let (array, _) = this_array(ctx, this, "push")?;
        let len = with_items(&array, |items| {
            items.extend_from_slice(args);
            items.len()
        })
        .unwrap_or_default();
        ctx.heap.charge(args.len() * ELEMENT_BYTES);
        Ok(Value::from(len))
    });
    method(ctx, &proto, "pop", |ctx, this, _| {
        let (array, _) = this_array(ctx, this, "pop")?;
        Ok(with_items(&array, |items| items.pop()).flatten().unwrap_or_default())
    });
    method(ctx, &proto, "shift", |ctx, this, _| {
        let (array, _) = this_array(ctx, this, "shift")?;
        let first = with_items(&array, |items| {
            if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            }
        });
        Ok(first.flatten().unwrap_or_default())
    });
    method(ctx, &proto, "join", |ctx, this, args| {
        let (_, items) = this_array(ctx, this, "join")?;
        let separator = match arg(args, 0) {
            Value::Undefined => ",".to_string(),
            other => conv::to_string(&other),
        };
        let parts: Vec<String> = items
            .iter()
            .map(|item| if item.is_nullish() { String::new() } else { conv::to_string(item) })
            .collect();
        Ok(Value::from(parts.join(&separator)))
    });
    method(ctx, &proto, "indexOf", |ctx, this, args| {
        let (_, items) = this_array(ctx, this, "indexOf")?;
        let needle = arg(args, 0);
        let start = conv::relative_index(&arg(args, 1), items.len(), 0);
        let found = items
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, item)| conv::strict_equals(item, &needle))
            .map(|(i, _)| i as f64);
        Ok(Value::Number(found.unwrap_or(-1.0)))
    });
    method(ctx, &proto, "includes", |ctx, this, args| {
        let (_, items) = this_array(ctx, this, "includes")?;
        let needle = arg(args, 0);
        Ok(Value::Bool(items.iter().any(|item| conv::same_value_zero(item, &needle))))
    });
    method(ctx, &proto, "slice", |ctx, this, args| {
        let (_, items) = this_array(ctx, this, "slice")?;
        let start = conv::relative_index(&arg(args, 0), items.len(), 0);
        let end = conv::relative_index(&arg(args, 1), items.len(), items.len());
        let slice = if start < end { items[start..end].to_vec() } else { Vec::new() };
        Ok(Value::Object(ctx.new_array(slice)))
    });
    method(ctx, &proto, "concat", |ctx, this, args| {
        let (_, mut items) = this_array(ctx, this, "concat")?;
        for extra in args {
            match ctx.array_items(extra) {
                Some(more) => items.extend(more),
                None => items.push(extra.clone()),
            }
        }
        Ok(Value::Object(ctx.new_array(items)))
    });
    method(ctx, &proto, "reverse", |ctx, this, _| {
        let (array, _) = this_array(ctx, this, "reverse")?;
        with_items(&array, |items| items.reverse());
        Ok(this.clone())
    });
    method(ctx, &proto, "forEach", |ctx, this, args| {
        let (_, items) = this_array(ctx, this, "forEach")?;
        let callback = arg(args, 0);
        for (i, item) in items.into_iter().enumerate() {
            ctx.call(&callback, &Value::Undefined, &[item, Value::from(i), this.clone()])?;
        }
        Ok(Value::Undefined)
    });
    method(ctx, &proto, "map", |ctx, this, args| {
        let (_, items) = this_array(ctx, this, "map")?;
        let callback = arg(args, 0);
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            out.push(ctx.call(&callback, &Value::Undefined, &[item, Value::from(i), this.clone()])?);
        }
        Ok(Value::Object(ctx.new_array(out)))
    });
    method(ctx, &proto, "filter", |ctx, this, args| {
        let (_, items) = this_array(ctx, this, "filter")?;
        let callback = arg(args, 0);
        let mut out = Vec::new();
        for (i, item) in items.into_iter().enumerate() {
            let keep = ctx.call(&callback, &Value::Undefined, &[item.clone(), Value::from(i), this.clone()])?;
            if conv::to_boolean(&keep) {
                out.push(item);
            }
        }
        Ok(Value::Object(ctx.new_array(out)))
    });
    method(ctx, &proto, "toString", |ctx, this, _| {
        this_array(ctx, this, "toString")?;
        Ok(Value::from(conv::to_string(this)))
    });
}

// ────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────

fn install_errors(ctx: &mut Context) {
    let proto = ctx.intrinsics.error_proto.clone();
    constructor(ctx, "Error", &proto, |ctx, _, args| Ok(make_error(ctx, "Error", args)));
    method(ctx, &proto, "toString", |_, this, _| Ok(Value::from(conv::to_string(this))));

    for kind in ERROR_KINDS {
        let Some(proto) = ctx.intrinsics.error_protos.get(kind).cloned() else {
            continue;
        };
        constructor(ctx, kind, &proto, move |ctx, _, args| Ok(make_error(ctx, kind, args)));
    }
}

fn make_error(ctx: &mut Context, kind: &str, args: &[Value]) -> Value {
    let message = match arg(args, 0) {
        Value::Undefined => String::new(),
        other => conv::to_string(&other),
    };
    ctx.make_error(kind, &message)
}

// ────────────────────────────────────────────────────────────────────────
// Math
// ────────────────────────────────────────────────────────────────────────

fn install_math(ctx: &mut Context) {
    let math = ctx.new_object();
    math.set_own("PI", Value::Number(std::f64::consts::PI));
    math.set_own("E", Value::Number(std::f64::consts::E));

    let unary: [(&str, fn(f64) -> f64); 7] = [
        ("abs", f64::abs),
        ("floor", f64::floor),
        ("ceil", f64::ceil),
        ("sqrt", f64::sqrt),
        ("trunc", f64::trunc),
        ("sign", |x| if x == 0.0 || x.is_nan() { x } else { x.signum() }),
        // Halves round toward +Infinity
        ("round", |x| (x + 0.5).floor()),
    ];
    for (name, f) in unary {
        method(ctx, &math, name, move |_, _, args| {
            Ok(Value::Number(f(conv::to_number(&arg(args, 0)))))
        });
    }

    method(ctx, &math, "pow", |_, _, args| {
        let base = conv::to_number(&arg(args, 0));
        let exponent = conv::to_number(&arg(args, 1));
        Ok(Value::Number(base.powf(exponent)))
    });
    method(ctx, &math, "max", |_, _, args| {
        let mut best = f64::NEG_INFINITY;
        for value in args {
            let n = conv::to_number(value);
            if n.is_nan() {
                return Ok(Value::Number(f64::NAN));
            }
            best = best.max(n);
        }
        Ok(Value::Number(best))
    });
    method(ctx, &math, "min", |_, _, args| {
        let mut best = f64::INFINITY;
        for value in args {
            let n = conv::to_number(value);
            if n.is_nan() {
                return Ok(Value::Number(f64::NAN));
            }
            best = best.min(n);
        }
        Ok(Value::Number(best))
    });
    method(ctx, &math, "random", |_, _, _| {
        Ok(Value::Number(rand::thread_rng().gen::<f64>()))
    });

    ctx.set_global("Math", Value::Object(math));
}

// ────────────────────────────────────────────────────────────────────────
// String
// ────────────────────────────────────────────────────────────────────────

fn this_string(ctx: &mut Context, this: &Value, method: &str) -> ScriptResult<String> {
    match this {
        Value::Undefined | Value::Null => Err(ctx.type_error(format!(
            "String.prototype.{} called on {}",
            method,
            conv::to_string(this)
        ))),
        other => Ok(conv::to_string(other)),
    }
}

/// Char index of the first occurrence of `needle` at or after `from`
fn find_chars(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    (from..haystack.len())
        .take_while(|i| i + needle.len() <= haystack.len())
        .find(|i| haystack[*i..*i + needle.len()] == *needle)
}

fn install_string(ctx: &mut Context) {
    let proto = ctx.intrinsics.string_proto.clone();
    constructor(ctx, "String", &proto, |_, _, args| {
        Ok(match args.first() {
            None => Value::from(""),
            Some(value) => Value::from(conv::to_string(value)),
        })
    });

    method(ctx, &proto, "toString", |ctx, this, _| {
        Ok(Value::from(this_string(ctx, this, "toString")?))
    });
    method(ctx, &proto, "toUpperCase", |ctx, this, _| {
        Ok(Value::from(this_string(ctx, this, "toUpperCase")?.to_uppercase()))
    });
    method(ctx, &proto, "toLowerCase", |ctx, this, _| {
        Ok(Value::from(this_string(ctx, this, "toLowerCase")?.to_lowercase()))
    });
    method(ctx, &proto, "trim", |ctx, this, _| {
        Ok(Value::from(this_string(ctx, this, "trim")?.trim()))
    });
    method(ctx, &proto, "charAt", |ctx, this, args| {
        let s = this_string(ctx, this, "charAt")?;
        let index = conv::to_integer(conv::to_number(&arg(args, 0)));
        let c = if index < 0.0 { None } else { s.chars().nth(index as usize) };
        Ok(Value::from(c.map(String::from).unwrap_or_default()))
    });
    method(ctx, &proto, "indexOf", |ctx, this, args| {
        let s: Vec<char> = this_string(ctx, this, "indexOf")?.chars().collect();
        let needle: Vec<char> = conv::to_string(&arg(args, 0)).chars().collect();
        let from = conv::relative_index(&arg(args, 1), s.len(), 0);
        let found = find_chars(&s, &needle, from).map(|i| i as f64);
        Ok(Value::Number(found.unwrap_or(-1.0)))
    });
    method(ctx, &proto, "includes", |ctx, this, args| {
        let s: Vec<char> = this_string(ctx, this, "includes")?.chars().collect();
        let needle: Vec<char> = conv::to_string(&arg(args, 0)).chars().collect();
        Ok(Value::Bool(find_chars(&s, &needle, 0).is_some()))
    });
    method(ctx, &proto, "startsWith", |ctx, this, args| {
        let s = this_string(ctx, this, "startsWith")?;
        Ok(Value::Bool(s.starts_with(&conv::to_string(&arg(args, 0)))))
    });
    method(ctx, &proto, "endsWith", |ctx, this, args| {
        let s = this_string(ctx, this, "endsWith")?;
        Ok(Value::Bool(s.ends_with(&conv::to_string(&arg(args, 0)))))
    });
    method(ctx, &proto, "slice", |ctx, this, args| {
        let s: Vec<char> = this_string(ctx, this, "slice")?.chars().collect();
        let start = conv::relative_index(&arg(args, 0), s.len(), 0);
        let end = conv::relative_index(&arg(args, 1), s.len(), s.len());
        let out: String = if start < end { s[start..end].iter().collect() } else { String::new() };
        Ok(Value::from(out))
    });
    method(ctx, &proto, "split", |ctx, this, args| {
        let s = this_string(ctx, this, "split")?;
        let parts: Vec<Value> = match arg(args, 0) {
            Value::Undefined => vec![Value::from(s)],
            separator => {
                let separator = conv::to_string(&separator);
                if separator.is_empty() {
                    s.chars().map(|c| Value::from(c.to_string())).collect()
                } else {
                    s.split(separator.as_str()).map(Value::from).collect()
                }
            }
        };
        Ok(Value::Object(ctx.new_array(parts)))
    });
    method(ctx, &proto, "repeat", |ctx, this, args| {
        let s = this_string(ctx, this, "repeat")?;
        let count = conv::to_integer(conv::to_number(&arg(args, 0)));
        if count < 0.0 || count.is_infinite() {
            return Err(ctx.range_error("Invalid count value"));
        }
        ctx.heap.charge(s.len() * count as usize);
        Ok(Value::from(s.repeat(count as usize)))
    });
}

// ────────────────────────────────────────────────────────────────────────
// Number
// ────────────────────────────────────────────────────────────────────────

fn this_number(ctx: &mut Context, this: &Value, method: &str) -> ScriptResult<f64> {
    match this {
        Value::Number(n) => Ok(*n),
        other => Err(ctx.type_error(format!(
            "Number.prototype.{} called on {}",
            method,
            conv::to_string(other)
        ))),
    }
}

fn install_number(ctx: &mut Context) {
    let proto = ctx.intrinsics.number_proto.clone();
    let number = constructor(ctx, "Number", &proto, |_, _, args| {
        Ok(Value::Number(match args.first() {
            None => 0.0,
            Some(value) => conv::to_number(value),
        }))
    });
    number.set_own("MAX_SAFE_INTEGER", Value::Number(9_007_199_254_740_991.0));
    number.set_own("EPSILON", Value::Number(f64::EPSILON));
    method(ctx, &number, "isInteger", |_, _, args| {
        Ok(Value::Bool(match arg(args, 0) {
            Value::Number(n) => n.is_finite() && n.fract() == 0.0,
            _ => false,
        }))
    });

    method(ctx, &proto, "toString", |ctx, this, args| {
        let n = this_number(ctx, this, "toString")?;
        let radix = match arg(args, 0) {
            Value::Undefined => 10,
            other => conv::to_integer(conv::to_number(&other)) as u32,
        };
        if !(2..=36).contains(&radix) {
            return Err(ctx.range_error("toString() radix must be between 2 and 36"));
        }
        if radix == 10 || !n.is_finite() || n.fract() != 0.0 {
            return Ok(Value::from(conv::number_to_string(n)));
        }
        Ok(Value::from(integer_to_radix(n, radix)))
    });
    method(ctx, &proto, "toFixed", |ctx, this, args| {
        let n = this_number(ctx, this, "toFixed")?;
        let digits = conv::to_integer(conv::to_number(&arg(args, 0)));
        if !(0.0..=100.0).contains(&digits) {
            return Err(ctx.range_error("toFixed() digits argument must be between 0 and 100"));
        }
        if !n.is_finite() {
            return Ok(Value::from(conv::number_to_string(n)));
        }
        Ok(Value::from(format!("{:.*}", digits as usize, n)))
    });
}

fn integer_to_radix(n: f64, radix: u32) -> String {
    let negative = n < 0.0;
    let mut value = n.abs();
    let mut digits = Vec::new();
    while value >= 1.0 {
        let digit = (value % radix as f64) as u32;
        digits.push(std::char::from_digit(digit, radix).unwrap_or('0'));
        value = (value / radix as f64).floor();
    }
    if digits.is_empty() {
        digits.push('0');
    }
    if negative {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

fn parse_int(text: &str, radix: u32) -> f64 {
    let mut s = text.trim_start();
    let negative = s.starts_with('-');
    if negative || s.starts_with('+') {
        s = &s[1..];
    }
    let mut radix = radix;
    if radix == 0 || radix == 16 {
        if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            s = rest;
            radix = 16;
        }
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let digits: Vec<u32> = s.chars().map_while(|c| c.to_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let value = digits
        .iter()
        .fold(0.0, |acc, d| acc * radix as f64 + *d as f64);
    if negative {
        -value
    } else {
        value
    }
}

fn parse_float(text: &str) -> f64 {
    let s = text.trim_start();
    for (prefix, value) in [
        ("Infinity", f64::INFINITY),
        ("+Infinity", f64::INFINITY),
        ("-Infinity", f64::NEG_INFINITY),
    ] {
        if s.starts_with(prefix) {
            return value;
        }
    }
    // Longest prefix that parses as a decimal literal
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'0'..=b'9' => {
                seen_digit = true;
                end = i + 1;
            }
            b'+' | b'-' if i == 0 => {}
            b'.' if !seen_dot && !seen_exp => seen_dot = true,
            b'e' | b'E' if seen_digit && !seen_exp => {
                seen_exp = true;
                if matches!(bytes.get(i + 1), Some(b'+') | Some(b'-')) {
                    i += 1;
                }
            }
            _ => break,
        }
        i += 1;
    }
    if !seen_digit {
        return f64::NAN;
    }
    s[..end].parse::<f64>().unwrap_or(f64::NAN)
}
