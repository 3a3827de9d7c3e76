//! Value conversions and equality
//!
//! Everything here is pure: no user code runs during a conversion, so an
//! object converts through its internal kind only.

use crate::capability::date;
use crate::value::{MapKey, ObjectKind, ObjectRef, Value};
use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive};
use std::cmp::Ordering;

/// Truthiness
pub fn to_boolean(value: &Value) -> bool {
    match value {
        Value::Undefined | Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => !(n.is_nan() || *n == 0.0),
        Value::BigInt(b) => b.sign() != num_bigint::Sign::NoSign,
        Value::String(s) => !s.is_empty(),
        Value::Object(_) => true,
    }
}

/// Numeric conversion
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Undefined => f64::NAN,
        Value::Null => 0.0,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Number(n) => *n,
        Value::BigInt(b) => b.to_f64().unwrap_or(f64::NAN),
        Value::String(s) => string_to_number(s),
        Value::Object(o) => {
            if let ObjectKind::Date(t) = o.borrow().kind {
                return t;
            }
            string_to_number(&to_string(value))
        }
    }
}

/// Parse a numeric string the way `Number(s)` does
pub fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = t.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix)
                .map(|v| v as f64)
                .unwrap_or(f64::NAN);
        }
    }
    // Rust also accepts "inf" and "nan"
    if t.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

/// Shortest round-tripping decimal form of a number
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if n.fract() == 0.0 && abs < 1e21 {
        return format!("{:.0}", n);
    }
    if (1e-6..1e21).contains(&abs) {
        return format!("{}", n);
    }
    let exp = format!("{:e}", n);
    match exp.find('e') {
        Some(at) if !exp[at + 1..].starts_with('-') => {
            format!("{}e+{}", &exp[..at], &exp[at + 1..])
        }
        _ => exp,
    }
}

/// Deepest object nesting that recursive conversions (string rendering,
/// `JSON.stringify`, structured clone) walk into
pub(crate) const MAX_NESTING_DEPTH: usize = 512;

/// String conversion.
///
/// Cycles and objects nested deeper than 512 levels render as the empty
/// string.
pub fn to_string(value: &Value) -> String {
    let mut seen = Vec::new();
    display(value, &mut seen)
}

fn display(value: &Value, seen: &mut Vec<usize>) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_to_string(*n),
        Value::BigInt(b) => b.to_string(),
        Value::String(s) => s.to_string(),
        Value::Object(o) => {
            if seen.len() >= MAX_NESTING_DEPTH || seen.contains(&o.addr()) {
                return String::new();
            }
            seen.push(o.addr());
            let out = object_to_string(o, seen);
            seen.pop();
            out
        }
    }
}

fn object_to_string(o: &ObjectRef, seen: &mut Vec<usize>) -> String {
    if matches!(o.borrow().kind, ObjectKind::Error) {
        return error_to_string(o, seen);
    }
    let object = o.borrow();
    match &object.kind {
        ObjectKind::Array(items) => items
            .iter()
            .map(|item| {
                if item.is_nullish() {
                    String::new()
                } else {
                    display(item, seen)
                }
            })
            .collect::<Vec<_>>()
            .join(","),
        ObjectKind::Function(_) => {
            let name = object
                .props
                .get("name")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            format!("function {}() {{ [native code] }}", name)
        }
        ObjectKind::Date(t) => date::iso_string(*t).unwrap_or_else(|| "Invalid Date".to_string()),
        ObjectKind::RegExp(re) => format!("/{}/{}", re.source, re.flags),
        ObjectKind::Uint8Array(view) => view
            .to_vec()
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(","),
        ObjectKind::Ordinary => "[object Object]".to_string(),
        kind => format!("[object {}]", kind.name()),
    }
}

fn error_to_string(o: &ObjectRef, seen: &mut Vec<usize>) -> String {
    let name = chain_get(o, "name")
        .map(|v| display(&v, seen))
        .unwrap_or_else(|| "Error".to_string());
    let message = chain_get(o, "message")
        .map(|v| display(&v, seen))
        .unwrap_or_default();
    match (name.is_empty(), message.is_empty()) {
        (_, true) => name,
        (true, false) => message,
        (false, false) => format!("{}: {}", name, message),
    }
}

/// Property lookup along the prototype chain, ignoring exotic behaviour
pub(crate) fn chain_get(object: &ObjectRef, key: &str) -> Option<Value> {
    let mut current = Some(object.clone());
    while let Some(o) = current {
        let borrowed = o.borrow();
        if let Some(v) = borrowed.props.get(key) {
            return Some(v.clone());
        }
        current = borrowed.proto.clone();
    }
    None
}

/// `typeof`
pub fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Undefined => "undefined",
        Value::Null => "object",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::BigInt(_) => "bigint",
        Value::String(_) => "string",
        Value::Object(o) => {
            if o.is_callable() {
                "function"
            } else {
                "object"
            }
        }
    }
}

/// `===`
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::BigInt(x), Value::BigInt(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Object(x), Value::Object(y)) => x.ptr_eq(y),
        _ => false,
    }
}

/// `==`
pub fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            *n == string_to_number(s)
        }
        (Value::BigInt(x), Value::Number(n)) | (Value::Number(n), Value::BigInt(x)) => {
            bigint_cmp_f64(x, *n) == Some(Ordering::Equal)
        }
        (Value::BigInt(x), Value::String(s)) | (Value::String(s), Value::BigInt(x)) => {
            s.trim().parse::<BigInt>().map_or(false, |y| **x == y)
        }
        (Value::Bool(x), other) | (other, Value::Bool(x)) => {
            loose_equals(&Value::Number(if *x { 1.0 } else { 0.0 }), other)
        }
        (Value::Object(x), Value::Object(y)) => x.ptr_eq(y),
        (Value::Object(_), primitive) | (primitive, Value::Object(_)) => {
            let object = if matches!(a, Value::Object(_)) { a } else { b };
            loose_equals(&Value::string(to_string(object)), primitive)
        }
        _ => strict_equals(a, b),
    }
}

/// SameValueZero, as used by `Map`, `Set` and `includes`
pub fn same_value_zero(a: &Value, b: &Value) -> bool {
    MapKey::of(a) == MapKey::of(b)
}

/// Compare a BigInt with a double; `None` when `n` is NaN
pub fn bigint_cmp_f64(b: &BigInt, n: f64) -> Option<Ordering> {
    if n.is_nan() {
        return None;
    }
    if n.is_infinite() {
        return Some(if n > 0.0 { Ordering::Less } else { Ordering::Greater });
    }
    let floor = BigInt::from_f64(n.floor())?;
    match b.cmp(&floor) {
        Ordering::Equal if n.fract() != 0.0 => Some(Ordering::Less),
        ord => Some(ord),
    }
}

/// Parse a canonical array index ("0", "17", never "01" or "-1")
pub fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || key.len() > 10 {
        return None;
    }
    if key.len() > 1 && key.starts_with('0') {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index: u64 = key.parse().ok()?;
    if index >= u32::MAX as u64 {
        return None;
    }
    Some(index as usize)
}

/// Truncate toward zero, mapping NaN to 0
pub fn to_integer(n: f64) -> f64 {
    if n.is_nan() {
        0.0
    } else {
        n.trunc()
    }
}

/// Resolve a relative index argument (negative counts from the end) into `0..=len`
pub fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if value.is_undefined() {
        return default;
    }
    let n = to_integer(to_number(value));
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

/// Byte value stored by a `Uint8Array` element write (modulo 256)
pub fn to_uint8(value: &Value) -> u8 {
    let n = to_number(value);
    if !n.is_finite() {
        return 0;
    }
    (n.trunc().rem_euclid(256.0)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Object;

    #[test]
    fn test_number_formatting() {
        assert_eq!(number_to_string(55.0), "55");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.1), "0.1");
        assert_eq!(number_to_string(1.5), "1.5");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(1e-7), "1e-7");
        assert_eq!(number_to_string(123456789012.0), "123456789012");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(string_to_number("  42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x1f"), 31.0);
        assert_eq!(string_to_number("1e3"), 1000.0);
        assert!(string_to_number("inf").is_nan());
        assert!(string_to_number("12px").is_nan());
        assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
    }

    #[test]
    fn test_loose_equality() {
        assert!(loose_equals(&Value::Null, &Value::Undefined));
        assert!(loose_equals(&Value::Number(1.0), &Value::from("1")));
        assert!(loose_equals(&Value::Bool(true), &Value::Number(1.0)));
        assert!(!loose_equals(&Value::Null, &Value::Number(0.0)));
        assert!(loose_equals(
            &Value::from(BigInt::from(10)),
            &Value::Number(10.0)
        ));
        assert!(!strict_equals(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
    }

    #[test]
    fn test_array_index() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("42"), Some(42));
        assert_eq!(array_index("042"), None);
        assert_eq!(array_index("-1"), None);
        assert_eq!(array_index("length"), None);
    }

    #[test]
    fn test_array_to_string_handles_cycles() {
        let array = ObjectRef::from_object(Object::new(ObjectKind::Array(Vec::new()), None));
        if let ObjectKind::Array(items) = &mut array.borrow_mut().kind {
            items.push(Value::Number(1.0));
            items.push(Value::Null);
        }
        let value = Value::Object(array.clone());
        if let ObjectKind::Array(items) = &mut array.borrow_mut().kind {
            items.push(value.clone());
        }
        assert_eq!(to_string(&value), "1,,");
    }

    #[test]
    fn test_deeply_nested_array_renders_empty() {
        let nest = |depth: usize| {
            let mut value = Value::from("x");
            for _ in 0..depth {
                value = Value::Object(ObjectRef::from_object(Object::new(ObjectKind::Array(vec![value]), None)));
            }
            value
        };
        assert_eq!(to_string(&nest(3)), "x");
        assert_eq!(to_string(&nest(MAX_NESTING_DEPTH)), "x");
        assert_eq!(to_string(&nest(MAX_NESTING_DEPTH + 1)), "");
        assert_eq!(to_string(&nest(100_000)), "");
    }

    #[test]
    fn test_bigint_comparison() {
        let ten = BigInt::from(10);
        assert_eq!(bigint_cmp_f64(&ten, 10.0), Some(Ordering::Equal));
        assert_eq!(bigint_cmp_f64(&ten, 10.5), Some(Ordering::Less));
        assert_eq!(bigint_cmp_f64(&ten, 9.5), Some(Ordering::Greater));
        assert_eq!(bigint_cmp_f64(&ten, f64::NAN), None);
    }

    #[test]
    fn test_uint8_wraps() {
        assert_eq!(to_uint8(&Value::Number(256.0)), 0);
        assert_eq!(to_uint8(&Value::Number(-1.0)), 255);
        assert_eq!(to_uint8(&Value::Number(300.7)), 44);
    }
}
