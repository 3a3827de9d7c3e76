//! `BigInt` conversion and `BigInt.prototype.toString`

use super::{arg, constructor, method};
use crate::context::Context;
use crate::conv;
use crate::value::{ScriptResult, Value};
use num_bigint::BigInt;
use num_traits::{FromPrimitive, Zero};
use std::rc::Rc;

pub(super) fn install(ctx: &mut Context) {
    let proto = ctx.intrinsics.bigint_proto.clone();
    constructor(ctx, "BigInt", &proto, |ctx, _, args| to_bigint(ctx, &arg(args, 0)));

    method(ctx, &proto, "toString", |ctx, this, args| {
        let value = this_bigint(ctx, this, "toString")?;
        let radix = match arg(args, 0) {
            Value::Undefined => 10.0,
            other => conv::to_integer(conv::to_number(&other)),
        };
        if !(2.0..=36.0).contains(&radix) {
            return Err(ctx.range_error("toString() radix must be between 2 and 36"));
        }
        Ok(Value::from(value.to_str_radix(radix as u32)))
    });
    method(ctx, &proto, "valueOf", |ctx, this, _| {
        Ok(Value::BigInt(this_bigint(ctx, this, "valueOf")?))
    });
}

fn this_bigint(ctx: &mut Context, this: &Value, method: &str) -> ScriptResult<Rc<BigInt>> {
    match this {
        Value::BigInt(b) => Ok(b.clone()),
        other => Err(ctx.type_error(format!(
            "BigInt.prototype.{} requires that 'this' be a BigInt, got {}",
            method,
            conv::type_of(other)
        ))),
    }
}

fn to_bigint(ctx: &mut Context, value: &Value) -> ScriptResult {
    match value {
        Value::BigInt(_) => Ok(value.clone()),
        Value::Bool(b) => Ok(Value::from(BigInt::from(u8::from(*b)))),
        Value::Number(n) => match BigInt::from_f64(*n).filter(|_| n.fract() == 0.0) {
            Some(b) => Ok(Value::from(b)),
            None => Err(ctx.range_error(format!(
                "The number {} cannot be converted to a BigInt because it is not an integer",
                conv::number_to_string(*n)
            ))),
        },
        Value::String(s) => match parse_bigint(s) {
            Some(b) => Ok(Value::from(b)),
            None => Err(ctx.syntax_error(format!("Cannot convert {} to a BigInt", s))),
        },
        other => Err(ctx.type_error(format!(
            "Cannot convert {} to a BigInt",
            conv::to_string(other)
        ))),
    }
}

/// Parse an integer literal with an optional sign or `0x`/`0o`/`0b` prefix
fn parse_bigint(text: &str) -> Option<BigInt> {
    let t = text.trim();
    if t.is_empty() {
        return Some(BigInt::zero());
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = t.strip_prefix(prefix) {
            return parse_digits(digits, radix);
        }
    }
    let (negative, digits) = match t.as_bytes()[0] {
        b'-' => (true, &t[1..]),
        b'+' => (false, &t[1..]),
        _ => (false, t),
    };
    let magnitude = parse_digits(digits, 10)?;
    Some(if negative { -magnitude } else { magnitude })
}

fn parse_digits(digits: &str, radix: u32) -> Option<BigInt> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    BigInt::parse_bytes(digits.as_bytes(), radix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bigint() {
        assert_eq!(parse_bigint("  42 ").unwrap(), BigInt::from(42));
        assert_eq!(parse_bigint("-17").unwrap(), BigInt::from(-17));
        assert_eq!(parse_bigint("0xff").unwrap(), BigInt::from(255));
        assert_eq!(parse_bigint("").unwrap(), BigInt::zero());
        assert_eq!(
            parse_bigint("123456789012345678901234567890").unwrap().to_string(),
            "123456789012345678901234567890"
        );
    }

    #[test]
    fn test_parse_bigint_rejects() {
        assert!(parse_bigint("1.5").is_none());
        assert!(parse_bigint("-0x1").is_none());
        assert!(parse_bigint("12n").is_none());
        assert!(parse_bigint("+").is_none());
    }
}
