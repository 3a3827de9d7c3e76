//! `RegExp` backed by the `regex` crate
//!
//! Supported flags are `g`, `i`, `m` and `s`. Indices visible to scripts
//! (`index`, `lastIndex`) count Unicode scalar values, not bytes.

use super::{arg, constructor, method};
use crate::context::Context;
use crate::conv;
use crate::value::{ObjectKind, ObjectRef, RegExpData, ScriptResult, Value};
use regex::RegexBuilder;
use std::rc::Rc;

const FLAG_ORDER: &str = "gims";

pub(super) fn install(ctx: &mut Context) {
    let proto = ctx.intrinsics.regexp_proto.clone();
    constructor(ctx, "RegExp", &proto, |ctx, _, args| {
        let pattern = arg(args, 0);
        let source = match &pattern {
            Value::Object(o) => match &o.borrow().kind {
                ObjectKind::RegExp(re) => Some(re.source.clone()),
                _ => None,
            },
            _ => None,
        };
        let source = match (source, &pattern) {
            (Some(source), _) => source,
            (None, Value::Undefined) => "(?:)".to_string(),
            (None, other) => conv::to_string(other),
        };
        let flags = match arg(args, 1) {
            Value::Undefined => String::new(),
            other => conv::to_string(&other),
        };
        new_regexp(ctx, &source, &flags).map(Value::Object)
    });

    method(ctx, &proto, "exec", |ctx, this, args| {
        let input = conv::to_string(&arg(args, 0));
        exec(ctx, this, &input)
    });
    method(ctx, &proto, "test", |ctx, this, args| {
        let input = conv::to_string(&arg(args, 0));
        Ok(Value::Bool(!matches!(exec(ctx, this, &input)?, Value::Null)))
    });
    method(ctx, &proto, "toString", |ctx, this, _| {
        let data = this_regexp(ctx, this)?;
        Ok(Value::from(format!("/{}/{}", data.source, data.flags)))
    });
}

/// Canonical flag string, or `None` for unknown or repeated flags
fn canonical_flags(flags: &str) -> Option<String> {
    let mut seen = [false; 4];
    for c in flags.chars() {
        let slot = FLAG_ORDER.find(c)?;
        if seen[slot] {
            return None;
        }
        seen[slot] = true;
    }
    Some(
        FLAG_ORDER
            .chars()
            .zip(seen)
            .filter_map(|(c, on)| on.then_some(c))
            .collect(),
    )
}

fn new_regexp(ctx: &mut Context, source: &str, flags: &str) -> ScriptResult<ObjectRef> {
    let Some(flags) = canonical_flags(flags) else {
        return Err(ctx.syntax_error(format!("Invalid regular expression flags '{}'", flags)));
    };
    let regex = RegexBuilder::new(source)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .build()
        .map_err(|err| {
            ctx.syntax_error(format!("Invalid regular expression: /{}/: {}", source, err))
        })?;

    let data = RegExpData {
        regex,
        source: source.to_string(),
        flags,
    };
    let proto = ctx.intrinsics.regexp_proto.clone();
    let object = ctx.alloc(ObjectKind::RegExp(Rc::new(data)), Some(proto));
    object.set_own("lastIndex", Value::Number(0.0));
    Ok(object)
}

fn this_regexp(ctx: &mut Context, this: &Value) -> ScriptResult<Rc<RegExpData>> {
    if let Value::Object(o) = this {
        if let ObjectKind::RegExp(re) = &o.borrow().kind {
            return Ok(re.clone());
        }
    }
    Err(ctx.type_error(format!("{} is not a RegExp", conv::to_string(this))))
}

fn byte_offset(s: &str, chars: usize) -> Option<usize> {
    if chars == 0 {
        return Some(0);
    }
    s.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(s.len()))
        .nth(chars)
}

fn char_index(s: &str, byte: usize) -> usize {
    s[..byte].chars().count()
}

fn exec(ctx: &mut Context, this: &Value, input: &str) -> ScriptResult {
    let data = this_regexp(ctx, this)?;
    let global = data.has_flag('g');

    let start = if global {
        let last = conv::to_integer(conv::to_number(&ctx.get_property(this, "lastIndex")?));
        match byte_offset(input, last.max(0.0) as usize) {
            Some(start) => start,
            None => {
                ctx.set_property(this, "lastIndex", Value::Number(0.0))?;
                return Ok(Value::Null);
            }
        }
    } else {
        0
    };

    let Some(captures) = data.regex.captures_at(input, start) else {
        if global {
            ctx.set_property(this, "lastIndex", Value::Number(0.0))?;
        }
        return Ok(Value::Null);
    };

    let whole = captures.get(0).map(|m| (m.start(), m.end())).unwrap_or((start, start));
    let groups: Vec<Value> = captures
        .iter()
        .map(|group| group.map(|m| Value::from(m.as_str())).unwrap_or_default())
        .collect();
    if global {
        let end = char_index(input, whole.1);
        ctx.set_property(this, "lastIndex", Value::from(end))?;
    }

    let result = ctx.new_array(groups);
    result.set_own("index", Value::from(char_index(input, whole.0)));
    result.set_own("input", Value::from(input));
    Ok(Value::Object(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_flags() {
        assert_eq!(canonical_flags("").unwrap(), "");
        assert_eq!(canonical_flags("sig").unwrap(), "gis");
        assert!(canonical_flags("gg").is_none());
        assert!(canonical_flags("y").is_none());
    }

    #[test]
    fn test_offsets_count_scalars() {
        let s = "añb";
        assert_eq!(byte_offset(s, 0), Some(0));
        assert_eq!(byte_offset(s, 2), Some(3));
        assert_eq!(byte_offset(s, 3), Some(4));
        assert_eq!(byte_offset(s, 4), None);
        assert_eq!(char_index(s, 3), 2);
    }
}
