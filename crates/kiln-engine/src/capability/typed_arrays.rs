//! `ArrayBuffer` and `Uint8Array`

use super::{arg, constructor, method};
use crate::context::Context;
use crate::conv;
use crate::value::{ByteStore, ByteView, ObjectKind, ObjectRef, ScriptResult, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// Largest buffer a script may request
const MAX_BYTE_LENGTH: f64 = (1u64 << 31) as f64;

pub(super) fn install(ctx: &mut Context) {
    let buffer_proto = ctx.intrinsics.array_buffer_proto.clone();
    constructor(ctx, "ArrayBuffer", &buffer_proto, |ctx, _, args| {
        let len = byte_length(ctx, &arg(args, 0), "Invalid array buffer length")?;
        let (buffer, _) = new_buffer(ctx, vec![0; len]);
        Ok(Value::Object(buffer))
    });

    let proto = ctx.intrinsics.uint8_array_proto.clone();
    constructor(ctx, "Uint8Array", &proto, |ctx, _, args| {
        let first = arg(args, 0);
        if let Some((buffer, store)) = buffer_parts(&first) {
            let total = store.borrow().len();
            let offset = match arg(args, 1) {
                Value::Undefined => 0,
                other => byte_length(ctx, &other, "Start offset is outside the bounds of the buffer")?,
            };
            if offset > total {
                return Err(ctx.range_error(format!("Start offset {} is outside the bounds of the buffer", offset)));
            }
            let len = match arg(args, 2) {
                Value::Undefined => total - offset,
                other => byte_length(ctx, &other, "Invalid typed array length")?,
            };
            if offset + len > total {
                return Err(ctx.range_error(format!("Invalid typed array length: {}", len)));
            }
            return Ok(Value::Object(new_view(ctx, &buffer, store, offset, len)));
        }

        let bytes = match &first {
            Value::Undefined => Vec::new(),
            Value::Object(o) => match &o.borrow().kind {
                ObjectKind::Uint8Array(view) => view.to_vec(),
                ObjectKind::Array(items) => items.iter().map(conv::to_uint8).collect(),
                _ => Vec::new(),
            },
            other => {
                let len = byte_length(ctx, other, "Invalid typed array length")?;
                vec![0; len]
            }
        };
        let len = bytes.len();
        let (buffer, store) = new_buffer(ctx, bytes);
        Ok(Value::Object(new_view(ctx, &buffer, store, 0, len)))
    });

    method(ctx, &proto, "fill", |ctx, this, args| {
        let view = this_view(ctx, this, "fill")?;
        let byte = conv::to_uint8(&arg(args, 0));
        let start = conv::relative_index(&arg(args, 1), view.len, 0);
        let end = conv::relative_index(&arg(args, 2), view.len, view.len);
        for i in start..end {
            view.set(i, byte);
        }
        Ok(this.clone())
    });
    method(ctx, &proto, "subarray", |ctx, this, args| {
        let view = this_view(ctx, this, "subarray")?;
        let begin = conv::relative_index(&arg(args, 0), view.len, 0);
        let end = conv::relative_index(&arg(args, 1), view.len, view.len).max(begin);
        let buffer = match this {
            Value::Object(o) => o.get_own("buffer"),
            _ => None,
        };
        let Some(Value::Object(buffer)) = buffer else {
            return Err(ctx.type_error("Uint8Array has no buffer"));
        };
        let child = new_view(ctx, &buffer, view.buffer.clone(), view.offset + begin, end - begin);
        Ok(Value::Object(child))
    });
    method(ctx, &proto, "toString", |ctx, this, _| {
        this_view(ctx, this, "toString")?;
        Ok(Value::from(conv::to_string(this)))
    });
}

fn byte_length(ctx: &mut Context, value: &Value, message: &str) -> ScriptResult<usize> {
    let n = conv::to_number(value);
    let n = if n.is_nan() { 0.0 } else { n };
    if n < 0.0 || n.fract() != 0.0 || n > MAX_BYTE_LENGTH {
        return Err(ctx.range_error(message));
    }
    Ok(n as usize)
}

fn new_buffer(ctx: &mut Context, bytes: Vec<u8>) -> (ObjectRef, ByteStore) {
    let store: ByteStore = Rc::new(RefCell::new(bytes));
    let proto = ctx.intrinsics.array_buffer_proto.clone();
    let buffer = ctx.alloc(ObjectKind::ArrayBuffer(store.clone()), Some(proto));
    (buffer, store)
}

fn new_view(ctx: &mut Context, buffer: &ObjectRef, store: ByteStore, offset: usize, len: usize) -> ObjectRef {
    let proto = ctx.intrinsics.uint8_array_proto.clone();
    let view = ctx.alloc(
        ObjectKind::Uint8Array(ByteView {
            buffer: store,
            offset,
            len,
        }),
        Some(proto),
    );
    view.set_own("buffer", Value::Object(buffer.clone()));
    view
}

fn buffer_parts(value: &Value) -> Option<(ObjectRef, ByteStore)> {
    let Value::Object(o) = value else { return None };
    let store = match &o.borrow().kind {
        ObjectKind::ArrayBuffer(store) => store.clone(),
        _ => return None,
    };
    Some((o.clone(), store))
}

fn this_view(ctx: &mut Context, this: &Value, method: &str) -> ScriptResult<ByteView> {
    if let Value::Object(o) = this {
        if let ObjectKind::Uint8Array(view) = &o.borrow().kind {
            return Ok(view.clone());
        }
    }
    Err(ctx.type_error(format!("Uint8Array.prototype.{} called on incompatible receiver", method)))
}
