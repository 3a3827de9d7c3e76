//! `Proxy` and `Reflect`
//!
//! Proxies honour the `get`, `set` and `has` traps. Calling a proxy calls
//! its target.

use super::{arg, method};
use crate::context::Context;
use crate::conv;
use crate::value::{ObjectKind, ObjectRef, ScriptResult, Value};

pub(super) fn install(ctx: &mut Context) {
    let proxy = ctx.new_function("Proxy", |ctx, _, args| {
        let target = object_arg(ctx, &arg(args, 0), "Cannot create proxy with a non-object as target")?;
        let handler = object_arg(ctx, &arg(args, 1), "Cannot create proxy with a non-object as handler")?;
        let proto = target.borrow().proto.clone();
        Ok(Value::Object(ctx.alloc(ObjectKind::Proxy { target, handler }, proto)))
    });
    ctx.set_global("Proxy", Value::Object(proxy));

    let reflect = ctx.new_object();
    method(ctx, &reflect, "get", |ctx, _, args| {
        let target = arg(args, 0);
        let object = object_arg(ctx, &target, "Reflect.get called on non-object")?;
        let key = conv::to_string(&arg(args, 1));
        let receiver = match args.get(2) {
            Some(receiver) => receiver.clone(),
            None => target,
        };
        ctx.get_object_property(&object, &key, &receiver)
    });
    method(ctx, &reflect, "set", |ctx, _, args| {
        let target = arg(args, 0);
        let object = object_arg(ctx, &target, "Reflect.set called on non-object")?;
        let key = conv::to_string(&arg(args, 1));
        ctx.set_object_property(&object, &key, arg(args, 2), &target)?;
        Ok(Value::Bool(true))
    });
    method(ctx, &reflect, "has", |ctx, _, args| {
        let object = object_arg(ctx, &arg(args, 0), "Reflect.has called on non-object")?;
        let key = conv::to_string(&arg(args, 1));
        Ok(Value::Bool(ctx.has_property(&object, &key)?))
    });
    method(ctx, &reflect, "ownKeys", |ctx, _, args| {
        let object = object_arg(ctx, &arg(args, 0), "Reflect.ownKeys called on non-object")?;
        let keys = ctx.own_keys(&object).into_iter().map(Value::from).collect();
        Ok(Value::Object(ctx.new_array(keys)))
    });
    method(ctx, &reflect, "apply", |ctx, _, args| {
        let list = match ctx.array_items(&arg(args, 2)) {
            Some(list) => list,
            None => return Err(ctx.type_error("CreateListFromArrayLike called on non-object")),
        };
        ctx.call(&arg(args, 0), &arg(args, 1), &list)
    });
    method(ctx, &reflect, "getPrototypeOf", |ctx, _, args| {
        let object = object_arg(ctx, &arg(args, 0), "Reflect.getPrototypeOf called on non-object")?;
        let proto = object.borrow().proto.clone();
        Ok(proto.map(Value::Object).unwrap_or(Value::Null))
    });
    ctx.set_global("Reflect", Value::Object(reflect));
}

fn object_arg(ctx: &mut Context, value: &Value, message: &str) -> ScriptResult<ObjectRef> {
    match value {
        Value::Object(o) => Ok(o.clone()),
        _ => Err(ctx.type_error(message)),
    }
}
