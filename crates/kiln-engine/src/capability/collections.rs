//! `Map` and `Set` keyed by SameValueZero identity, in insertion order

use super::{arg, constructor, method};
use crate::context::Context;
use crate::conv;
use crate::value::{MapKey, ObjectKind, ObjectRef, ScriptResult, Value};
use indexmap::IndexMap;

const ENTRY_BYTES: usize = 48;

pub(super) fn install(ctx: &mut Context) {
    install_map(ctx);
    install_set(ctx);
}

fn this_map(ctx: &mut Context, this: &Value, method: &str) -> ScriptResult<ObjectRef> {
    if let Value::Object(o) = this {
        if matches!(o.borrow().kind, ObjectKind::Map(_)) {
            return Ok(o.clone());
        }
    }
    Err(ctx.type_error(format!("Map.prototype.{} called on incompatible receiver", method)))
}

fn this_set(ctx: &mut Context, this: &Value, method: &str) -> ScriptResult<ObjectRef> {
    if let Value::Object(o) = this {
        if matches!(o.borrow().kind, ObjectKind::Set(_)) {
            return Ok(o.clone());
        }
    }
    Err(ctx.type_error(format!("Set.prototype.{} called on incompatible receiver", method)))
}

fn with_map<T>(map: &ObjectRef, f: impl FnOnce(&mut IndexMap<MapKey, (Value, Value)>) -> T) -> Option<T> {
    match &mut map.borrow_mut().kind {
        ObjectKind::Map(entries) => Some(f(entries)),
        _ => None,
    }
}

fn with_set<T>(set: &ObjectRef, f: impl FnOnce(&mut IndexMap<MapKey, Value>) -> T) -> Option<T> {
    match &mut set.borrow_mut().kind {
        ObjectKind::Set(entries) => Some(f(entries)),
        _ => None,
    }
}

/// Insert into a map, charging the heap for new keys
fn map_insert(ctx: &mut Context, map: &ObjectRef, key: Value, value: Value) {
    let added = with_map(map, |entries| {
        let identity = MapKey::of(&key);
        match entries.get_mut(&identity) {
            Some(slot) => {
                slot.1 = value;
                false
            }
            None => {
                entries.insert(identity, (key, value));
                true
            }
        }
    });
    if added == Some(true) {
        ctx.heap.charge(ENTRY_BYTES);
    }
}

fn set_insert(ctx: &mut Context, set: &ObjectRef, value: Value) {
    let added = with_set(set, |entries| {
        let identity = MapKey::of(&value);
        if entries.contains_key(&identity) {
            false
        } else {
            entries.insert(identity, value);
            true
        }
    });
    if added == Some(true) {
        ctx.heap.charge(ENTRY_BYTES);
    }
}

// ────────────────────────────────────────────────────────────────────────
// Map
// ────────────────────────────────────────────────────────────────────────

fn install_map(ctx: &mut Context) {
    let proto = ctx.intrinsics.map_proto.clone();
    constructor(ctx, "Map", &proto, |ctx, _, args| {
        let proto = ctx.intrinsics.map_proto.clone();
        let map = ctx.alloc(ObjectKind::Map(IndexMap::new()), Some(proto));
        match arg(args, 0) {
            Value::Undefined | Value::Null => {}
            init => {
                let Some(pairs) = ctx.array_items(&init) else {
                    return Err(ctx.type_error("Map initializer must be an array of entries"));
                };
                for pair in pairs {
                    let Some(pair) = ctx.array_items(&pair) else {
                        return Err(ctx.type_error(format!(
                            "Iterator value {} is not an entry object",
                            conv::to_string(&pair)
                        )));
                    };
                    let key = pair.first().cloned().unwrap_or_default();
                    let value = pair.get(1).cloned().unwrap_or_default();
                    map_insert(ctx, &map, key, value);
                }
            }
        }
        Ok(Value::Object(map))
    });

    method(ctx, &proto, "get", |ctx, this, args| {
        let map = this_map(ctx, this, "get")?;
        let key = MapKey::of(&arg(args, 0));
        Ok(with_map(&map, |entries| entries.get(&key).map(|(_, v)| v.clone()))
            .flatten()
            .unwrap_or_default())
    });
    method(ctx, &proto, "set", |ctx, this, args| {
        let map = this_map(ctx, this, "set")?;
        map_insert(ctx, &map, arg(args, 0), arg(args, 1));
        Ok(this.clone())
    });
    method(ctx, &proto, "has", |ctx, this, args| {
        let map = this_map(ctx, this, "has")?;
        let key = MapKey::of(&arg(args, 0));
        Ok(Value::Bool(with_map(&map, |entries| entries.contains_key(&key)).unwrap_or(false)))
    });
    method(ctx, &proto, "delete", |ctx, this, args| {
        let map = this_map(ctx, this, "delete")?;
        let key = MapKey::of(&arg(args, 0));
        let removed = with_map(&map, |entries| entries.shift_remove(&key).is_some());
        Ok(Value::Bool(removed.unwrap_or(false)))
    });
    method(ctx, &proto, "clear", |ctx, this, _| {
        let map = this_map(ctx, this, "clear")?;
        with_map(&map, |entries| entries.clear());
        Ok(Value::Undefined)
    });
    method(ctx, &proto, "keys", |ctx, this, _| {
        let map = this_map(ctx, this, "keys")?;
        let keys = with_map(&map, |entries| entries.values().map(|(k, _)| k.clone()).collect());
        Ok(Value::Object(ctx.new_array(keys.unwrap_or_default())))
    });
    method(ctx, &proto, "values", |ctx, this, _| {
        let map = this_map(ctx, this, "values")?;
        let values = with_map(&map, |entries| entries.values().map(|(_, v)| v.clone()).collect());
        Ok(Value::Object(ctx.new_array(values.unwrap_or_default())))
    });
    method(ctx, &proto, "entries", |ctx, this, _| {
        let map = this_map(ctx, this, "entries")?;
        let pairs: Vec<(Value, Value)> = with_map(&map, |entries| entries.values().cloned().collect())
            .unwrap_or_default();
        let mut out = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            out.push(Value::Object(ctx.new_array(vec![key, value])));
        }
        Ok(Value::Object(ctx.new_array(out)))
    });
    method(ctx, &proto, "forEach", |ctx, this, args| {
        let map = this_map(ctx, this, "forEach")?;
        let callback = arg(args, 0);
        let pairs: Vec<(Value, Value)> = with_map(&map, |entries| entries.values().cloned().collect())
            .unwrap_or_default();
        for (key, value) in pairs {
            ctx.call(&callback, &Value::Undefined, &[value, key, this.clone()])?;
        }
        Ok(Value::Undefined)
    });
}

// ────────────────────────────────────────────────────────────────────────
// Set
// ────────────────────────────────────────────────────────────────────────

fn install_set(ctx: &mut Context) {
    let proto = ctx.intrinsics.set_proto.clone();
    constructor(ctx, "Set", &proto, |ctx, _, args| {
        let proto = ctx.intrinsics.set_proto.clone();
        let set = ctx.alloc(ObjectKind::Set(IndexMap::new()), Some(proto));
        match arg(args, 0) {
            Value::Undefined | Value::Null => {}
            init => {
                let Some(items) = ctx.array_items(&init) else {
                    return Err(ctx.type_error("Set initializer must be an array"));
                };
                for item in items {
                    set_insert(ctx, &set, item);
                }
            }
        }
        Ok(Value::Object(set))
    });

    method(ctx, &proto, "add", |ctx, this, args| {
        let set = this_set(ctx, this, "add")?;
        set_insert(ctx, &set, arg(args, 0));
        Ok(this.clone())
    });
    method(ctx, &proto, "has", |ctx, this, args| {
        let set = this_set(ctx, this, "has")?;
        let key = MapKey::of(&arg(args, 0));
        Ok(Value::Bool(with_set(&set, |entries| entries.contains_key(&key)).unwrap_or(false)))
    });
    method(ctx, &proto, "delete", |ctx, this, args| {
        let set = this_set(ctx, this, "delete")?;
        let key = MapKey::of(&arg(args, 0));
        let removed = with_set(&set, |entries| entries.shift_remove(&key).is_some());
        Ok(Value::Bool(removed.unwrap_or(false)))
    });
    method(ctx, &proto, "clear", |ctx, this, _| {
        let set = this_set(ctx, this, "clear")?;
        with_set(&set, |entries| entries.clear());
        Ok(Value::Undefined)
    });
    for name in ["values", "keys"] {
        method(ctx, &proto, name, move |ctx, this, _| {
            let set = this_set(ctx, this, name)?;
            let values = with_set(&set, |entries| entries.values().cloned().collect());
            Ok(Value::Object(ctx.new_array(values.unwrap_or_default())))
        });
    }
    method(ctx, &proto, "forEach", |ctx, this, args| {
        let set = this_set(ctx, this, "forEach")?;
        let callback = arg(args, 0);
        let values: Vec<Value> = with_set(&set, |entries| entries.values().cloned().collect())
            .unwrap_or_default();
        for value in values {
            ctx.call(&callback, &Value::Undefined, &[value.clone(), value, this.clone()])?;
        }
        Ok(Value::Undefined)
    });
}
