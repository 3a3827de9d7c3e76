//! Worker contexts and message passing
//!
//! A worker is a separate context created through the runtime's worker
//! factory and owned by the context that spawned it. Nothing is shared
//! between the two realms: messages are structured clones sent over
//! crossbeam channels and rebuilt on the receiving side. Workers are pumped
//! by the owner's job loop on the same thread.

use crate::context::Context;
use crate::jobs::{DrainReport, Job, JobLoop};
use crate::error::EngineError;
use crate::value::{ByteView, ObjectKind, ObjectRef, ScriptResult, Value};
use crossbeam::channel::{unbounded, Receiver, Sender};
use num_bigint::BigInt;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// A value copied across a realm boundary
#[derive(Debug, Clone, PartialEq)]
pub enum ClonedValue {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Bool(bool),
    /// Number
    Number(f64),
    /// BigInt
    BigInt(BigInt),
    /// String
    String(String),
    /// Array elements
    Array(Vec<ClonedValue>),
    /// Own properties of a plain object
    Object(Vec<(String, ClonedValue)>),
    /// Contents of an `ArrayBuffer`
    Buffer(Vec<u8>),
    /// Contents of a `Uint8Array`
    Bytes(Vec<u8>),
    /// Date time value
    Date(f64),
    /// Error name and message
    Error {
        /// Error name
        name: String,
        /// Error message
        message: String,
    },
}

impl ClonedValue {
    /// Copy `value` out of `ctx`.
    ///
    /// Functions, promises, proxies and cyclic graphs are not cloneable and
    /// throw `DataCloneError`.
    pub fn from_value(ctx: &mut Context, value: &Value) -> ScriptResult<ClonedValue> {
        let mut seen = Vec::new();
        clone_value(ctx, value, &mut seen)
    }

    /// Rebuild the value inside `ctx`
    pub fn into_value(self, ctx: &mut Context) -> Value {
        match self {
            ClonedValue::Undefined => Value::Undefined,
            ClonedValue::Null => Value::Null,
            ClonedValue::Bool(b) => Value::Bool(b),
            ClonedValue::Number(n) => Value::Number(n),
            ClonedValue::BigInt(b) => Value::from(b),
            ClonedValue::String(s) => Value::from(s),
            ClonedValue::Array(items) => {
                let items = items.into_iter().map(|item| item.into_value(ctx)).collect();
                Value::Object(ctx.new_array(items))
            }
            ClonedValue::Object(entries) => {
                let object = ctx.new_object();
                for (key, item) in entries {
                    let item = item.into_value(ctx);
                    object.set_own(key, item);
                }
                Value::Object(object)
            }
            ClonedValue::Buffer(bytes) => {
                let proto = ctx.intrinsics.array_buffer_proto.clone();
                let store = Rc::new(RefCell::new(bytes));
                Value::Object(ctx.alloc(ObjectKind::ArrayBuffer(store), Some(proto)))
            }
            ClonedValue::Bytes(bytes) => {
                let len = bytes.len();
                let proto = ctx.intrinsics.uint8_array_proto.clone();
                let view = ByteView {
                    buffer: Rc::new(RefCell::new(bytes)),
                    offset: 0,
                    len,
                };
                Value::Object(ctx.alloc(ObjectKind::Uint8Array(view), Some(proto)))
            }
            ClonedValue::Date(t) => {
                let proto = ctx.intrinsics.date_proto.clone();
                Value::Object(ctx.alloc(ObjectKind::Date(t), Some(proto)))
            }
            ClonedValue::Error { name, message } => {
                let error = ctx.make_error(&name, &message);
                if let Value::Object(o) = &error {
                    if o.get_own("name").is_none() && name != "Error" {
                        o.set_own("name", Value::from(name));
                    }
                }
                error
            }
        }
    }
}

fn clone_value(ctx: &mut Context, value: &Value, seen: &mut Vec<usize>) -> ScriptResult<ClonedValue> {
    let object = match value {
        Value::Undefined => return Ok(ClonedValue::Undefined),
        Value::Null => return Ok(ClonedValue::Null),
        Value::Bool(b) => return Ok(ClonedValue::Bool(*b)),
        Value::Number(n) => return Ok(ClonedValue::Number(*n)),
        Value::BigInt(b) => return Ok(ClonedValue::BigInt((**b).clone())),
        Value::String(s) => return Ok(ClonedValue::String(s.to_string())),
        Value::Object(o) => o,
    };

    if seen.contains(&object.addr()) {
        return Err(ctx.make_error("DataCloneError", "cyclic object value cannot be cloned"));
    }
    if seen.len() >= crate::conv::MAX_NESTING_DEPTH {
        return Err(ctx.range_error("Maximum call stack size exceeded"));
    }

    enum Shape {
        Array(Vec<Value>),
        Plain(Vec<(String, Value)>),
        Done(ClonedValue),
        Error,
        Refused(&'static str),
    }

    let shape = {
        let borrowed = object.borrow();
        match &borrowed.kind {
            ObjectKind::Array(items) => Shape::Array(items.clone()),
            ObjectKind::Ordinary => Shape::Plain(
                borrowed
                    .props
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            ObjectKind::ArrayBuffer(bytes) => Shape::Done(ClonedValue::Buffer(bytes.borrow().clone())),
            ObjectKind::Uint8Array(view) => Shape::Done(ClonedValue::Bytes(view.to_vec())),
            ObjectKind::Date(t) => Shape::Done(ClonedValue::Date(*t)),
            ObjectKind::Error => Shape::Error,
            kind => Shape::Refused(kind.name()),
        }
    };

    match shape {
        Shape::Done(cloned) => Ok(cloned),
        Shape::Refused(kind) => Err(ctx.make_error(
            "DataCloneError",
            &format!("{} object could not be cloned", kind),
        )),
        Shape::Error => {
            let failure = ctx.failure_of(value);
            Ok(ClonedValue::Error {
                name: failure.name,
                message: failure.message,
            })
        }
        Shape::Array(items) => {
            seen.push(object.addr());
            let mut out = Vec::with_capacity(items.len());
            for item in &items {
                out.push(clone_value(ctx, item, seen)?);
            }
            seen.pop();
            Ok(ClonedValue::Array(out))
        }
        Shape::Plain(entries) => {
            seen.push(object.addr());
            let mut out = Vec::with_capacity(entries.len());
            for (key, item) in &entries {
                if item.is_callable() {
                    return Err(ctx.make_error(
                        "DataCloneError",
                        &format!("function in property '{}' could not be cloned", key),
                    ));
                }
                out.push((key.clone(), clone_value(ctx, item, seen)?));
            }
            seen.pop();
            Ok(ClonedValue::Object(out))
        }
    }
}

/// A worker owned by the spawning context
pub(crate) struct WorkerSlot {
    context: Context,
    from_worker: Receiver<ClonedValue>,
    handle: ObjectRef,
}

/// The worker side of the channel pair
pub(crate) struct ParentPort {
    inbound: Receiver<ClonedValue>,
    port: ObjectRef,
}

fn post_message_fn(ctx: &mut Context, target: Sender<ClonedValue>) -> ObjectRef {
    ctx.new_function("postMessage", move |ctx, _this, args| {
        let message = ClonedValue::from_value(ctx, args.first().unwrap_or(&Value::Undefined))?;
        // The other side may already be gone; the message is dropped then
        let _ = target.send(message);
        Ok(Value::Undefined)
    })
}

fn attach_parent_port(child: &mut Context, inbound: Receiver<ClonedValue>, outbound: Sender<ClonedValue>) {
    let port = child.new_object();
    let post = post_message_fn(child, outbound);
    port.set_own("postMessage", Value::Object(post));
    port.set_own("onmessage", Value::Null);
    child.set_global("parent", Value::Object(port.clone()));
    child.parent_port = Some(ParentPort { inbound, port });
}

/// Queue a job that calls `target.onmessage({ data })`
fn enqueue_message(ctx: &mut Context, target: ObjectRef, message: ClonedValue) {
    ctx.enqueue_job(Job::new("message", move |ctx| {
        let receiver = Value::Object(target);
        let handler = ctx.get_property(&receiver, "onmessage")?;
        if !handler.is_callable() {
            return Ok(());
        }
        let data = message.into_value(ctx);
        let event = ctx.new_object();
        event.set_own("data", data);
        ctx.call(&handler, &receiver, &[Value::Object(event)])?;
        Ok(())
    }));
}

/// Spawn a worker running module `specifier` and return its handle object.
///
/// The specifier is resolved relative to the unit that is currently
/// running in `ctx`.
pub fn spawn_worker(ctx: &mut Context, specifier: &str) -> ScriptResult<ObjectRef> {
    let Some(factory) = ctx.runtime().worker_context_factory() else {
        return Err(ctx.type_error("workers are not available: no worker context factory is registered"));
    };
    let mut child = match factory(ctx.runtime()) {
        Ok(child) => child,
        Err(err) => {
            return Err(ctx.internal_error(format!("could not create worker context: {}", err)));
        }
    };

    let (to_worker, worker_inbound) = unbounded();
    let (to_parent, from_worker) = unbounded();
    attach_parent_port(&mut child, worker_inbound, to_parent);

    let referrer = ctx.current_unit().map(|u| u.to_string()).unwrap_or_default();
    if let Err(err) = child.import_module(specifier, &referrer) {
        let (kind, message) = match &err {
            EngineError::ModuleResolution { .. } => ("ModuleResolutionError", err.to_string()),
            EngineError::UncaughtScriptFailure(failure) => ("Error", format!("worker failed: {}", failure)),
            other => ("InternalError", other.to_string()),
        };
        return Err(ctx.make_error(kind, &message));
    }

    let handle = ctx.new_object();
    let post = post_message_fn(ctx, to_worker);
    handle.set_own("postMessage", Value::Object(post));
    handle.set_own("onmessage", Value::Null);

    debug!(
        context = ctx.id().as_u64(),
        worker = child.id().as_u64(),
        module = specifier,
        "worker spawned"
    );
    ctx.workers.push(WorkerSlot {
        context: child,
        from_worker,
        handle: handle.clone(),
    });
    Ok(handle)
}

/// Move messages from the parent into this worker context's job queue
pub(crate) fn deliver_from_parent(ctx: &mut Context) -> usize {
    let Some(port) = &ctx.parent_port else {
        return 0;
    };
    let messages: Vec<ClonedValue> = port.inbound.try_iter().collect();
    let target = port.port.clone();
    let count = messages.len();
    for message in messages {
        enqueue_message(ctx, target.clone(), message);
    }
    count
}

/// Drain every worker and queue the messages they sent back.
///
/// Returns the number of messages delivered to `ctx`.
pub(crate) fn pump_workers(ctx: &mut Context, report: &mut DrainReport) -> usize {
    if ctx.workers.is_empty() {
        return 0;
    }
    let mut workers = std::mem::take(&mut ctx.workers);
    let mut delivered = 0;
    for slot in &mut workers {
        report.absorb(JobLoop::drain(&mut slot.context));
        let messages: Vec<ClonedValue> = slot.from_worker.try_iter().collect();
        for message in messages {
            enqueue_message(ctx, slot.handle.clone(), message);
            delivered += 1;
        }
    }
    workers.append(&mut ctx.workers);
    ctx.workers = workers;
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Runtime, RuntimeOptions};

    fn context() -> Context {
        let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
        Context::new_raw(&runtime).unwrap()
    }

    #[test]
    fn test_clone_plain_data() {
        let mut ctx = context();
        let inner = ctx.new_array(vec![Value::from(1), Value::from("two")]);
        let object = ctx.new_object();
        object.set_own("list", Value::Object(inner));
        object.set_own("flag", Value::Bool(true));

        let cloned = ClonedValue::from_value(&mut ctx, &Value::Object(object.clone())).unwrap();
        assert_eq!(
            cloned,
            ClonedValue::Object(vec![
                (
                    "list".to_string(),
                    ClonedValue::Array(vec![
                        ClonedValue::Number(1.0),
                        ClonedValue::String("two".to_string())
                    ])
                ),
                ("flag".to_string(), ClonedValue::Bool(true)),
            ])
        );

        let rebuilt = cloned.into_value(&mut ctx);
        let rebuilt = rebuilt.as_object().unwrap();
        assert!(!rebuilt.ptr_eq(&object));
        assert_eq!(crate::conv::to_string(&rebuilt.get_own("list").unwrap()), "1,two");
    }

    #[test]
    fn test_functions_and_cycles_are_refused() {
        let mut ctx = context();
        let f = ctx.new_function("f", |_, _, _| Ok(Value::Undefined));
        let thrown = ClonedValue::from_value(&mut ctx, &Value::Object(f)).unwrap_err();
        assert_eq!(ctx.failure_of(&thrown).name, "DataCloneError");

        let a = ctx.new_object();
        a.set_own("self", Value::Object(a.clone()));
        let thrown = ClonedValue::from_value(&mut ctx, &Value::Object(a)).unwrap_err();
        assert_eq!(ctx.failure_of(&thrown).name, "DataCloneError");
    }

    #[test]
    fn test_deep_nesting_is_range_error() {
        let mut ctx = context();
        let mut deep = Value::Null;
        for _ in 0..2_000 {
            let object = ctx.new_object();
            object.set_own("next", deep);
            deep = Value::Object(object);
        }
        let thrown = ClonedValue::from_value(&mut ctx, &deep).unwrap_err();
        assert_eq!(ctx.failure_of(&thrown).name, "RangeError");

        let inner = ctx.new_array(Vec::new());
        let shallow = ctx.new_array(vec![Value::Object(inner)]);
        assert!(ClonedValue::from_value(&mut ctx, &Value::Object(shallow)).is_ok());
    }

    #[test]
    fn test_errors_clone_by_name_and_message() {
        let mut ctx = context();
        let error = ctx.make_error("RangeError", "too far");
        let cloned = ClonedValue::from_value(&mut ctx, &error).unwrap();
        assert_eq!(
            cloned,
            ClonedValue::Error {
                name: "RangeError".to_string(),
                message: "too far".to_string()
            }
        );
        let rebuilt = cloned.into_value(&mut ctx);
        assert_eq!(ctx.failure_of(&rebuilt).to_string(), "RangeError: too far");
    }

    #[test]
    fn test_spawn_without_factory_is_type_error() {
        let mut ctx = context();
        let thrown = spawn_worker(&mut ctx, "worker.js").unwrap_err();
        assert_eq!(ctx.failure_of(&thrown).name, "TypeError");
    }
}
