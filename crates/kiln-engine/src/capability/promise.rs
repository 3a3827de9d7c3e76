//! Promises and `queueMicrotask`
//!
//! Every reaction runs as a job on the context's queue, so handlers never
//! run synchronously inside `then` or inside the resolving call.

use super::{arg, constructor, method};
use crate::context::Context;
use crate::jobs::Job;
use crate::value::{ObjectKind, ObjectRef, ScriptResult, Value};
use std::cell::Cell;
use std::rc::Rc;

/// Settlement state of a promise
#[derive(Clone)]
pub(crate) enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

/// Handlers registered by `then`, plus the promise they settle
struct Reaction {
    on_fulfilled: Value,
    on_rejected: Value,
    derived: ObjectRef,
}

/// Internal slots of a promise object
pub struct PromiseData {
    state: PromiseState,
    reactions: Vec<Reaction>,
    handled: bool,
}

impl PromiseData {
    fn new() -> Self {
        Self {
            state: PromiseState::Pending,
            reactions: Vec::new(),
            handled: false,
        }
    }

    /// Whether the promise has settled
    pub fn is_settled(&self) -> bool {
        !matches!(self.state, PromiseState::Pending)
    }
}

pub(super) fn install(ctx: &mut Context) {
    let proto = ctx.intrinsics.promise_proto.clone();
    let promise = constructor(ctx, "Promise", &proto, |ctx, _, args| {
        let executor = arg(args, 0);
        if !executor.is_callable() {
            return Err(ctx.type_error("Promise resolver is not a function"));
        }
        let promise = new_promise(ctx);
        let (resolve_fn, reject_fn) = resolving_functions(ctx, &promise);
        if let Err(thrown) = ctx.call(&executor, &Value::Undefined, &[resolve_fn, reject_fn.clone()]) {
            ctx.call(&reject_fn, &Value::Undefined, &[thrown])?;
        }
        Ok(Value::Object(promise))
    });

    method(ctx, &promise, "resolve", |ctx, _, args| {
        let value = arg(args, 0);
        if let Value::Object(o) = &value {
            if matches!(o.borrow().kind, ObjectKind::Promise(_)) {
                return Ok(value);
            }
        }
        let promise = new_promise(ctx);
        resolve(ctx, &promise, value);
        Ok(Value::Object(promise))
    });
    method(ctx, &promise, "reject", |ctx, _, args| {
        let promise = new_promise(ctx);
        reject(ctx, &promise, arg(args, 0));
        Ok(Value::Object(promise))
    });

    method(ctx, &proto, "then", |ctx, this, args| {
        let promise = this_promise(ctx, this, "then")?;
        Ok(Value::Object(then(ctx, &promise, arg(args, 0), arg(args, 1))))
    });
    method(ctx, &proto, "catch", |ctx, this, args| {
        let promise = this_promise(ctx, this, "catch")?;
        Ok(Value::Object(then(ctx, &promise, Value::Undefined, arg(args, 0))))
    });
    method(ctx, &proto, "finally", |ctx, this, args| {
        let promise = this_promise(ctx, this, "finally")?;
        let callback = arg(args, 0);
        if !callback.is_callable() {
            return Ok(Value::Object(then(ctx, &promise, callback.clone(), callback)));
        }
        let on_settled = callback.clone();
        let on_fulfilled = ctx.new_function("", move |ctx, _, args| {
            ctx.call(&on_settled, &Value::Undefined, &[])?;
            Ok(arg(args, 0))
        });
        let on_rejected = ctx.new_function("", move |ctx, _, args| {
            ctx.call(&callback, &Value::Undefined, &[])?;
            Err(arg(args, 0))
        });
        Ok(Value::Object(then(
            ctx,
            &promise,
            Value::Object(on_fulfilled),
            Value::Object(on_rejected),
        )))
    });

    let global = ctx.global();
    method(ctx, &global, "queueMicrotask", |ctx, _, args| {
        let callback = arg(args, 0);
        if !callback.is_callable() {
            return Err(ctx.type_error("queueMicrotask requires a function"));
        }
        ctx.enqueue_job(Job::new("microtask", move |ctx| {
            ctx.call(&callback, &Value::Undefined, &[]).map(|_| ())
        }));
        Ok(Value::Undefined)
    });
}

fn this_promise(ctx: &mut Context, this: &Value, method: &str) -> ScriptResult<ObjectRef> {
    if let Value::Object(o) = this {
        if matches!(o.borrow().kind, ObjectKind::Promise(_)) {
            return Ok(o.clone());
        }
    }
    Err(ctx.type_error(format!(
        "Method Promise.prototype.{} called on incompatible receiver",
        method
    )))
}

fn with_data<T>(promise: &ObjectRef, f: impl FnOnce(&mut PromiseData) -> T) -> Option<T> {
    match &mut promise.borrow_mut().kind {
        ObjectKind::Promise(data) => Some(f(data)),
        _ => None,
    }
}

/// A fresh pending promise
pub(crate) fn new_promise(ctx: &mut Context) -> ObjectRef {
    let proto = ctx.intrinsics.promise_proto.clone();
    ctx.alloc(ObjectKind::Promise(PromiseData::new()), Some(proto))
}

/// `resolve` and `reject` functions sharing one already-resolved flag
pub(crate) fn resolving_functions(ctx: &mut Context, promise: &ObjectRef) -> (Value, Value) {
    let already_resolved = Rc::new(Cell::new(false));

    let (target, flag) = (promise.clone(), already_resolved.clone());
    let resolve_fn = ctx.new_function("resolve", move |ctx, _, args| {
        if !flag.replace(true) {
            resolve(ctx, &target, arg(args, 0));
        }
        Ok(Value::Undefined)
    });

    let (target, flag) = (promise.clone(), already_resolved);
    let reject_fn = ctx.new_function("reject", move |ctx, _, args| {
        if !flag.replace(true) {
            reject(ctx, &target, arg(args, 0));
        }
        Ok(Value::Undefined)
    });

    (Value::Object(resolve_fn), Value::Object(reject_fn))
}

/// Resolve `promise` with `value`, adopting the state of thenables
pub(crate) fn resolve(ctx: &mut Context, promise: &ObjectRef, value: Value) {
    let Value::Object(object) = &value else {
        fulfill(ctx, promise, value);
        return;
    };
    if object.ptr_eq(promise) {
        let error = ctx.type_error("Chaining cycle detected for promise");
        reject(ctx, promise, error);
        return;
    }
    let then_fn = match ctx.get_property(&value, "then") {
        Ok(then_fn) => then_fn,
        Err(thrown) => {
            reject(ctx, promise, thrown);
            return;
        }
    };
    if !then_fn.is_callable() {
        fulfill(ctx, promise, value);
        return;
    }

    let promise = promise.clone();
    ctx.enqueue_job(Job::new("promise resolve thenable", move |ctx| {
        let (resolve_fn, reject_fn) = resolving_functions(ctx, &promise);
        if let Err(thrown) = ctx.call(&then_fn, &value, &[resolve_fn, reject_fn.clone()]) {
            ctx.call(&reject_fn, &Value::Undefined, &[thrown])?;
        }
        Ok(())
    }));
}

fn fulfill(ctx: &mut Context, promise: &ObjectRef, value: Value) {
    settle(ctx, promise, PromiseState::Fulfilled(value));
}

/// Reject `promise`; a rejection nobody handles is reported by the job loop
pub(crate) fn reject(ctx: &mut Context, promise: &ObjectRef, reason: Value) {
    let unhandled = settle(ctx, promise, PromiseState::Rejected(reason));
    if unhandled {
        ctx.pending_rejections.push(promise.clone());
    }
}

/// Returns whether a rejection landed without any handler attached
fn settle(ctx: &mut Context, promise: &ObjectRef, state: PromiseState) -> bool {
    let taken = with_data(promise, |data| {
        if data.is_settled() {
            return None;
        }
        data.state = state.clone();
        Some((std::mem::take(&mut data.reactions), data.handled))
    })
    .flatten();
    let Some((reactions, handled)) = taken else {
        return false;
    };
    for reaction in reactions {
        schedule_reaction(ctx, reaction, state.clone());
    }
    matches!(state, PromiseState::Rejected(_)) && !handled
}

fn schedule_reaction(ctx: &mut Context, reaction: Reaction, state: PromiseState) {
    ctx.enqueue_job(Job::new("promise reaction", move |ctx| {
        let (handler, argument, rejected) = match state {
            PromiseState::Fulfilled(value) => (reaction.on_fulfilled, value, false),
            PromiseState::Rejected(reason) => (reaction.on_rejected, reason, true),
            PromiseState::Pending => return Ok(()),
        };
        if !handler.is_callable() {
            if rejected {
                reject(ctx, &reaction.derived, argument);
            } else {
                resolve(ctx, &reaction.derived, argument);
            }
            return Ok(());
        }
        match ctx.call(&handler, &Value::Undefined, &[argument]) {
            Ok(result) => resolve(ctx, &reaction.derived, result),
            Err(thrown) => reject(ctx, &reaction.derived, thrown),
        }
        Ok(())
    }));
}

/// Attach handlers and return the derived promise
pub(crate) fn then(ctx: &mut Context, promise: &ObjectRef, on_fulfilled: Value, on_rejected: Value) -> ObjectRef {
    let derived = new_promise(ctx);
    let reaction = Reaction {
        on_fulfilled,
        on_rejected,
        derived: derived.clone(),
    };
    let settled = with_data(promise, |data| {
        data.handled = true;
        match &data.state {
            PromiseState::Pending => None,
            state => Some(state.clone()),
        }
    })
    .flatten();
    match settled {
        Some(state) => schedule_reaction(ctx, reaction, state),
        None => {
            with_data(promise, |data| data.reactions.push(reaction));
        }
    }
    derived
}

/// Reasons of rejected promises that still have no handler; clears the list
pub(crate) fn take_unhandled_rejections(ctx: &mut Context) -> Vec<Value> {
    std::mem::take(&mut ctx.pending_rejections)
        .into_iter()
        .filter_map(|promise| {
            with_data(&promise, |data| match (&data.state, data.handled) {
                (PromiseState::Rejected(reason), false) => Some(reason.clone()),
                _ => None,
            })
            .flatten()
        })
        .collect()
}
