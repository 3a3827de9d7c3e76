//! Property access, calls and operators
//!
//! Borrow discipline: an object's `RefCell` is never held across a call
//! back into the context, since any call may run script code that touches
//! the same object.

use crate::context::Context;
use crate::conv;
use crate::value::{Callable, ObjectKind, ObjectRef, ScriptResult, Value};
use num_bigint::BigInt;
use num_traits::Zero;
use std::cmp::Ordering;
use std::rc::Rc;

/// Per-property charge when an object grows
pub(crate) const PROPERTY_BYTES: usize = 48;
/// Per-element charge when an array grows
pub(crate) const ELEMENT_BYTES: usize = 16;

/// Binary arithmetic operators other than `+`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Arith {
    Sub,
    Mul,
    Div,
    Mod,
}

enum SetOutcome {
    Stored(usize),
    Define,
    ReadOnly,
    BadLength,
}

fn proxy_parts(object: &ObjectRef) -> Option<(ObjectRef, ObjectRef)> {
    match &object.borrow().kind {
        ObjectKind::Proxy { target, handler } => Some((target.clone(), handler.clone())),
        _ => None,
    }
}

/// Properties backed by internal slots rather than the property table
fn exotic_get(object: &ObjectRef, key: &str) -> Option<Value> {
    let object = object.borrow();
    match &object.kind {
        ObjectKind::Array(items) => {
            if key == "length" {
                Some(Value::from(items.len()))
            } else {
                conv::array_index(key).map(|i| items.get(i).cloned().unwrap_or_default())
            }
        }
        ObjectKind::Uint8Array(view) => match key {
            "length" | "byteLength" => Some(Value::from(view.len)),
            "byteOffset" => Some(Value::from(view.offset)),
            _ => conv::array_index(key).map(|i| {
                view.get(i)
                    .map(|b| Value::Number(b as f64))
                    .unwrap_or_default()
            }),
        },
        ObjectKind::ArrayBuffer(bytes) if key == "byteLength" => {
            Some(Value::from(bytes.borrow().len()))
        }
        ObjectKind::Map(entries) if key == "size" => Some(Value::from(entries.len())),
        ObjectKind::Set(entries) if key == "size" => Some(Value::from(entries.len())),
        ObjectKind::RegExp(re) => match key {
            "source" => Some(Value::from(re.source.as_str())),
            "flags" => Some(Value::from(re.flags.as_str())),
            "global" => Some(Value::Bool(re.has_flag('g'))),
            "ignoreCase" => Some(Value::Bool(re.has_flag('i'))),
            "multiline" => Some(Value::Bool(re.has_flag('m'))),
            _ => None,
        },
        _ => None,
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Object(o) if o.is_callable() => "function".to_string(),
        other => conv::to_string(other),
    }
}

/// Objects compare and concatenate through their string form
fn to_primitive(value: &Value) -> Value {
    match value {
        Value::Object(_) => Value::string(conv::to_string(value)),
        other => other.clone(),
    }
}

impl Context {
    // ────────────────────────────────────────────────────────────────
    // Errors
    // ────────────────────────────────────────────────────────────────

    /// Create a `TypeError`
    pub fn type_error(&mut self, message: impl AsRef<str>) -> Value {
        self.make_error("TypeError", message.as_ref())
    }

    /// Create a `RangeError`
    pub fn range_error(&mut self, message: impl AsRef<str>) -> Value {
        self.make_error("RangeError", message.as_ref())
    }

    /// Create a `ReferenceError`
    pub fn reference_error(&mut self, message: impl AsRef<str>) -> Value {
        self.make_error("ReferenceError", message.as_ref())
    }

    /// Create a `SyntaxError`
    pub fn syntax_error(&mut self, message: impl AsRef<str>) -> Value {
        self.make_error("SyntaxError", message.as_ref())
    }

    /// Create an `InternalError`
    pub fn internal_error(&mut self, message: impl AsRef<str>) -> Value {
        self.make_error("InternalError", message.as_ref())
    }

    // ────────────────────────────────────────────────────────────────
    // Property access
    // ────────────────────────────────────────────────────────────────

    /// Read `target[key]`
    pub fn get_property(&mut self, target: &Value, key: &str) -> ScriptResult {
        let proto = match target {
            Value::Undefined | Value::Null => {
                return Err(self.type_error(format!(
                    "cannot read property '{}' of {}",
                    key,
                    conv::to_string(target)
                )));
            }
            Value::Object(o) => {
                let o = o.clone();
                return self.get_object_property(&o, key, target);
            }
            Value::String(s) => {
                if key == "length" {
                    return Ok(Value::from(s.chars().count()));
                }
                if let Some(i) = conv::array_index(key) {
                    return Ok(s
                        .chars()
                        .nth(i)
                        .map(|c| Value::string(c.to_string()))
                        .unwrap_or_default());
                }
                self.intrinsics.string_proto.clone()
            }
            Value::Bool(_) => self.intrinsics.boolean_proto.clone(),
            Value::Number(_) => self.intrinsics.number_proto.clone(),
            Value::BigInt(_) => self.intrinsics.bigint_proto.clone(),
        };
        self.get_object_property(&proto, key, target)
    }

    pub(crate) fn get_object_property(
        &mut self,
        object: &ObjectRef,
        key: &str,
        receiver: &Value,
    ) -> ScriptResult {
        let mut current = object.clone();
        loop {
            if let Some((target, handler)) = proxy_parts(&current) {
                return self.proxy_get(&target, &handler, key, receiver);
            }
            if let Some(value) = exotic_get(&current, key) {
                return Ok(value);
            }
            let next = {
                let borrowed = current.borrow();
                if let Some(value) = borrowed.props.get(key) {
                    return Ok(value.clone());
                }
                borrowed.proto.clone()
            };
            match next {
                Some(proto) => current = proto,
                None => return Ok(Value::Undefined),
            }
        }
    }

    fn proxy_get(
        &mut self,
        target: &ObjectRef,
        handler: &ObjectRef,
        key: &str,
        receiver: &Value,
    ) -> ScriptResult {
        let handler_value = Value::Object(handler.clone());
        let trap = self.get_object_property(handler, "get", &handler_value)?;
        if trap.is_callable() {
            return self.call(
                &trap,
                &handler_value,
                &[Value::Object(target.clone()), Value::from(key), receiver.clone()],
            );
        }
        self.get_object_property(target, key, receiver)
    }

    /// Write `target[key] = value`
    pub fn set_property(&mut self, target: &Value, key: &str, value: Value) -> ScriptResult<()> {
        match target {
            Value::Object(o) => {
                let o = o.clone();
                self.set_object_property(&o, key, value, target)
            }
            Value::Undefined | Value::Null => Err(self.type_error(format!(
                "cannot set property '{}' of {}",
                key,
                conv::to_string(target)
            ))),
            // Writes to primitives are silently dropped
            _ => Ok(()),
        }
    }

    pub(crate) fn set_object_property(
        &mut self,
        object: &ObjectRef,
        key: &str,
        value: Value,
        receiver: &Value,
    ) -> ScriptResult<()> {
        if let Some((target, handler)) = proxy_parts(object) {
            let handler_value = Value::Object(handler.clone());
            let trap = self.get_object_property(&handler, "set", &handler_value)?;
            if trap.is_callable() {
                self.call(
                    &trap,
                    &handler_value,
                    &[Value::Object(target), Value::from(key), value, receiver.clone()],
                )?;
                return Ok(());
            }
            return self.set_object_property(&target, key, value, receiver);
        }

        let outcome = {
            let mut borrowed = object.borrow_mut();
            match &mut borrowed.kind {
                ObjectKind::Array(items) => {
                    if key == "length" {
                        let n = conv::to_number(&value);
                        if n >= 0.0 && n.fract() == 0.0 && n < u32::MAX as f64 {
                            let grown = (n as usize).saturating_sub(items.len());
                            items.resize(n as usize, Value::Undefined);
                            SetOutcome::Stored(grown * ELEMENT_BYTES)
                        } else {
                            SetOutcome::BadLength
                        }
                    } else if let Some(i) = conv::array_index(key) {
                        let grown = (i + 1).saturating_sub(items.len());
                        if grown > 0 {
                            items.resize(i + 1, Value::Undefined);
                        }
                        items[i] = value.clone();
                        SetOutcome::Stored(grown * ELEMENT_BYTES)
                    } else {
                        SetOutcome::Define
                    }
                }
                ObjectKind::Uint8Array(view) => {
                    if let Some(i) = conv::array_index(key) {
                        view.set(i, conv::to_uint8(&value));
                        SetOutcome::Stored(0)
                    } else if matches!(key, "length" | "byteLength" | "byteOffset") {
                        SetOutcome::Stored(0)
                    } else {
                        SetOutcome::Define
                    }
                }
                ObjectKind::Namespace => SetOutcome::ReadOnly,
                _ => SetOutcome::Define,
            }
        };

        match outcome {
            SetOutcome::Stored(bytes) => {
                if bytes > 0 {
                    self.heap.charge(bytes);
                }
                Ok(())
            }
            SetOutcome::Define => {
                let inserted = object
                    .borrow_mut()
                    .props
                    .insert(key.to_string(), value)
                    .is_none();
                if inserted {
                    self.heap.charge(PROPERTY_BYTES);
                }
                Ok(())
            }
            SetOutcome::ReadOnly => Err(self.type_error(format!(
                "cannot assign to read only property '{}' of module namespace",
                key
            ))),
            SetOutcome::BadLength => Err(self.range_error("invalid array length")),
        }
    }

    /// `key in target`
    pub fn has_property(&mut self, object: &ObjectRef, key: &str) -> ScriptResult<bool> {
        if let Some((target, handler)) = proxy_parts(object) {
            let handler_value = Value::Object(handler.clone());
            let trap = self.get_object_property(&handler, "has", &handler_value)?;
            if trap.is_callable() {
                let result = self.call(
                    &trap,
                    &handler_value,
                    &[Value::Object(target), Value::from(key)],
                )?;
                return Ok(conv::to_boolean(&result));
            }
            return self.has_property(&target, key);
        }
        if exotic_get(object, key).map_or(false, |v| !v.is_undefined() || key == "length") {
            return Ok(true);
        }
        Ok(conv::chain_get(object, key).is_some())
    }

    /// Own enumerable keys in order: indices first, then named properties
    pub fn own_keys(&self, object: &ObjectRef) -> Vec<String> {
        if let Some((target, _)) = proxy_parts(object) {
            return self.own_keys(&target);
        }
        let borrowed = object.borrow();
        let mut keys: Vec<String> = match &borrowed.kind {
            ObjectKind::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
            ObjectKind::Uint8Array(view) => (0..view.len).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        };
        keys.extend(borrowed.props.keys().cloned());
        keys
    }

    /// Read `target[key]` for a computed key
    pub(crate) fn get_element(&mut self, target: &Value, key: &Value) -> ScriptResult {
        if let (Value::Object(o), Value::Number(n)) = (target, key) {
            if *n >= 0.0 && n.fract() == 0.0 {
                if let ObjectKind::Array(items) = &o.borrow().kind {
                    return Ok(items.get(*n as usize).cloned().unwrap_or_default());
                }
            }
        }
        let key = conv::to_string(key);
        self.get_property(target, &key)
    }

    /// Write `target[key] = value` for a computed key
    pub(crate) fn set_element(&mut self, target: &Value, key: &Value, value: Value) -> ScriptResult<()> {
        let key = conv::to_string(key);
        self.set_property(target, &key, value)
    }

    /// Snapshot of an array's elements
    pub fn array_items(&self, value: &Value) -> Option<Vec<Value>> {
        match value {
            Value::Object(o) => match &o.borrow().kind {
                ObjectKind::Array(items) => Some(items.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    // ────────────────────────────────────────────────────────────────
    // Calls
    // ────────────────────────────────────────────────────────────────

    fn callable_of(object: &ObjectRef) -> Option<Callable> {
        match &object.borrow().kind {
            ObjectKind::Function(callable) => Some(callable.clone()),
            ObjectKind::Proxy { target, .. } => Self::callable_of(target),
            _ => None,
        }
    }

    /// Call `function` with the given receiver and arguments
    pub fn call(&mut self, function: &Value, this: &Value, args: &[Value]) -> ScriptResult {
        self.enter_execution();
        let callable = function.as_object().and_then(Self::callable_of);
        let Some(callable) = callable else {
            return Err(self.type_error(format!("{} is not a function", describe(function))));
        };
        self.invoke(callable, this, args)
    }

    /// Run a callable with call-depth accounting
    pub(crate) fn invoke(&mut self, callable: Callable, this: &Value, args: &[Value]) -> ScriptResult {
        if self.call_depth >= self.runtime().options().max_stack_depth {
            return Err(self.range_error("Maximum call stack size exceeded"));
        }
        self.call_depth += 1;
        let result = match callable {
            Callable::Host(f) => f(self, this, args),
            Callable::Bytecode(closure) => self.call_closure(&closure, args),
        };
        self.call_depth -= 1;
        result
    }

    /// Call `receiver[name](...args)`
    pub fn call_method(&mut self, receiver: &Value, name: &str, args: &[Value]) -> ScriptResult {
        let method = self.get_property(receiver, name)?;
        if !method.is_callable() {
            return Err(self.type_error(format!("'{}' is not a function", name)));
        }
        self.call(&method, receiver, args)
    }

    // ────────────────────────────────────────────────────────────────
    // Operators
    // ────────────────────────────────────────────────────────────────

    fn mixed_bigint(&mut self) -> Value {
        self.type_error("cannot mix BigInt and other types, use explicit conversions")
    }

    /// `a + b`
    pub(crate) fn add(&mut self, a: &Value, b: &Value) -> ScriptResult {
        let a = to_primitive(a);
        let b = to_primitive(b);
        match (&a, &b) {
            (Value::String(_), _) | (_, Value::String(_)) => {
                let mut out = conv::to_string(&a);
                out.push_str(&conv::to_string(&b));
                Ok(Value::from(out))
            }
            (Value::BigInt(x), Value::BigInt(y)) => Ok(Value::BigInt(Rc::new(&**x + &**y))),
            (Value::BigInt(_), _) | (_, Value::BigInt(_)) => Err(self.mixed_bigint()),
            _ => Ok(Value::Number(conv::to_number(&a) + conv::to_number(&b))),
        }
    }

    /// `a - b`, `a * b`, `a / b`, `a % b`
    pub(crate) fn arith(&mut self, op: Arith, a: &Value, b: &Value) -> ScriptResult {
        match (a, b) {
            (Value::BigInt(x), Value::BigInt(y)) => {
                let (x, y): (&BigInt, &BigInt) = (&**x, &**y);
                let result = match op {
                    Arith::Sub => x - y,
                    Arith::Mul => x * y,
                    Arith::Div | Arith::Mod if y.is_zero() => {
                        return Err(self.range_error("Division by zero"));
                    }
                    Arith::Div => x / y,
                    Arith::Mod => x % y,
                };
                Ok(Value::BigInt(Rc::new(result)))
            }
            (Value::BigInt(_), _) | (_, Value::BigInt(_)) => Err(self.mixed_bigint()),
            _ => {
                let x = conv::to_number(a);
                let y = conv::to_number(b);
                Ok(Value::Number(match op {
                    Arith::Sub => x - y,
                    Arith::Mul => x * y,
                    Arith::Div => x / y,
                    Arith::Mod => x % y,
                }))
            }
        }
    }

    /// Unary `-`
    pub(crate) fn negate(&mut self, value: &Value) -> ScriptResult {
        match value {
            Value::BigInt(b) => Ok(Value::BigInt(Rc::new(-&**b))),
            other => Ok(Value::Number(-conv::to_number(other))),
        }
    }

    /// Relational comparison; `None` when the operands are unordered
    pub(crate) fn compare(&mut self, a: &Value, b: &Value) -> Option<Ordering> {
        let a = to_primitive(a);
        let b = to_primitive(b);
        match (&a, &b) {
            (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
            (Value::BigInt(x), Value::BigInt(y)) => Some(x.cmp(y)),
            (Value::BigInt(x), Value::String(s)) => {
                s.trim().parse::<BigInt>().ok().map(|y| (**x).cmp(&y))
            }
            (Value::String(s), Value::BigInt(y)) => {
                s.trim().parse::<BigInt>().ok().map(|x| x.cmp(y))
            }
            (Value::BigInt(x), other) => conv::bigint_cmp_f64(x, conv::to_number(other)),
            (other, Value::BigInt(y)) => {
                conv::bigint_cmp_f64(y, conv::to_number(other)).map(Ordering::reverse)
            }
            _ => conv::to_number(&a).partial_cmp(&conv::to_number(&b)),
        }
    }
}
