//! Script values and heap objects
//!
//! Objects live in `Rc<RefCell<_>>` cells owned by exactly one context.
//! A context is single-threaded, so none of these types are `Send`;
//! values cross between contexts only as [`ClonedValue`](crate::worker::ClonedValue).

use crate::capability::promise::PromiseData;
use crate::context::Context;
use crate::conv;
use crate::interpreter::Closure;
use indexmap::IndexMap;
use num_bigint::BigInt;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

/// Result of any operation that may throw; `Err` carries the thrown value.
pub type ScriptResult<T = Value> = Result<T, Value>;

/// Signature of functions implemented by the host
pub type HostFn = Rc<dyn Fn(&mut Context, &Value, &[Value]) -> ScriptResult>;

/// A script value
#[derive(Clone, Default)]
pub enum Value {
    /// `undefined`
    #[default]
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Bool(bool),
    /// IEEE-754 double
    Number(f64),
    /// Arbitrary-precision integer
    BigInt(Rc<BigInt>),
    /// Immutable string
    String(Rc<str>),
    /// Heap object
    Object(ObjectRef),
}

impl Value {
    /// Create a string value
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Rc::from(s.as_ref()))
    }

    /// Is this `undefined`?
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Is this `undefined` or `null`?
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// The object, if this is one
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// The string contents, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The number, if this is a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Whether calling this value can succeed
    pub fn is_callable(&self) -> bool {
        self.as_object().map_or(false, ObjectRef::is_callable)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Value::Object(o)
    }
}

impl From<BigInt> for Value {
    fn from(b: BigInt) -> Self {
        Value::BigInt(Rc::new(b))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", conv::number_to_string(*n)),
            Value::BigInt(b) => write!(f, "{}n", b),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Object(o) => write!(f, "{:?}", o),
        }
    }
}

/// Shared, mutable handle to a heap object
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<Object>>);

impl ObjectRef {
    pub(crate) fn from_object(object: Object) -> Self {
        ObjectRef(Rc::new(RefCell::new(object)))
    }

    /// Borrow the object
    pub fn borrow(&self) -> Ref<'_, Object> {
        self.0.borrow()
    }

    /// Borrow the object mutably
    pub fn borrow_mut(&self) -> RefMut<'_, Object> {
        self.0.borrow_mut()
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const u8 as usize
    }

    pub(crate) fn downgrade(&self) -> Weak<RefCell<Object>> {
        Rc::downgrade(&self.0)
    }

    /// Own data property, ignoring exotic behaviour and the prototype chain
    pub fn get_own(&self, key: &str) -> Option<Value> {
        self.borrow().props.get(key).cloned()
    }

    /// Define or overwrite an own data property
    pub fn set_own(&self, key: impl Into<String>, value: Value) {
        self.borrow_mut().props.insert(key.into(), value);
    }

    /// Whether the object is a function
    pub fn is_callable(&self) -> bool {
        match &self.borrow().kind {
            ObjectKind::Function(_) => true,
            ObjectKind::Proxy { target, .. } => target.is_callable(),
            _ => false,
        }
    }

    /// Short description of the object's kind
    pub fn kind_name(&self) -> &'static str {
        self.borrow().kind.name()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(object) => write!(f, "[{} @{:#x}]", object.kind.name(), self.addr()),
            Err(_) => write!(f, "[object @{:#x}]", self.addr()),
        }
    }
}

/// A heap object: ordered own properties, a prototype and an internal kind
pub struct Object {
    /// Prototype, `None` for `null`
    pub proto: Option<ObjectRef>,
    /// Own data properties in insertion order
    pub props: IndexMap<String, Value>,
    /// Internal slots
    pub kind: ObjectKind,
}

impl Object {
    /// Create an object with no own properties
    pub fn new(kind: ObjectKind, proto: Option<ObjectRef>) -> Self {
        Self {
            proto,
            props: IndexMap::new(),
            kind,
        }
    }

    /// Rough size used for heap accounting
    pub(crate) fn estimated_size(&self) -> usize {
        let slots = match &self.kind {
            ObjectKind::Array(items) => items.len() * 16,
            ObjectKind::ArrayBuffer(bytes) => bytes.borrow().len(),
            ObjectKind::Map(entries) => entries.len() * 48,
            ObjectKind::Set(entries) => entries.len() * 32,
            _ => 0,
        };
        64 + self.props.len() * 48 + slots
    }

    /// Move out every object reference held in properties, the prototype
    /// slot and container kinds
    fn release_children(&mut self, out: &mut Vec<ObjectRef>) {
        fn push(value: Value, out: &mut Vec<ObjectRef>) {
            if let Value::Object(object) = value {
                out.push(object);
            }
        }

        out.extend(self.proto.take());
        for (_, value) in self.props.drain(..) {
            push(value, out);
        }
        match std::mem::replace(&mut self.kind, ObjectKind::Ordinary) {
            ObjectKind::Array(items) => items.into_iter().for_each(|item| push(item, out)),
            ObjectKind::Map(entries) => {
                for (_, (key, value)) in entries {
                    push(key, out);
                    push(value, out);
                }
            }
            ObjectKind::Set(entries) => entries.into_values().for_each(|item| push(item, out)),
            ObjectKind::Proxy { target, handler } => out.extend([target, handler]),
            kind => self.kind = kind,
        }
    }
}

// Freeing a long chain of nested objects must not recurse once per link
impl Drop for Object {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.release_children(&mut pending);
        while let Some(child) = pending.pop() {
            if Rc::strong_count(&child.0) == 1 {
                if let Ok(mut object) = child.0.try_borrow_mut() {
                    object.release_children(&mut pending);
                }
            }
        }
    }
}

/// Shared byte storage of an `ArrayBuffer`
pub type ByteStore = Rc<RefCell<Vec<u8>>>;

/// A `Uint8Array` window onto a buffer
#[derive(Clone)]
pub struct ByteView {
    /// Backing storage, shared with the buffer and other views
    pub buffer: ByteStore,
    /// Byte offset into the buffer
    pub offset: usize,
    /// Number of bytes visible
    pub len: usize,
}

impl ByteView {
    /// Read the byte at `index`
    pub fn get(&self, index: usize) -> Option<u8> {
        if index >= self.len {
            return None;
        }
        self.buffer.borrow().get(self.offset + index).copied()
    }

    /// Write the byte at `index`; out of range writes are ignored
    pub fn set(&self, index: usize, byte: u8) {
        if index < self.len {
            if let Some(slot) = self.buffer.borrow_mut().get_mut(self.offset + index) {
                *slot = byte;
            }
        }
    }

    /// Copy out the visible bytes
    pub fn to_vec(&self) -> Vec<u8> {
        let buffer = self.buffer.borrow();
        buffer[self.offset..self.offset + self.len].to_vec()
    }
}

/// Compiled regular expression with its source text
pub struct RegExpData {
    pub(crate) regex: regex::Regex,
    /// Pattern source
    pub source: String,
    /// Flags in canonical order
    pub flags: String,
}

impl RegExpData {
    /// Whether `flag` was given
    pub fn has_flag(&self, flag: char) -> bool {
        self.flags.contains(flag)
    }
}

/// Callable payload of a function object
#[derive(Clone)]
pub enum Callable {
    /// A function from a loaded unit
    Bytecode(Rc<Closure>),
    /// A function implemented by the host
    Host(HostFn),
}

/// Internal slots of an object
pub enum ObjectKind {
    /// Plain object
    Ordinary,
    /// Dense array
    Array(Vec<Value>),
    /// Function
    Function(Callable),
    /// Error instance (`name` and `message` live in properties)
    Error,
    /// Date with its time value in milliseconds since the epoch
    Date(f64),
    /// Regular expression
    RegExp(Rc<RegExpData>),
    /// `Map`: key identity → (key, value)
    Map(IndexMap<MapKey, (Value, Value)>),
    /// `Set`: key identity → value
    Set(IndexMap<MapKey, Value>),
    /// `ArrayBuffer`
    ArrayBuffer(ByteStore),
    /// `Uint8Array`
    Uint8Array(ByteView),
    /// Promise
    Promise(PromiseData),
    /// Proxy wrapping `target` with trap object `handler`
    Proxy {
        /// Proxied object
        target: ObjectRef,
        /// Trap object
        handler: ObjectRef,
    },
    /// Module namespace; read-only to scripts
    Namespace,
}

impl ObjectKind {
    /// Short name used in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            ObjectKind::Ordinary => "Object",
            ObjectKind::Array(_) => "Array",
            ObjectKind::Function(_) => "Function",
            ObjectKind::Error => "Error",
            ObjectKind::Date(_) => "Date",
            ObjectKind::RegExp(_) => "RegExp",
            ObjectKind::Map(_) => "Map",
            ObjectKind::Set(_) => "Set",
            ObjectKind::ArrayBuffer(_) => "ArrayBuffer",
            ObjectKind::Uint8Array(_) => "Uint8Array",
            ObjectKind::Promise(_) => "Promise",
            ObjectKind::Proxy { .. } => "Proxy",
            ObjectKind::Namespace => "Module",
        }
    }
}

/// Key identity for `Map` and `Set` (SameValueZero)
#[derive(Clone, PartialEq, Eq)]
pub enum MapKey {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Bool(bool),
    /// Number bits with `-0` folded into `+0` and a single NaN
    Number(u64),
    /// BigInt
    BigInt(BigInt),
    /// String
    String(Rc<str>),
    /// Object identity
    Object(usize),
}

impl MapKey {
    /// Identity key of a value
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Undefined => MapKey::Undefined,
            Value::Null => MapKey::Null,
            Value::Bool(b) => MapKey::Bool(*b),
            Value::Number(n) => {
                let bits = if n.is_nan() {
                    f64::NAN.to_bits()
                } else if *n == 0.0 {
                    0
                } else {
                    n.to_bits()
                };
                MapKey::Number(bits)
            }
            Value::BigInt(b) => MapKey::BigInt((**b).clone()),
            Value::String(s) => MapKey::String(s.clone()),
            Value::Object(o) => MapKey::Object(o.addr()),
        }
    }
}

impl Hash for MapKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            MapKey::Undefined | MapKey::Null => {}
            MapKey::Bool(b) => b.hash(state),
            MapKey::Number(bits) => bits.hash(state),
            MapKey::BigInt(b) => b.hash(state),
            MapKey::String(s) => s.hash(state),
            MapKey::Object(addr) => addr.hash(state),
        }
    }
}
