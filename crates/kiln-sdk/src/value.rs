//! NativeValue - values that cross the native module boundary
//!
//! Only primitives cross. Objects and functions stay inside the engine,
//! which keeps native modules independent of the engine's heap and lets
//! `NativeValue` be `Send + Sync` without any unsafe code.

use std::fmt;

/// A primitive value passed to or returned from a native function
#[derive(Debug, Clone, PartialEq, Default)]
pub enum NativeValue {
    /// `undefined`
    #[default]
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Bool(bool),
    /// Integral number
    Int(i64),
    /// Non-integral (or out of i64 range) number
    Float(f64),
    /// String
    String(String),
}

impl NativeValue {
    /// Build a number, preferring `Int` when the value is integral
    pub fn number(n: f64) -> Self {
        if n.fract() == 0.0 && n.is_finite() && n.abs() < 9.007_199_254_740_992e15 {
            NativeValue::Int(n as i64)
        } else {
            NativeValue::Float(n)
        }
    }

    /// Numeric view of `Int` and `Float`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NativeValue::Int(i) => Some(*i as f64),
            NativeValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer view; floats qualify only when integral
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NativeValue::Int(i) => Some(*i),
            NativeValue::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    /// Boolean view
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            NativeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// String view
    pub fn as_str(&self) -> Option<&str> {
        match self {
            NativeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// `undefined` or `null`
    pub fn is_nullish(&self) -> bool {
        matches!(self, NativeValue::Undefined | NativeValue::Null)
    }

    /// Name of the value's type, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            NativeValue::Undefined => "undefined",
            NativeValue::Null => "null",
            NativeValue::Bool(_) => "boolean",
            NativeValue::Int(_) | NativeValue::Float(_) => "number",
            NativeValue::String(_) => "string",
        }
    }
}

impl fmt::Display for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeValue::Undefined => f.write_str("undefined"),
            NativeValue::Null => f.write_str("null"),
            NativeValue::Bool(b) => write!(f, "{}", b),
            NativeValue::Int(i) => write!(f, "{}", i),
            NativeValue::Float(x) => write!(f, "{}", x),
            NativeValue::String(s) => f.write_str(s),
        }
    }
}
