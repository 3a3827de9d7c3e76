//! Traits for converting between native values and Rust types.
//!
//! Implement [`FromNative`] for argument types and [`ToNative`] for return
//! types; the typed registration helpers on [`crate::NativeModule`] use them.

use crate::error::NativeError;
use crate::value::NativeValue;

/// Convert from NativeValue to Rust type.
pub trait FromNative: Sized {
    /// Convert, returning an error if the type doesn't match.
    fn from_native(value: &NativeValue) -> Result<Self, NativeError>;
}

/// Convert from Rust type to NativeValue.
pub trait ToNative {
    /// Convert to NativeValue.
    fn to_native(self) -> NativeValue;
}

fn mismatch(expected: &str, value: &NativeValue) -> NativeError {
    NativeError::TypeMismatch {
        expected: expected.to_string(),
        got: value.type_name().to_string(),
    }
}

impl FromNative for i64 {
    fn from_native(value: &NativeValue) -> Result<Self, NativeError> {
        value.as_i64().ok_or_else(|| mismatch("integer", value))
    }
}

impl FromNative for i32 {
    fn from_native(value: &NativeValue) -> Result<Self, NativeError> {
        let wide = i64::from_native(value)?;
        i32::try_from(wide)
            .map_err(|_| NativeError::ArgumentError(format!("{} does not fit in i32", wide)))
    }
}

impl FromNative for f64 {
    fn from_native(value: &NativeValue) -> Result<Self, NativeError> {
        value.as_f64().ok_or_else(|| mismatch("number", value))
    }
}

impl FromNative for bool {
    fn from_native(value: &NativeValue) -> Result<Self, NativeError> {
        value.as_bool().ok_or_else(|| mismatch("boolean", value))
    }
}

impl FromNative for String {
    fn from_native(value: &NativeValue) -> Result<Self, NativeError> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch("string", value))
    }
}

impl FromNative for NativeValue {
    fn from_native(value: &NativeValue) -> Result<Self, NativeError> {
        Ok(value.clone())
    }
}

impl<T: FromNative> FromNative for Option<T> {
    fn from_native(value: &NativeValue) -> Result<Self, NativeError> {
        if value.is_nullish() {
            Ok(None)
        } else {
            T::from_native(value).map(Some)
        }
    }
}

impl ToNative for i64 {
    fn to_native(self) -> NativeValue {
        NativeValue::Int(self)
    }
}

impl ToNative for i32 {
    fn to_native(self) -> NativeValue {
        NativeValue::Int(self as i64)
    }
}

impl ToNative for f64 {
    fn to_native(self) -> NativeValue {
        NativeValue::number(self)
    }
}

impl ToNative for bool {
    fn to_native(self) -> NativeValue {
        NativeValue::Bool(self)
    }
}

impl ToNative for String {
    fn to_native(self) -> NativeValue {
        NativeValue::String(self)
    }
}

impl ToNative for &str {
    fn to_native(self) -> NativeValue {
        NativeValue::String(self.to_string())
    }
}

impl ToNative for NativeValue {
    fn to_native(self) -> NativeValue {
        self
    }
}

// Unit type (for functions that return nothing)
impl ToNative for () {
    fn to_native(self) -> NativeValue {
        NativeValue::Undefined
    }
}

impl<T: ToNative> ToNative for Option<T> {
    fn to_native(self) -> NativeValue {
        match self {
            Some(v) => v.to_native(),
            None => NativeValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_native_traits() {
        assert_eq!(i32::from_native(&NativeValue::Int(42)).unwrap(), 42);
        assert_eq!(i64::from_native(&NativeValue::Float(7.0)).unwrap(), 7);
        assert!(bool::from_native(&NativeValue::Bool(true)).unwrap());
        assert_eq!(
            String::from_native(&NativeValue::String("hi".into())).unwrap(),
            "hi"
        );
        assert_eq!(Option::<i64>::from_native(&NativeValue::Null).unwrap(), None);
    }

    #[test]
    fn test_from_native_mismatch() {
        let err = i64::from_native(&NativeValue::String("x".into())).unwrap_err();
        assert_eq!(
            err,
            NativeError::TypeMismatch {
                expected: "integer".to_string(),
                got: "string".to_string()
            }
        );
        assert!(matches!(
            i32::from_native(&NativeValue::Int(1 << 40)),
            Err(NativeError::ArgumentError(_))
        ));
    }

    #[test]
    fn test_to_native_traits() {
        assert_eq!(42i32.to_native(), NativeValue::Int(42));
        assert_eq!(1.5f64.to_native(), NativeValue::Float(1.5));
        assert_eq!(().to_native(), NativeValue::Undefined);
        assert_eq!(None::<i64>.to_native(), NativeValue::Null);
    }
}
