//! Error types for native modules

/// Result type for native functions
pub type NativeResult<T> = Result<T, NativeError>;

/// Native module error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NativeError {
    /// Type mismatch during conversion
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected type name
        expected: String,
        /// Actual type name
        got: String,
    },

    /// Wrong number of arguments or an argument outside the accepted domain
    #[error("Argument error: {0}")]
    ArgumentError(String),

    /// Module-level error, typically raised by an init function
    #[error("Module error: {0}")]
    ModuleError(String),
}

impl From<String> for NativeError {
    fn from(s: String) -> Self {
        NativeError::ModuleError(s)
    }
}

impl From<&str> for NativeError {
    fn from(s: &str) -> Self {
        NativeError::ModuleError(s.to_string())
    }
}
