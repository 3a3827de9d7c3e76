//! Engine error types
//!
//! Script-level exceptions are plain [`Value`](crate::Value)s and travel
//! through `ScriptResult`. They only become an [`EngineError`] when they
//! cross into the host.

use crate::runtime::Runtime;
use kiln_bytecode::{UnitError, VerifyError};
use kiln_sdk::NativeError;
use std::fmt;
use thiserror::Error;

/// Name and message of an exception that escaped into the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFailure {
    /// Error name (`TypeError`, ...); empty when a non-error value was thrown
    pub name: String,
    /// Error message, or the string form of the thrown value
    pub message: String,
}

impl ScriptFailure {
    /// Create a failure record
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ScriptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.name.is_empty(), self.message.is_empty()) {
            (true, _) => write!(f, "{}", self.message),
            (false, true) => write!(f, "{}", self.name),
            (false, false) => write!(f, "{}: {}", self.name, self.message),
        }
    }
}

/// Why a unit was refused before anything executed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UnitRejection {
    /// Header, length, checksum or payload decoding failed
    #[error(transparent)]
    Format(#[from] UnitError),

    /// Structural verification failed
    #[error(transparent)]
    Verify(#[from] VerifyError),

    /// A BigInt literal in the constant pool is not a decimal integer
    #[error("Invalid BigInt literal {0:?}")]
    BigIntLiteral(String),

    /// Requested evaluation mode differs from the compiled mode
    #[error("Unit '{name}' was compiled in {compiled} mode but was run in {requested} mode")]
    ModeMismatch {
        /// Unit name
        name: String,
        /// Mode recorded in the unit header
        compiled: &'static str,
        /// Mode passed to `bind_and_run`
        requested: &'static str,
    },
}

/// Errors surfaced by the engine to its host
#[derive(Debug, Error)]
pub enum EngineError {
    /// Memory or context limits prevent the operation
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The unit failed validation; nothing executed
    #[error("Malformed unit: {0}")]
    MalformedUnit(#[from] UnitRejection),

    /// A capability group could not be installed
    #[error("Cannot install capability '{capability}': {reason}")]
    CapabilityInstallFailure {
        /// Group name
        capability: &'static str,
        /// Reason
        reason: String,
    },

    /// A module could not be resolved or materialised
    #[error("Cannot resolve module '{name}': {reason}")]
    ModuleResolution {
        /// Normalised module name
        name: String,
        /// Reason
        reason: String,
    },

    /// A native module's initialization routine failed
    #[error("Native module '{name}' failed to initialize: {source}")]
    NativeModuleInit {
        /// Module name
        name: String,
        /// Error returned by the init routine
        #[source]
        source: NativeError,
    },

    /// An exception escaped a unit's top level or a host call
    #[error("Uncaught exception: {0}")]
    UncaughtScriptFailure(ScriptFailure),

    /// Misuse of the engine API
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl From<UnitError> for EngineError {
    fn from(err: UnitError) -> Self {
        EngineError::MalformedUnit(UnitRejection::Format(err))
    }
}

impl From<VerifyError> for EngineError {
    fn from(err: VerifyError) -> Self {
        EngineError::MalformedUnit(UnitRejection::Verify(err))
    }
}

/// Returned by [`Runtime::destroy`] while contexts are still alive.
///
/// The runtime is handed back intact.
pub struct DestroyError {
    /// The runtime that could not be destroyed
    pub runtime: Runtime,
    /// Number of contexts still alive
    pub live_contexts: usize,
}

impl fmt::Debug for DestroyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestroyError")
            .field("live_contexts", &self.live_contexts)
            .finish()
    }
}

impl fmt::Display for DestroyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "runtime still owns {} live context(s)",
            self.live_contexts
        )
    }
}

impl std::error::Error for DestroyError {}

impl From<DestroyError> for EngineError {
    fn from(err: DestroyError) -> Self {
        EngineError::InvariantViolation(err.to_string())
    }
}
