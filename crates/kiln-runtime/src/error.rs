//! Host error types.

use crate::config::ConfigError;
use kiln_engine::EngineError;
use std::path::PathBuf;

/// Errors that stop the host before a unit runs to completion.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The unit file could not be read
    #[error("Cannot read unit '{}': {source}", path.display())]
    ReadUnit {
        /// Path of the unit
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Invalid host configuration
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Engine failure
    #[error("{0}")]
    Engine(#[from] EngineError),
}

impl HostError {
    /// Process exit status for this failure.
    ///
    /// 1 for an uncaught exception in the top level, 2 for a unit that
    /// failed validation, 3 for everything else.
    pub fn exit_status(&self) -> i32 {
        match self {
            HostError::Engine(EngineError::UncaughtScriptFailure(_)) => 1,
            HostError::Engine(EngineError::MalformedUnit(_)) => 2,
            _ => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_engine::ScriptFailure;

    #[test]
    fn test_exit_status_mapping() {
        let thrown = HostError::Engine(EngineError::UncaughtScriptFailure(ScriptFailure::new("Error", "boom")));
        assert_eq!(thrown.exit_status(), 1);

        let exhausted = HostError::Engine(EngineError::ResourceExhausted("heap".to_string()));
        assert_eq!(exhausted.exit_status(), 3);

        let config = HostError::Config(ConfigError::UnknownExtension("nope".to_string()));
        assert_eq!(config.exit_status(), 3);
    }
}
