//! Error types for the affinity engine
//!
//! This module defines all error types used throughout the application,
//! split into startup-fatal errors (which end the process before the
//! scheduler loop starts) and per-entry errors raised by the control
//! collaborator while a pass is running.

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes reported by the binary, one per failure category
pub mod exit_code {
    /// Generic failure
    pub const GENERIC: i32 = 1;
    /// Configuration document failed structural validation
    pub const SCHEMA: i32 = 2;
    /// Declared operating system does not match the host
    pub const OS_MISMATCH: i32 = 3;
    /// Affinity/priority control could not be initialized
    pub const CONTROL_INIT: i32 = 4;
    /// Process specifications or interval could not be read
    pub const SPEC_LOAD: i32 = 5;
    /// Scheduler worker ended abnormally
    pub const WORKER: i32 = 6;
}

/// Main error type for affinity engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// I/O error while reading a document
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed XML in the configuration document
    #[error("XML error in '{path}': {message}")]
    Xml { path: PathBuf, message: String },

    /// Structural validation against the schema failed
    #[error("Schema validation failed: {0}")]
    Schema(String),

    /// The declared target OS is not the running OS
    #[error("Configuration targets '{declared}' but this host runs '{running}'")]
    OsMismatch { declared: String, running: String },

    /// Control collaborator failed to initialize
    #[error("Failed to initialize affinity control: {0}")]
    ControlInit(String),

    /// A process or thread entry could not be parsed
    #[error("Invalid entry {entry}: {message}")]
    SpecLoad { entry: String, message: String },

    /// Wake-up interval is missing or not a positive integer
    #[error("Invalid invocation interval: {0}")]
    InvalidInterval(String),

    /// A control primitive failed for one entry
    #[error("Failed to {operation} for '{target}': {message}")]
    Control {
        operation: &'static str,
        target: String,
        message: String,
    },

    /// Named process or thread is not running
    #[error("No running {kind} named '{name}'")]
    NotFound { kind: &'static str, name: String },

    /// A control primitive did not return in time
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Unsupported operation on this platform
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The scheduler worker thread panicked
    #[error("Scheduler worker panicked")]
    WorkerPanicked,

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an XML error
    pub fn xml(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Xml {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a spec load error for a named entry
    pub fn spec_load(entry: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SpecLoad {
            entry: entry.into(),
            message: message.into(),
        }
    }

    /// Create a control primitive error
    pub fn control(
        operation: &'static str,
        target: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        Self::Control {
            operation,
            target: target.into(),
            message: message.to_string(),
        }
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Process exit code for this error's category
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Schema(_) => exit_code::SCHEMA,
            Self::OsMismatch { .. } => exit_code::OS_MISMATCH,
            Self::ControlInit(_) => exit_code::CONTROL_INIT,
            Self::SpecLoad { .. } | Self::InvalidInterval(_) | Self::Xml { .. } => {
                exit_code::SPEC_LOAD
            }
            Self::WorkerPanicked => exit_code::WORKER,
            Self::WithContext { source, .. } => source.exit_code(),
            _ => exit_code::GENERIC,
        }
    }
}

/// Result type alias for affinity engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| EngineError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let result: Result<()> = Err(io_err).with_path("/etc/engine.xml");
        match result {
            Err(EngineError::Io { path, .. }) => assert_eq!(path, PathBuf::from("/etc/engine.xml")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_exit_codes_are_distinct_per_category() {
        let codes = [
            EngineError::Schema("bad".into()).exit_code(),
            EngineError::OsMismatch {
                declared: "windows".into(),
                running: "linux".into(),
            }
            .exit_code(),
            EngineError::ControlInit("no /proc".into()).exit_code(),
            EngineError::spec_load("ProcessInfo[0]", "bad priority").exit_code(),
            EngineError::WorkerPanicked.exit_code(),
        ];
        let mut unique = codes.to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), codes.len());
        assert!(codes.iter().all(|&c| c != 0));
    }

    #[test]
    fn test_context_preserves_category() {
        let err = EngineError::Schema("missing OS".into()).with_context("startup");
        assert_eq!(err.exit_code(), exit_code::SCHEMA);
        assert!(err.to_string().contains("startup"), "{}", err);

        let per_entry = EngineError::NotFound {
            kind: "process",
            name: "java".into(),
        };
        assert_eq!(per_entry.exit_code(), exit_code::GENERIC);
    }
}
