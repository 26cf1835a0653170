//! Error handling for the scene engine
//!
//! Build-time operations return `EngineResult`. Rendering never fails outright:
//! device problems are logged and the engine falls back to a slower path.

use std::error::Error as StdError;
use std::fmt;

/// Main error type for the scene engine
#[derive(Debug)]
pub enum EngineError {
    // Device Errors
    DeviceAllocation {
        resource: String,
        reason: String,
    },

    // Scene Graph Errors
    InvalidHandle {
        kind: String,
        index: usize,
    },
    InvalidTopology {
        shape: String,
        count: usize,
    },
    InvalidState {
        operation: String,
        state: String,
    },

    // Configuration Errors
    Config {
        message: String,
    },

    // System Errors
    Io {
        path: String,
        message: String,
    },
    WorkerPool {
        message: String,
    },

    // Generic fallback for unexpected errors
    Internal {
        message: String,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::DeviceAllocation { resource, reason } => {
                write!(f, "Device allocation failed for {}: {}", resource, reason)
            }

            EngineError::InvalidHandle { kind, index } => {
                write!(f, "Invalid {} handle: {}", kind, index)
            }
            EngineError::InvalidTopology { shape, count } => {
                write!(f, "Invalid topology: {} with {} points", shape, count)
            }
            EngineError::InvalidState { operation, state } => {
                write!(f, "Cannot {} while scene is {}", operation, state)
            }

            EngineError::Config { message } => write!(f, "Invalid config: {}", message),

            EngineError::Io { path, message } => write!(f, "IO error for {}: {}", path, message),
            EngineError::WorkerPool { message } => write!(f, "Worker pool error: {}", message),

            EngineError::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl StdError for EngineError {}

/// Type alias for Results in the scene engine
pub type EngineResult<T> = Result<T, EngineError>;

impl From<std::io::Error> for EngineError {
    fn from(error: std::io::Error) -> Self {
        EngineError::Io {
            path: String::new(),
            message: error.to_string(),
        }
    }
}

impl From<crate::renderer::DeviceError> for EngineError {
    fn from(error: crate::renderer::DeviceError) -> Self {
        EngineError::DeviceAllocation {
            resource: error.resource().to_string(),
            reason: error.to_string(),
        }
    }
}

impl From<crate::config::ConfigError> for EngineError {
    fn from(error: crate::config::ConfigError) -> Self {
        match error {
            crate::config::ConfigError::Io { path, source } => EngineError::Io {
                path,
                message: source.to_string(),
            },
            other => EngineError::Config {
                message: other.to_string(),
            },
        }
    }
}

/// Convert Option to Result with context
pub trait OptionExt<T> {
    fn ok_or_engine<F>(self, f: F) -> EngineResult<T>
    where
        F: FnOnce() -> EngineError;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_engine<F>(self, f: F) -> EngineResult<T>
    where
        F: FnOnce() -> EngineError,
    {
        self.ok_or_else(f)
    }
}
