//! Error types for the CRT coordination core

use thiserror::Error;

use crate::resource::ResourceKind;

/// Result type alias for CRT operations
pub type Result<T> = std::result::Result<T, CrtError>;

/// Errors surfaced by the coordination core.
///
/// None of these are fatal to the page: callers log them and skip the
/// affected subsystem.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CrtError {
    /// A configuration value or engine patch was rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A physics engine failed to initialise
    #[error("Engine {engine} failed to initialise: {reason}")]
    EngineInit {
        /// Engine name
        engine: &'static str,
        /// Reason for failure
        reason: String,
    },

    /// Releasing a tracked resource failed
    #[error("Failed to dispose {kind:?} resource: {reason}")]
    Dispose {
        /// Kind of the resource being released
        kind: ResourceKind,
        /// Platform error message
        reason: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A JS value of the wrong type was handed in as a resource
    #[error("Invalid handle: expected {0}")]
    InvalidHandle(String),

    /// An expected DOM node or browser object is missing
    #[error("Missing DOM dependency: {0}")]
    MissingDom(String),
}

impl CrtError {
    /// Shorthand for a disposal failure.
    pub fn dispose(kind: ResourceKind, reason: impl Into<String>) -> Self {
        CrtError::Dispose {
            kind,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for CrtError {
    fn from(err: serde_json::Error) -> Self {
        CrtError::Serialization(err.to_string())
    }
}
