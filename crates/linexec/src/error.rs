use thiserror::Error;

use crate::array::ArrayKind;

/// Errors surfaced by buffers, the command compiler and the executors.
///
/// Everything except `IncompatibleBuffer` and `Device` is raised while compiling a description;
/// a compiled computation only fails at execution time when it is paired with the wrong buffer or
/// the device reports a failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("syntax error in command '{command}': {reason}")]
    Syntax { command: String, reason: String },
    #[error("unknown binding '{0}'")]
    UnknownBinding(String),
    #[error("unsupported operation '{function}': {reason}")]
    UnsupportedOperation { function: String, reason: String },
    #[error("shape mismatch in '{function}': {detail}")]
    ShapeMismatch { function: String, detail: String },
    #[error("binding '{0}' is already present in the buffer")]
    DuplicateBinding(String),
    #[error("binding '{name}' holds a {found}, expected a {expected}")]
    KindMismatch {
        name: String,
        expected: ArrayKind,
        found: ArrayKind,
    },
    #[error("computation does not match buffer layout: {0}")]
    IncompatibleBuffer(String),
    #[error("device failure: {0}")]
    Device(String),
}

impl EngineError {
    pub fn syntax(command: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::Syntax {
            command: command.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported(function: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::UnsupportedOperation {
            function: function.into(),
            reason: reason.into(),
        }
    }

    pub fn shape_mismatch(function: impl Into<String>, detail: impl Into<String>) -> Self {
        EngineError::ShapeMismatch {
            function: function.into(),
            detail: detail.into(),
        }
    }

    pub fn device(message: impl Into<String>) -> Self {
        EngineError::Device(message.into())
    }
}

/// Convenience alias for results returned by engine routines.
pub type EngineResult<T> = Result<T, EngineError>;
