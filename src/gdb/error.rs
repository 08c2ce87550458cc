//! Error taxonomy for the GDB/MI session core

use crate::gdb::types::{MiTuple, SessionState};
use std::time::Duration;
use thiserror::Error;

/// Malformed MI text at a specific byte position
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("MI parse error at position {position}: {message}")]
pub struct ParseError {
    pub position: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// Failure of a single command or query against the backend
#[derive(Debug, Error)]
pub enum MiError {
    /// Backend answered with `^error`
    #[error("{command} failed: {message}")]
    Operation {
        command: String,
        message: String,
        payload: MiTuple,
    },

    #[error("{command} timed out after {elapsed:?}")]
    Timeout { command: String, elapsed: Duration },

    /// Reply succeeded but lacked a field the caller relies on
    #[error("{command} reply is missing `{field}`")]
    PayloadShape { command: String, field: String },

    #[error("{operation} is not allowed while the session is {state}")]
    IllegalState {
        operation: &'static str,
        state: SessionState,
    },

    /// Command or option text spanning more than one line
    #[error("refusing to send multi-line command {command:?}")]
    MultiLineCommand { command: String },

    #[error("debugger output stream is closed")]
    Closed,

    #[error("failed to write to debugger: {0}")]
    Io(#[from] std::io::Error),
}

impl MiError {
    pub fn payload_shape(command: &str, field: &str) -> Self {
        MiError::PayloadShape {
            command: command.to_string(),
            field: field.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MiError>;
