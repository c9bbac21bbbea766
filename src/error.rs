//! Error taxonomy for the stage driver.
//!
//! Malformed replies have no variant: a garbled status reads as
//! [`ControllerState::Unknown`] and a garbled position as `None`, and both
//! are recovered by the next poll.

use std::time::Duration;

use thiserror::Error;

use crate::axis::state::ControllerState;

pub type StageResult<T> = std::result::Result<T, StageError>;

#[derive(Error, Debug)]
pub enum StageError {
    #[error("failed to open serial port {port}: {source}")]
    Connection {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },

    #[error("transport I/O failure during {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot {operation}: controller not ready (state {state})")]
    NotReady {
        operation: String,
        state: ControllerState,
    },

    #[error("controller fault during {operation}: state {state}")]
    Fault {
        operation: String,
        state: ControllerState,
    },

    #[error("{operation} timed out after {waited:?} (last state {last_state})")]
    Timeout {
        operation: String,
        waited: Duration,
        last_state: ControllerState,
    },

    #[error("controller rejected move to {target} mm: error code {code}")]
    Rejected { target: f64, code: String },

    #[error("{operation} cancelled")]
    Cancelled { operation: String },
}

impl StageError {
    pub(crate) fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        StageError::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Stable snake_case identifier reported to socket clients.
    pub fn kind(&self) -> &'static str {
        match self {
            StageError::Connection { .. } => "connection",
            StageError::Io { .. } => "io",
            StageError::NotReady { .. } => "not_ready",
            StageError::Fault { .. } => "fault",
            StageError::Timeout { .. } => "timeout",
            StageError::Rejected { .. } => "rejected",
            StageError::Cancelled { .. } => "cancelled",
        }
    }

    /// Connection and transport failures leave the serial link in an
    /// unknown condition; everything else may be retried by the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StageError::Connection { .. } | StageError::Io { .. })
    }
}
