//! Errors - エラー型と分類
//!
//! - **TransportError**: queue service failures (surfaced, never retried here)
//! - **CodecError**: payload encode / decode failures
//! - **TaskFailure**: one attempt failed; becomes a failed outcome record
//! - **TaskQError**: what public operations return
//!
//! Per-message problems (poison messages) are contained by the worker loop;
//! only [`ErrorKind::QueueUnavailable`] errors escape it.

use std::any::Any;
use std::time::Duration;

use thiserror::Error;

use crate::ports::transport::MAX_DELAY_SECS;
use crate::typed::RegistryError;

/// Failures of the queue transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error(
        "delay of {delay:?} must be a whole number of seconds within 0..={max}s",
        max = MAX_DELAY_SECS
    )]
    InvalidDelay { delay: Duration },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("transport operation failed: {0}")]
    OperationFailed(String),
}

/// Failures of the message codec.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encode: {0}")]
    Encode(String),

    #[error("decode: {0}")]
    Decode(String),
}

/// A failed execution attempt, described for humans.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TaskFailure {
    message: String,
}

impl TaskFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Describe a caught handler panic.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::new(format!("handler panicked: {detail}"))
    }
}

impl From<CodecError> for TaskFailure {
    fn from(err: CodecError) -> Self {
        Self::new(err.to_string())
    }
}

/// Operational classification of [`TaskQError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A single bad message; contained at message granularity.
    PoisonMessage,
    /// The transport cannot be used; propagates out of the loops.
    QueueUnavailable,
    /// Invalid input from the caller (e.g. out-of-range delay).
    Caller,
}

/// Error returned by producer, loops and admin operations.
#[derive(Debug, Error)]
pub enum TaskQError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(
        "delay of {delay:?} must be a whole number of seconds within 0..={max}s",
        max = MAX_DELAY_SECS
    )]
    InvalidDelay { delay: Duration },

    #[error("unknown pool: {0}")]
    UnknownPool(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl TaskQError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskQError::Transport(TransportError::InvalidDelay { .. })
            | TaskQError::Transport(TransportError::InvalidArgument(_))
            | TaskQError::InvalidDelay { .. }
            | TaskQError::UnknownPool(_)
            | TaskQError::Registry(_) => ErrorKind::Caller,
            TaskQError::Transport(_) => ErrorKind::QueueUnavailable,
            TaskQError::Codec(_) => ErrorKind::PoisonMessage,
        }
    }
}
