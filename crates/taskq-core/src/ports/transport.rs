//! QueueTransport port - managed at-least-once queue service
//!
//! The transport is an external collaborator (SQS or similar). This crate
//! only relies on the semantics below:
//! - at-least-once delivery, no ordering
//! - a received message is hidden for the queue's visibility timeout and
//!   becomes receivable again unless deleted before it expires
//! - per-message delivery delay in `0..=MAX_DELAY_SECS` seconds
//! - long-poll receive (blocks up to `wait` for at least one message)

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{MessageId, TransportError};

/// Longest delivery delay a transport accepts.
pub const MAX_DELAY_SECS: u64 = 900;

/// Largest batch a single receive may return.
pub const MAX_RECEIVE_BATCH: usize = 10;

/// Longest long-poll wait a single receive may request.
pub const MAX_RECEIVE_WAIT: Duration = Duration::from_secs(20);

/// A transport queue, as returned by [`QueueTransport::create_or_get`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueHandle {
    name: String,
    locator: String,
}

impl QueueHandle {
    pub fn new(name: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
        }
    }

    /// Transport-level queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Transport-specific address (URL, ARN, ...).
    pub fn locator(&self) -> &str {
        &self.locator
    }
}

/// One delivery of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub id: MessageId,
    pub body: Vec<u8>,
    /// How many times this message has been delivered, this one included.
    pub receive_count: u32,
}

/// Validate a delivery delay against the transport range. Transports take
/// delays in whole seconds, so a fractional delay is rejected rather than
/// truncated.
pub fn check_delay(delay: Duration) -> Result<(), TransportError> {
    if delay > Duration::from_secs(MAX_DELAY_SECS) || delay.subsec_nanos() != 0 {
        return Err(TransportError::InvalidDelay { delay });
    }
    Ok(())
}

#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Look up `name`, creating it with `visibility_timeout` (or the
    /// transport default) if it does not exist.
    async fn create_or_get(
        &self,
        name: &str,
        visibility_timeout: Option<Duration>,
    ) -> Result<QueueHandle, TransportError>;

    async fn send(
        &self,
        queue: &QueueHandle,
        body: Vec<u8>,
        delay: Option<Duration>,
    ) -> Result<MessageId, TransportError>;

    /// Receive up to `max_messages`, waiting up to `wait` for the first one.
    /// An empty result after the wait is not an error.
    async fn receive(
        &self,
        queue: &QueueHandle,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, TransportError>;

    async fn delete(&self, queue: &QueueHandle, message_id: &MessageId)
    -> Result<(), TransportError>;

    /// Remove every message, keep the queue.
    async fn purge(&self, queue: &QueueHandle) -> Result<(), TransportError>;

    /// Remove the queue itself.
    async fn destroy(&self, queue: &QueueHandle) -> Result<(), TransportError>;

    /// Approximate number of currently visible messages.
    async fn approximate_count(&self, queue: &QueueHandle) -> Result<usize, TransportError>;
}
