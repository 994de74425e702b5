//! JsonCodec - task descriptor / outcome record と bytes の相互変換
//!
//! JSON keeps payloads readable in the queue console and round-trips nested
//! argument values unchanged.

use crate::domain::{CodecError, OutcomeRecord, TaskDescriptor};
use crate::ports::MessageCodec;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }
}

impl MessageCodec for JsonCodec {
    fn encode_task(&self, task: &TaskDescriptor) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(task).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode_task(&self, bytes: &[u8]) -> Result<TaskDescriptor, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn encode_outcome(&self, record: &OutcomeRecord) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(record).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode_outcome(&self, bytes: &[u8]) -> Result<OutcomeRecord, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
