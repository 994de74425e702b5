//! MessageCodec port - payload (de)serialization
//!
//! Task descriptors and outcome records travel as bytes. Decode failures are
//! reported as [`CodecError`]; the worker turns them into failed outcomes.

use crate::domain::{CodecError, OutcomeRecord, TaskDescriptor};

pub trait MessageCodec: Send + Sync {
    fn encode_task(&self, task: &TaskDescriptor) -> Result<Vec<u8>, CodecError>;

    fn decode_task(&self, bytes: &[u8]) -> Result<TaskDescriptor, CodecError>;

    fn encode_outcome(&self, record: &OutcomeRecord) -> Result<Vec<u8>, CodecError>;

    fn decode_outcome(&self, bytes: &[u8]) -> Result<OutcomeRecord, CodecError>;
}
