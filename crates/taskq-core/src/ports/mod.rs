//! Ports - 外部コラボレータの抽象化
//!
//! - **QueueTransport**: the managed queue service
//! - **MessageCodec**: payload serialization
//!
//! Implementations live in `impls` (in-memory transport) and `typed::codec`
//! (JSON codec).

pub mod codec;
pub mod transport;

pub use codec::MessageCodec;
pub use transport::{
    MAX_DELAY_SECS, MAX_RECEIVE_BATCH, MAX_RECEIVE_WAIT, QueueHandle, QueueTransport,
    ReceivedMessage, check_delay,
};
