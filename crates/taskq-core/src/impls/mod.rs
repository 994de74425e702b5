//! Impls - 実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryTransport**: at-least-once semantics (visibility timeout,
//!   delay, long-poll) without a real queue service
//!
//! Production transports (SQS, ...) belong in their own crates and only need
//! to implement [`QueueTransport`](crate::ports::QueueTransport).

pub mod inmem_transport;

pub use self::inmem_transport::{DEFAULT_VISIBILITY_TIMEOUT, InMemoryTransport};
