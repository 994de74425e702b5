//! taskq-core
//!
//! A worker pool over a managed at-least-once message queue. Producers
//! enqueue task descriptors into a queued pool, workers execute them and
//! route one outcome record per attempt into the completed or failed pool,
//! and drain loops hand those records to a caller-supplied callback.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（pool, ids, task, outcome, state, errors）
//! - **ports**: 抽象化レイヤー（QueueTransport, MessageCodec）
//! - **typed**: 型付き Task API（Task trait, Handler trait, TaskRegistry, JsonCodec）
//! - **app**: アプリケーションロジック（builder, producer, worker_loop, drain_loop, など）
//! - **impls**: 実装（InMemoryTransport など開発・テスト用）
//! - **config**: 設定（環境変数からの読み込みを含む）
//!
//! # Delivery contract
//! Every task runs at least once. A worker that dies (or fails to delete)
//! after writing an outcome leaves the task to run again, so outcome pools
//! may contain several records for one message id.

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod typed;

pub use app::{
    BuildError, DrainLoop, DrainStats, PoolCounts, TaskQ, TaskQBuilder, WorkerLoop, WorkerStats,
};
pub use config::{DrainConfig, TaskQConfig, WorkerConfig};
pub use domain::{
    ErrorKind, MessageId, OutcomeRecord, OutcomeStatus, PoolKind, PoolRef, TaskCall,
    TaskDescriptor, TaskFailure, TaskQError,
};
pub use impls::InMemoryTransport;
pub use typed::{Handler, JsonCodec, RegistryError, Task, TaskRegistry};
