//! App - アプリケーション層
//!
//! ports を組み合わせてタスクのライフサイクルを実装する。
//!
//! # 主要コンポーネント
//! - **TaskQBuilder / TaskQ**: 構築とワイヤリング、facade
//! - **QueueRegistry**: pool → queue handle の解決とキャッシュ
//! - **Producer**: task descriptor の enqueue
//! - **Runtime**: handler の実行（panic も TaskFailure に変換）
//! - **WorkerLoop**: receive → execute → outcome write → delete
//! - **DrainLoop**: outcome pool → callback → delete
//! - **PoolCounts**: pool ごとのメッセージ数

pub mod builder;
pub mod drain_loop;
pub mod producer;
pub mod queues;
pub mod runtime;
pub mod status;
pub mod worker_loop;

pub use self::builder::{BuildError, TaskQ, TaskQBuilder};
pub use self::drain_loop::{DrainLoop, DrainStats};
pub use self::producer::Producer;
pub use self::queues::QueueRegistry;
pub use self::runtime::Runtime;
pub use self::status::PoolCounts;
pub use self::worker_loop::{WorkerLoop, WorkerStats};
