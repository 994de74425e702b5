//! TaskQBuilder - アプリケーションの構築とワイヤリング
//!
//! # 設計
//! - Builder パターンで transport / codec / handler を組み立てる
//! - 起動時検証（Fail-fast）: 期待される handler 名が全て登録済みか
//! - 構築後の [`TaskQ`] は registry を `Arc` で共有し、以後は不変
//!
//! # 使用例
//! ```ignore
//! let taskq = TaskQBuilder::new("reports")
//!     .transport(Arc::new(InMemoryTransport::new()))
//!     .register::<Resize, _>(ResizeHandler)?
//!     .expect_handlers(&[Resize::NAME])
//!     .build()?;
//!
//! taskq.enqueue_task(&Resize { width: 64 }, None, None).await?;
//! taskq.run(WorkerConfig::new().with_run_once(true)).await?;
//! ```

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;

use super::drain_loop::{DrainLoop, DrainStats};
use super::producer::Producer;
use super::queues::QueueRegistry;
use super::runtime::Runtime;
use super::status::PoolCounts;
use super::worker_loop::{WorkerLoop, WorkerStats};
use crate::config::{DrainConfig, TaskQConfig, WorkerConfig};
use crate::domain::{
    MessageId, OutcomeRecord, PoolRef, TaskCall, TaskDescriptor, TaskFailure, TaskQError, slugify,
};
use crate::ports::{MessageCodec, QueueTransport};
use crate::typed::{Handler, JsonCodec, RegistryError, Task, TaskRegistry};

/// Errors detected by [`TaskQBuilder::build`].
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing handlers: {0:?}. These handlers were expected but not registered.")]
    MissingHandlers(Vec<String>),

    #[error("No queue transport configured")]
    MissingTransport,

    #[error("Namespace '{0}' is empty once slugged")]
    EmptyNamespace(String),
}

pub struct TaskQBuilder {
    config: TaskQConfig,
    transport: Option<Arc<dyn QueueTransport>>,
    codec: Arc<dyn MessageCodec>,
    registry: TaskRegistry,
    expected_handlers: Option<Vec<String>>,
}

impl TaskQBuilder {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self::from_config(TaskQConfig::new(namespace))
    }

    pub fn from_config(config: TaskQConfig) -> Self {
        Self {
            config,
            transport: None,
            codec: Arc::new(JsonCodec::new()),
            registry: TaskRegistry::new(),
            expected_handlers: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn QueueTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace the default [`JsonCodec`].
    pub fn codec(mut self, codec: Arc<dyn MessageCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn visibility_timeout(mut self, timeout: Duration) -> Self {
        self.config.visibility_timeout = Some(timeout);
        self
    }

    pub fn register<T: Task, H: Handler<T> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register::<T, H>(handler)?;
        Ok(self)
    }

    pub fn register_fn<F>(mut self, name: impl Into<String>, f: F) -> Result<Self, RegistryError>
    where
        F: Fn(TaskCall) -> Result<Value, TaskFailure> + Send + Sync + 'static,
    {
        self.registry.register_fn(name, f)?;
        Ok(self)
    }

    pub fn register_async_fn<F, Fut>(
        mut self,
        name: impl Into<String>,
        f: F,
    ) -> Result<Self, RegistryError>
    where
        F: Fn(TaskCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, TaskFailure>> + Send + 'static,
    {
        self.registry.register_async_fn(name, f)?;
        Ok(self)
    }

    /// Handler names that must be registered for [`build`](Self::build) to
    /// succeed. A producer-only process can skip this.
    pub fn expect_handlers(mut self, names: &[&str]) -> Self {
        self.expected_handlers = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn build(self) -> Result<TaskQ, BuildError> {
        if slugify(&self.config.namespace).is_empty() {
            return Err(BuildError::EmptyNamespace(self.config.namespace));
        }
        let transport = self.transport.ok_or(BuildError::MissingTransport)?;

        if let Some(expected) = &self.expected_handlers {
            let missing: Vec<String> = expected
                .iter()
                .filter(|name| !self.registry.contains(name))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingHandlers(missing));
            }
        }

        let queues = Arc::new(QueueRegistry::new(
            &self.config.namespace,
            self.config.visibility_timeout,
            transport,
        ));
        let runtime = Runtime::new(Arc::new(self.registry));
        Ok(TaskQ {
            producer: Producer::new(queues.clone(), self.codec.clone()),
            queues,
            codec: self.codec,
            runtime,
        })
    }
}

/// Facade over one namespace: producer, worker and drain loops, and the admin
/// operations, all sharing one queue registry.
#[derive(Clone)]
pub struct TaskQ {
    queues: Arc<QueueRegistry>,
    codec: Arc<dyn MessageCodec>,
    runtime: Runtime,
    producer: Producer,
}

impl TaskQ {
    pub fn builder(namespace: impl Into<String>) -> TaskQBuilder {
        TaskQBuilder::new(namespace)
    }

    /// The slugged namespace.
    pub fn namespace(&self) -> &str {
        self.queues.namespace()
    }

    pub fn queue_name(&self, pool: &PoolRef) -> String {
        self.queues.queue_name(pool)
    }

    pub fn registry(&self) -> &TaskRegistry {
        self.runtime.registry()
    }

    pub fn queues(&self) -> &Arc<QueueRegistry> {
        &self.queues
    }

    // ---- producer ----

    pub async fn enqueue(
        &self,
        task: &TaskDescriptor,
        pool: Option<&str>,
        delay: Option<Duration>,
    ) -> Result<MessageId, TaskQError> {
        self.producer.enqueue(task, pool, delay).await
    }

    pub async fn enqueue_task<T: Task>(
        &self,
        task: &T,
        pool: Option<&str>,
        delay: Option<Duration>,
    ) -> Result<MessageId, TaskQError> {
        self.producer.enqueue_task(task, pool, delay).await
    }

    // ---- worker ----

    pub fn worker(&self, config: WorkerConfig) -> WorkerLoop {
        WorkerLoop::new(
            self.queues.clone(),
            self.codec.clone(),
            self.runtime.clone(),
            config,
        )
    }

    pub async fn run(&self, config: WorkerConfig) -> Result<WorkerStats, TaskQError> {
        self.worker(config).run().await
    }

    pub async fn run_until_shutdown(
        &self,
        config: WorkerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Result<WorkerStats, TaskQError> {
        self.worker(config).run_until_shutdown(shutdown).await
    }

    // ---- drain ----

    pub fn drain(&self, config: DrainConfig) -> DrainLoop {
        DrainLoop::new(self.queues.clone(), self.codec.clone(), config)
    }

    pub async fn process<F, E>(
        &self,
        pool: &PoolRef,
        callback: F,
        config: DrainConfig,
    ) -> Result<DrainStats, TaskQError>
    where
        F: FnMut(OutcomeRecord) -> Result<(), E>,
        E: Display,
    {
        self.drain(config).process(pool, callback).await
    }

    /// Drain the completed pool.
    pub async fn run_completed<F, E>(
        &self,
        callback: F,
        config: DrainConfig,
    ) -> Result<DrainStats, TaskQError>
    where
        F: FnMut(OutcomeRecord) -> Result<(), E>,
        E: Display,
    {
        self.process(&PoolRef::completed(), callback, config).await
    }

    /// Drain the failed pool.
    pub async fn run_failed<F, E>(
        &self,
        callback: F,
        config: DrainConfig,
    ) -> Result<DrainStats, TaskQError>
    where
        F: FnMut(OutcomeRecord) -> Result<(), E>,
        E: Display,
    {
        self.process(&PoolRef::failed(), callback, config).await
    }

    // ---- admin ----

    /// Remove every message of a resolved pool; the queue itself stays.
    /// Returns `false` for a pool this process never resolved.
    pub async fn purge(&self, pool: &PoolRef) -> Result<bool, TaskQError> {
        Ok(self.queues.purge(pool).await?)
    }

    pub async fn purge_all(&self) -> Result<usize, TaskQError> {
        Ok(self.queues.purge_all().await?)
    }

    /// Destroy the queue behind a resolved pool.
    pub async fn delete(&self, pool: &PoolRef) -> Result<bool, TaskQError> {
        Ok(self.queues.destroy(pool).await?)
    }

    pub async fn delete_all(&self) -> Result<usize, TaskQError> {
        Ok(self.queues.destroy_all().await?)
    }

    pub async fn counts(&self) -> Result<PoolCounts, TaskQError> {
        Ok(self.queues.counts().await?)
    }
}
