//! WorkerLoop - タスク実行ループ
//!
//! # フロー（1 iteration）
//! 1. queued pool から最大 `batch_size` 件を receive（`poll_wait` まで long-poll）
//! 2. 各メッセージを decode → handler 実行（同期的に、このループ上で）
//! 3. completed / failed の outcome record を書き込む
//! 4. 元メッセージを delete（成功・失敗どちらでも）
//! 5. `run_once` なら終了、そうでなければ `pause` 眠って繰り返す
//!
//! # Failure isolation
//! A bad message (undecodable payload, unknown handler, argument mismatch,
//! handler error or panic) becomes a failed outcome and is deleted like any
//! other; it never stops its siblings or the loop. Only transport errors
//! (receive, outcome write, delete) propagate out of [`WorkerLoop::run`].
//!
//! # At-least-once gap
//! Step 3 and step 4 are not atomic. If the worker dies, or the delete fails,
//! after the outcome write, the message reappears after its visibility
//! timeout, runs again and produces a second outcome record. Consumers of the
//! outcome pools must tolerate duplicates.

use std::ops::AddAssign;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use super::queues::QueueRegistry;
use super::runtime::Runtime;
use crate::config::WorkerConfig;
use crate::domain::{AttemptState, OutcomeRecord, PoolRef, TaskFailure, TaskQError};
use crate::ports::{MessageCodec, ReceivedMessage};

/// Counters for one or more iterations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub iterations: usize,
    pub fetched: usize,
    pub completed: usize,
    pub failed: usize,
    /// Failed attempts not written because `write_failed` is off.
    pub failures_dropped: usize,
    pub acknowledged: usize,
}

impl AddAssign for WorkerStats {
    fn add_assign(&mut self, rhs: Self) {
        self.iterations += rhs.iterations;
        self.fetched += rhs.fetched;
        self.completed += rhs.completed;
        self.failed += rhs.failed;
        self.failures_dropped += rhs.failures_dropped;
        self.acknowledged += rhs.acknowledged;
    }
}

pub struct WorkerLoop {
    queues: Arc<QueueRegistry>,
    codec: Arc<dyn MessageCodec>,
    runtime: Runtime,
    config: WorkerConfig,
    pool: PoolRef,
}

impl WorkerLoop {
    pub fn new(
        queues: Arc<QueueRegistry>,
        codec: Arc<dyn MessageCodec>,
        runtime: Runtime,
        config: WorkerConfig,
    ) -> Self {
        let config = config.normalized();
        let pool = PoolRef::queued_opt(config.pool.as_deref());
        Self {
            queues,
            codec,
            runtime,
            config,
            pool,
        }
    }

    /// The queued pool this worker consumes.
    pub fn pool(&self) -> &PoolRef {
        &self.pool
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run until `run_once` ends it or a transport error escapes.
    ///
    /// Without `run_once` this only returns on error; use
    /// [`run_until_shutdown`](Self::run_until_shutdown) for a clean stop.
    #[instrument(skip(self), fields(pool = %self.pool))]
    pub async fn run(&self) -> Result<WorkerStats, TaskQError> {
        info!(run_once = self.config.run_once, "worker loop starting");
        let mut total = WorkerStats::default();
        loop {
            total += self.run_iteration().await?;
            if self.config.run_once {
                break;
            }
            tokio::time::sleep(self.config.pause).await;
        }
        info!(?total, "worker loop finished");
        Ok(total)
    }

    /// Like [`run`](Self::run), but also stops when `shutdown` turns `true`.
    ///
    /// Shutdown is only observed between iterations and during the pause; an
    /// in-flight batch always finishes (outcome written, message deleted).
    #[instrument(skip(self, shutdown), fields(pool = %self.pool))]
    pub async fn run_until_shutdown(
        &self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<WorkerStats, TaskQError> {
        info!("worker loop starting");
        let mut total = WorkerStats::default();
        loop {
            if *shutdown.borrow() {
                info!("shutdown requested");
                break;
            }
            total += self.run_iteration().await?;
            if self.config.run_once {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    // sender dropped → treat as shutdown
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.pause) => {}
            }
        }
        info!(?total, "worker loop finished");
        Ok(total)
    }

    /// One fetch and the processing of everything it returned.
    pub async fn run_iteration(&self) -> Result<WorkerStats, TaskQError> {
        let mut stats = WorkerStats {
            iterations: 1,
            ..WorkerStats::default()
        };
        let messages = self
            .queues
            .receive(&self.pool, self.config.batch_size, self.config.poll_wait)
            .await?;
        debug!(count = messages.len(), "fetched batch");

        for message in messages {
            stats.fetched += 1;
            self.process_message(message, &mut stats).await?;
        }
        Ok(stats)
    }

    async fn process_message(
        &self,
        message: ReceivedMessage,
        stats: &mut WorkerStats,
    ) -> Result<(), TaskQError> {
        let queue_name = self.queues.queue_name(&self.pool);
        let mut state = AttemptState::Fetched;
        if message.receive_count > 1 {
            warn!(
                message_id = %message.id,
                receive_count = message.receive_count,
                "redelivered message; a previous attempt may already have an outcome record"
            );
        }

        state = state.advance(AttemptState::Executing);
        let (task, result) = match self.codec.decode_task(&message.body) {
            Ok(task) => {
                let result = self.runtime.execute(task.clone()).await;
                (Some(task), result)
            }
            Err(e) => (None, Err(TaskFailure::from(e))),
        };

        let record = match result {
            Ok(value) => {
                stats.completed += 1;
                OutcomeRecord::completed(message.id.clone(), &queue_name, task, value)
            }
            Err(failure) => {
                stats.failed += 1;
                error!(
                    message_id = %message.id,
                    handler = task.as_ref().map(|t| t.handler.as_str()),
                    error = %failure,
                    "Failed running task"
                );
                OutcomeRecord::failed(message.id.clone(), &queue_name, task, &failure)
            }
        };
        state = state.advance(record.status().into());

        if record.is_completed() || self.config.write_failed {
            let body = self.codec.encode_outcome(&record)?;
            self.queues
                .send(&record.status().pool(), body, None)
                .await?;
        } else {
            stats.failures_dropped += 1;
            debug!(message_id = %message.id, "failed outcome not written (write_failed disabled)");
        }

        self.queues.delete_message(&self.pool, &message.id).await?;
        state = state.advance(AttemptState::Acknowledged);
        stats.acknowledged += 1;
        debug!(message_id = %message.id, ?state, status = ?record.status(), "message acknowledged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OutcomeStatus, TaskCall, TaskDescriptor};
    use crate::impls::InMemoryTransport;
    use crate::typed::handler::test_support::{AddHandler, AddTask};
    use crate::typed::{JsonCodec, Task, TaskRegistry};
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        transport: Arc<InMemoryTransport>,
        queues: Arc<QueueRegistry>,
        codec: Arc<dyn MessageCodec>,
        runtime: Runtime,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(InMemoryTransport::with_visibility_timeout(Duration::from_secs(30)));
        let queues = Arc::new(QueueRegistry::new("jobs", None, transport.clone()));
        let mut reg = TaskRegistry::new();
        reg.register::<AddTask, _>(AddHandler).unwrap();
        reg.register_fn("add", |call: TaskCall| {
            Ok(json!(call.arg::<i64>(0)? + call.arg::<i64>(1)?))
        })
        .unwrap();
        reg.register_fn("boom", |_| Err(TaskFailure::new("boom")))
            .unwrap();
        Fixture {
            transport,
            queues,
            codec: Arc::new(JsonCodec::new()),
            runtime: Runtime::new(Arc::new(reg)),
        }
    }

    impl Fixture {
        fn worker(&self, config: WorkerConfig) -> WorkerLoop {
            WorkerLoop::new(
                self.queues.clone(),
                self.codec.clone(),
                self.runtime.clone(),
                config,
            )
        }

        async fn push(&self, task: &TaskDescriptor) {
            let body = self.codec.encode_task(task).unwrap();
            self.queues.send(&PoolRef::queued(), body, None).await.unwrap();
        }

        async fn push_raw(&self, body: &[u8]) {
            self.queues
                .send(&PoolRef::queued(), body.to_vec(), None)
                .await
                .unwrap();
        }

        async fn outcomes(&self, pool: PoolRef) -> Vec<OutcomeRecord> {
            let batch = self.queues.receive(&pool, 10, Duration::ZERO).await.unwrap();
            batch
                .iter()
                .map(|m| self.codec.decode_outcome(&m.body).unwrap())
                .collect()
        }
    }

    fn once() -> WorkerConfig {
        WorkerConfig::new()
            .with_run_once(true)
            .with_poll_wait(Duration::ZERO)
    }

    #[tokio::test(start_paused = true)]
    async fn mixed_batch_is_isolated_per_message() {
        let f = fixture();
        f.push(&TaskDescriptor::new("add").arg(2).arg(3)).await;
        f.push(&TaskDescriptor::new("boom")).await;
        f.push_raw(b"not json at all").await;
        f.push(&TaskDescriptor::new("nobody")).await;
        f.push(&TaskDescriptor::new(AddTask::NAME).kwarg("a", 1).kwarg("b", 1))
            .await;

        let stats = f.worker(once()).run().await.unwrap();
        assert_eq!(stats.fetched, 5);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.acknowledged, 5);
        assert_eq!(f.transport.total_count("jobs-QUEUED").await, 0);

        let completed = f.outcomes(PoolRef::completed()).await;
        assert_eq!(completed.len(), 2);
        assert!(completed.iter().all(|r| r.status() == OutcomeStatus::Completed));

        let failed = f.outcomes(PoolRef::failed()).await;
        assert_eq!(failed.len(), 3);
        let messages: Vec<&str> = failed.iter().filter_map(|r| r.error_message()).collect();
        assert!(messages.iter().any(|m| m.contains("boom")));
        assert!(messages.iter().any(|m| m.starts_with("decode:")));
        assert!(messages.iter().any(|m| m.contains("no handler registered for 'nobody'")));
    }

    #[tokio::test(start_paused = true)]
    async fn outcome_record_traces_source() {
        let f = fixture();
        f.push(&TaskDescriptor::new("add").arg(2).arg(3)).await;
        f.worker(once()).run().await.unwrap();

        let record = &f.outcomes(PoolRef::completed()).await[0];
        assert_eq!(record.queue_name(), "jobs-QUEUED");
        assert_eq!(record.result(), Some(&json!(5)));
        assert_eq!(record.task().map(|t| t.handler.as_str()), Some("add"));
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_failure_write_drops_failed_outcomes() {
        let f = fixture();
        f.push(&TaskDescriptor::new("boom")).await;

        let stats = f
            .worker(once().with_write_failed(false))
            .run()
            .await
            .unwrap();
        assert_eq!(stats.failures_dropped, 1);
        assert_eq!(stats.acknowledged, 1);
        assert_eq!(f.transport.total_count("jobs-QUEUED").await, 0);
        assert_eq!(f.transport.total_count("jobs-FAILED").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sub_pool_worker_only_sees_its_pool() {
        let f = fixture();
        f.push(&TaskDescriptor::new("add").arg(1).arg(1)).await;
        let body = f.codec.encode_task(&TaskDescriptor::new("add").arg(5).arg(5)).unwrap();
        f.queues
            .send(&PoolRef::queued_sub("fast"), body, None)
            .await
            .unwrap();

        let stats = f.worker(once().with_pool("fast")).run().await.unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(f.transport.total_count("jobs-QUEUED").await, 1);

        let record = &f.outcomes(PoolRef::completed()).await[0];
        assert_eq!(record.queue_name(), "jobs-QUEUED-FAST");
        assert_eq!(record.result(), Some(&json!(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn run_once_processes_a_single_fetch() {
        let f = fixture();
        for i in 0..3 {
            f.push(&TaskDescriptor::new("add").arg(i).arg(0)).await;
        }
        let stats = f
            .worker(once().with_batch_size(2))
            .run()
            .await
            .unwrap();
        assert_eq!(stats.iterations, 1);
        assert_eq!(stats.fetched, 2);
        assert_eq!(f.transport.total_count("jobs-QUEUED").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deserialized_oversized_batch_is_clamped() {
        let f = fixture();
        for i in 0..12 {
            f.push(&TaskDescriptor::new("add").arg(i).arg(1)).await;
        }
        let config: WorkerConfig = serde_json::from_value(json!({
            "pool": null,
            "batch_size": 50,
            "poll_wait": 0,
            "pause": 0,
            "run_once": true,
            "write_failed": true
        }))
        .unwrap();

        let worker = f.worker(config);
        assert_eq!(worker.config().batch_size, 10);
        let stats = worker.run().await.unwrap();
        assert_eq!(stats.fetched, 10);
        assert_eq!(stats.completed, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn run_once_on_empty_queue_returns_after_poll_wait() {
        let f = fixture();
        let stats = f
            .worker(
                WorkerConfig::new()
                    .with_run_once(true)
                    .with_poll_wait(Duration::from_secs(20)),
            )
            .run()
            .await
            .unwrap();
        assert_eq!(stats, WorkerStats { iterations: 1, ..Default::default() });
    }

    #[tokio::test(start_paused = true)]
    async fn transport_outage_propagates() {
        let f = fixture();
        f.push(&TaskDescriptor::new("add").arg(1).arg(2)).await;
        f.transport.set_unavailable(true);

        let err = f.worker(once()).run().await.unwrap_err();
        assert_eq!(err.kind(), crate::domain::ErrorKind::QueueUnavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_a_continuous_worker() {
        let f = fixture();
        f.push(&TaskDescriptor::new("add").arg(1).arg(2)).await;
        let worker = f.worker(
            WorkerConfig::new()
                .with_poll_wait(Duration::from_secs(1))
                .with_pause(Duration::from_secs(5)),
        );
        let (tx, rx) = watch::channel(false);

        let stopper = async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            tx.send(true).unwrap();
        };
        let (result, ()) = tokio::join!(worker.run_until_shutdown(rx), stopper);
        let stats = result.unwrap();
        assert!(stats.iterations >= 2);
        assert_eq!(stats.completed, 1);
    }
}
