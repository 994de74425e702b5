//! DrainLoop - outcome pool を読み出して callback に渡す
//!
//! # フロー（1 iteration）
//! 1. 指定 pool から最大 `batch_size` 件を receive
//! 2. 各メッセージを OutcomeRecord に decode し、callback を同期的に呼ぶ
//! 3. callback が `Ok` を返し、かつ `delete_on_consume` なら delete
//!
//! A callback error or an undecodable record leaves the message in place. It
//! reappears after the visibility timeout, which is the only retry mechanism.
//! Callbacks therefore see a record at least once, possibly more often.

use std::fmt::Display;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use super::queues::QueueRegistry;
use crate::config::DrainConfig;
use crate::domain::{OutcomeRecord, PoolRef, TaskQError};
use crate::ports::MessageCodec;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub iterations: usize,
    pub fetched: usize,
    /// Callback returned `Ok`.
    pub consumed: usize,
    /// Callback returned an error; message left for redelivery.
    pub rejected: usize,
    /// Payload was not an outcome record; message left for redelivery.
    pub undecodable: usize,
    pub deleted: usize,
}

impl std::ops::AddAssign for DrainStats {
    fn add_assign(&mut self, rhs: Self) {
        self.iterations += rhs.iterations;
        self.fetched += rhs.fetched;
        self.consumed += rhs.consumed;
        self.rejected += rhs.rejected;
        self.undecodable += rhs.undecodable;
        self.deleted += rhs.deleted;
    }
}

pub struct DrainLoop {
    queues: Arc<QueueRegistry>,
    codec: Arc<dyn MessageCodec>,
    config: DrainConfig,
}

impl DrainLoop {
    pub fn new(queues: Arc<QueueRegistry>, codec: Arc<dyn MessageCodec>, config: DrainConfig) -> Self {
        Self {
            queues,
            codec,
            config: config.normalized(),
        }
    }

    pub fn config(&self) -> &DrainConfig {
        &self.config
    }

    /// Drain `pool` into `callback` until `run_once` ends it or a transport
    /// error escapes.
    ///
    /// Usually `pool` is an outcome pool; any pool works as long as its
    /// payloads are outcome records.
    #[instrument(skip(self, pool, callback), fields(pool = %pool))]
    pub async fn process<F, E>(&self, pool: &PoolRef, mut callback: F) -> Result<DrainStats, TaskQError>
    where
        F: FnMut(OutcomeRecord) -> Result<(), E>,
        E: Display,
    {
        info!(run_once = self.config.run_once, "drain loop starting");
        let mut total = DrainStats::default();
        loop {
            total += self.run_iteration(pool, &mut callback).await?;
            if self.config.run_once {
                break;
            }
            tokio::time::sleep(self.config.pause).await;
        }
        info!(?total, "drain loop finished");
        Ok(total)
    }

    /// Like [`process`](Self::process), but also stops when `shutdown` turns
    /// `true`. Checked between iterations and during the pause.
    #[instrument(skip(self, pool, callback, shutdown), fields(pool = %pool))]
    pub async fn process_until_shutdown<F, E>(
        &self,
        pool: &PoolRef,
        mut callback: F,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<DrainStats, TaskQError>
    where
        F: FnMut(OutcomeRecord) -> Result<(), E>,
        E: Display,
    {
        info!("drain loop starting");
        let mut total = DrainStats::default();
        loop {
            if *shutdown.borrow() {
                info!("shutdown requested");
                break;
            }
            total += self.run_iteration(pool, &mut callback).await?;
            if self.config.run_once {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.pause) => {}
            }
        }
        info!(?total, "drain loop finished");
        Ok(total)
    }

    /// One fetch from `pool`, every returned record offered to `callback`.
    pub async fn run_iteration<F, E>(
        &self,
        pool: &PoolRef,
        callback: &mut F,
    ) -> Result<DrainStats, TaskQError>
    where
        F: FnMut(OutcomeRecord) -> Result<(), E>,
        E: Display,
    {
        let mut stats = DrainStats {
            iterations: 1,
            ..DrainStats::default()
        };
        let messages = self
            .queues
            .receive(pool, self.config.batch_size, self.config.poll_wait)
            .await?;
        debug!(count = messages.len(), "fetched batch");

        for message in messages {
            stats.fetched += 1;
            let record = match self.codec.decode_outcome(&message.body) {
                Ok(record) => record,
                Err(e) => {
                    stats.undecodable += 1;
                    error!(message_id = %message.id, error = %e, "undecodable outcome record left on queue");
                    continue;
                }
            };

            if let Err(e) = callback(record) {
                stats.rejected += 1;
                warn!(
                    message_id = %message.id,
                    receive_count = message.receive_count,
                    error = %e,
                    "drain callback failed; record left for redelivery"
                );
                continue;
            }
            stats.consumed += 1;

            if self.config.delete_on_consume {
                self.queues.delete_message(pool, &message.id).await?;
                stats.deleted += 1;
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageId, TaskDescriptor, TaskFailure};
    use crate::impls::InMemoryTransport;
    use crate::typed::JsonCodec;
    use serde_json::json;
    use std::time::Duration;

    fn setup() -> (Arc<InMemoryTransport>, Arc<QueueRegistry>, Arc<dyn MessageCodec>) {
        let transport = Arc::new(InMemoryTransport::with_visibility_timeout(Duration::from_secs(30)));
        let queues = Arc::new(QueueRegistry::new("jobs", None, transport.clone()));
        (transport, queues, Arc::new(JsonCodec::new()))
    }

    async fn write_completed(queues: &QueueRegistry, codec: &dyn MessageCodec, result: i64) {
        let record = OutcomeRecord::completed(
            MessageId::generate(),
            "jobs-QUEUED",
            Some(TaskDescriptor::new("add")),
            json!(result),
        );
        let body = codec.encode_outcome(&record).unwrap();
        queues.send(&PoolRef::completed(), body, None).await.unwrap();
    }

    fn once() -> DrainConfig {
        DrainConfig::new()
            .with_run_once(true)
            .with_poll_wait(Duration::ZERO)
    }

    #[tokio::test(start_paused = true)]
    async fn consumed_records_are_deleted() {
        let (transport, queues, codec) = setup();
        write_completed(&queues, codec.as_ref(), 1).await;
        write_completed(&queues, codec.as_ref(), 2).await;

        let mut seen = Vec::new();
        let stats = DrainLoop::new(queues, codec, once())
            .process(&PoolRef::completed(), |r: OutcomeRecord| {
                seen.push(r.result().cloned());
                Ok::<_, TaskFailure>(())
            })
            .await
            .unwrap();

        assert_eq!(stats.consumed, 2);
        assert_eq!(stats.deleted, 2);
        assert_eq!(seen.len(), 2);
        assert_eq!(transport.total_count("jobs-COMPLETED").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_record_is_redelivered_after_visibility_timeout() {
        let (transport, queues, codec) = setup();
        write_completed(&queues, codec.as_ref(), 5).await;
        let drain = DrainLoop::new(queues, codec, once());

        let stats = drain
            .process(&PoolRef::completed(), |_| Err("not now"))
            .await
            .unwrap();
        assert_eq!(stats.rejected, 1);
        assert_eq!(transport.total_count("jobs-COMPLETED").await, 1);

        // still invisible
        let stats = drain
            .process(&PoolRef::completed(), |_| Ok::<_, &str>(()))
            .await
            .unwrap();
        assert_eq!(stats.fetched, 0);

        tokio::time::advance(Duration::from_secs(31)).await;
        let mut results = Vec::new();
        let stats = drain
            .process(&PoolRef::completed(), |r| {
                results.push(r.result().cloned());
                Ok::<_, &str>(())
            })
            .await
            .unwrap();
        assert_eq!(stats.consumed, 1);
        assert_eq!(results, vec![Some(json!(5))]);
        assert_eq!(transport.total_count("jobs-COMPLETED").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_fields_are_clamped() {
        let (_transport, queues, codec) = setup();
        write_completed(&queues, codec.as_ref(), 1).await;
        let config = DrainConfig {
            batch_size: 0,
            poll_wait: Duration::from_secs(3600),
            run_once: true,
            ..DrainConfig::default()
        };

        let drain = DrainLoop::new(queues, codec, config);
        assert_eq!(drain.config().batch_size, 1);
        let stats = drain
            .process(&PoolRef::completed(), |_| Ok::<_, &str>(()))
            .await
            .unwrap();
        assert_eq!(stats.consumed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn keep_on_consume_leaves_messages() {
        let (transport, queues, codec) = setup();
        write_completed(&queues, codec.as_ref(), 1).await;

        let stats = DrainLoop::new(queues, codec, once().with_delete_on_consume(false))
            .process(&PoolRef::completed(), |_| Ok::<_, &str>(()))
            .await
            .unwrap();
        assert_eq!(stats.consumed, 1);
        assert_eq!(stats.deleted, 0);
        assert_eq!(transport.total_count("jobs-COMPLETED").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_record_is_skipped_and_kept() {
        let (transport, queues, codec) = setup();
        queues
            .send(&PoolRef::failed(), b"{\"garbage\":true}".to_vec(), None)
            .await
            .unwrap();

        let mut calls = 0;
        let stats = DrainLoop::new(queues, codec, once())
            .process(&PoolRef::failed(), |_| {
                calls += 1;
                Ok::<_, &str>(())
            })
            .await
            .unwrap();
        assert_eq!(calls, 0);
        assert_eq!(stats.undecodable, 1);
        assert_eq!(transport.total_count("jobs-FAILED").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn contradictory_record_is_treated_as_undecodable() {
        let (transport, queues, codec) = setup();
        let record = OutcomeRecord::completed(MessageId::generate(), "jobs-QUEUED", None, json!(1));
        let mut v = serde_json::to_value(&record).unwrap();
        v["error_message"] = json!("also failed?");
        queues
            .send(&PoolRef::completed(), serde_json::to_vec(&v).unwrap(), None)
            .await
            .unwrap();

        let mut calls = 0;
        let stats = DrainLoop::new(queues, codec, once())
            .process(&PoolRef::completed(), |_| {
                calls += 1;
                Ok::<_, &str>(())
            })
            .await
            .unwrap();
        assert_eq!(calls, 0);
        assert_eq!(stats.undecodable, 1);
        assert_eq!(transport.total_count("jobs-COMPLETED").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_a_continuous_drain() {
        let (_transport, queues, codec) = setup();
        write_completed(&queues, codec.as_ref(), 1).await;
        let drain = DrainLoop::new(
            queues,
            codec,
            DrainConfig::new().with_poll_wait(Duration::from_secs(1)),
        );
        let (tx, rx) = watch::channel(false);

        let pool = PoolRef::completed();
        let mut consumed = 0;
        let stopper = async {
            tokio::time::sleep(Duration::from_secs(20)).await;
            tx.send(true).unwrap();
        };
        let (result, ()) = tokio::join!(
            drain.process_until_shutdown(
                &pool,
                |_| {
                    consumed += 1;
                    Ok::<_, &str>(())
                },
                rx
            ),
            stopper
        );
        let stats = result.unwrap();
        assert!(stats.iterations >= 2);
        assert_eq!(consumed, 1);
    }
}
