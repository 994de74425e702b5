//! Producer - task descriptor を queued pool に書き込む

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::queues::QueueRegistry;
use crate::domain::{MessageId, PoolRef, TaskDescriptor, TaskQError};
use crate::ports::{MessageCodec, check_delay};
use crate::typed::Task;

/// Writes task descriptors; keeps no state beyond the shared registry.
#[derive(Clone)]
pub struct Producer {
    queues: Arc<QueueRegistry>,
    codec: Arc<dyn MessageCodec>,
}

impl Producer {
    pub fn new(queues: Arc<QueueRegistry>, codec: Arc<dyn MessageCodec>) -> Self {
        Self { queues, codec }
    }

    /// Enqueue `task` on the default queued pool or sub-pool `pool`, delayed
    /// by `delay` (whole seconds, 0..=900). Returns the transport-assigned
    /// message id.
    ///
    /// An out-of-range or fractional delay fails before anything touches the
    /// transport.
    pub async fn enqueue(
        &self,
        task: &TaskDescriptor,
        pool: Option<&str>,
        delay: Option<Duration>,
    ) -> Result<MessageId, TaskQError> {
        if let Some(delay) = delay
            && check_delay(delay).is_err()
        {
            return Err(TaskQError::InvalidDelay { delay });
        }

        let pool = PoolRef::queued_opt(pool);
        let body = self.codec.encode_task(task)?;
        let id = self.queues.send(&pool, body, delay).await?;
        info!(
            message_id = %id,
            pool = %pool,
            handler = %task.handler,
            delay_secs = delay.map(|d| d.as_secs()),
            "enqueued task"
        );
        Ok(id)
    }

    /// Enqueue a typed task; its fields travel as kwargs.
    pub async fn enqueue_task<T: Task>(
        &self,
        task: &T,
        pool: Option<&str>,
        delay: Option<Duration>,
    ) -> Result<MessageId, TaskQError> {
        let descriptor = TaskDescriptor::from_task(task)?;
        self.enqueue(&descriptor, pool, delay).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;
    use crate::impls::InMemoryTransport;
    use crate::ports::QueueTransport;
    use crate::typed::JsonCodec;
    use crate::typed::handler::test_support::AddTask;

    fn producer(transport: Arc<InMemoryTransport>) -> Producer {
        let queues = Arc::new(QueueRegistry::new("jobs", None, transport));
        Producer::new(queues, Arc::new(JsonCodec::new()))
    }

    #[tokio::test]
    async fn enqueue_writes_to_default_and_sub_pools() {
        let transport = Arc::new(InMemoryTransport::new());
        let p = producer(transport.clone());

        p.enqueue(&TaskDescriptor::new("a"), None, None).await.unwrap();
        p.enqueue(&TaskDescriptor::new("b"), Some("fast"), None)
            .await
            .unwrap();

        assert_eq!(transport.total_count("jobs-QUEUED").await, 1);
        assert_eq!(transport.total_count("jobs-QUEUED-FAST").await, 1);
    }

    #[tokio::test]
    async fn out_of_range_delay_is_a_caller_error() {
        let transport = Arc::new(InMemoryTransport::new());
        let p = producer(transport.clone());

        let err = p
            .enqueue(&TaskDescriptor::new("a"), None, Some(Duration::from_secs(901)))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskQError::InvalidDelay { delay } if delay == Duration::from_secs(901)));
        assert_eq!(err.kind(), ErrorKind::Caller);
        // nothing was resolved or written
        assert!(transport.queue_names().await.is_empty());
    }

    #[tokio::test]
    async fn fractional_delay_is_reported_as_given() {
        let transport = Arc::new(InMemoryTransport::new());
        let p = producer(transport.clone());

        let delay = Duration::from_millis(900_500);
        let err = p
            .enqueue(&TaskDescriptor::new("a"), None, Some(delay))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("900.5s"), "{err}");

        let err = p
            .enqueue(&TaskDescriptor::new("a"), None, Some(Duration::from_millis(1_500)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Caller);
        assert!(transport.queue_names().await.is_empty());
    }

    #[tokio::test]
    async fn transport_failure_is_surfaced() {
        let transport = Arc::new(InMemoryTransport::new());
        let p = producer(transport.clone());
        transport.set_unavailable(true);

        let err = p.enqueue(&TaskDescriptor::new("a"), None, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QueueUnavailable);
    }

    #[tokio::test]
    async fn typed_enqueue_uses_task_name() {
        let transport = Arc::new(InMemoryTransport::new());
        let p = producer(transport.clone());
        p.enqueue_task(&AddTask { a: 1, b: 2 }, None, None)
            .await
            .unwrap();

        let q = transport.create_or_get("jobs-QUEUED", None).await.unwrap();
        let batch = transport.receive(&q, 1, Duration::ZERO).await.unwrap();
        let task: TaskDescriptor = serde_json::from_slice(&batch[0].body).unwrap();
        assert_eq!(task.handler, AddTask::NAME);
    }
}
