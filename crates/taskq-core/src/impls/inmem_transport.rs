//! InMemoryTransport - 開発・テスト用の QueueTransport
//!
//! # 学習ポイント
//! - tokio::sync::Mutex + Notify による long-poll receive
//! - Notified::enable() で通知の取りこぼしを防ぐ
//! - tokio::time::Instant を使うので `start_paused` テストで時間を進められる
//!
//! Semantics follow a managed at-least-once queue: a received message stays on
//! the queue, hidden until its visibility timeout expires, and only `delete`
//! removes it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::domain::{MessageId, TransportError};
use crate::ports::{MAX_RECEIVE_BATCH, QueueHandle, QueueTransport, ReceivedMessage, check_delay};

/// Visibility timeout used when a queue is created without one.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

struct StoredMessage {
    id: MessageId,
    body: Vec<u8>,
    visible_at: Instant,
    receive_count: u32,
}

struct InMemoryQueueState {
    visibility_timeout: Duration,
    messages: Vec<StoredMessage>,
}

impl InMemoryQueueState {
    fn new(visibility_timeout: Duration) -> Self {
        Self {
            visibility_timeout,
            messages: Vec::new(),
        }
    }

    /// Hand out up to `max` visible messages and hide them.
    fn take_visible(&mut self, max: usize, now: Instant) -> Vec<ReceivedMessage> {
        let hidden_until = now + self.visibility_timeout;
        self.messages
            .iter_mut()
            .filter(|m| m.visible_at <= now)
            .take(max)
            .map(|m| {
                m.visible_at = hidden_until;
                m.receive_count += 1;
                ReceivedMessage {
                    id: m.id.clone(),
                    body: m.body.clone(),
                    receive_count: m.receive_count,
                }
            })
            .collect()
    }

    fn next_visible_at(&self) -> Option<Instant> {
        self.messages.iter().map(|m| m.visible_at).min()
    }

    fn visible_count(&self, now: Instant) -> usize {
        self.messages.iter().filter(|m| m.visible_at <= now).count()
    }
}

/// In-memory queue service.
///
/// # 使用例
/// ```ignore
/// let transport = Arc::new(InMemoryTransport::new());
/// let q = transport.create_or_get("ns-QUEUED", None).await?;
/// transport.send(&q, b"hello".to_vec(), None).await?;
/// let batch = transport.receive(&q, 5, Duration::from_secs(1)).await?;
/// ```
pub struct InMemoryTransport {
    queues: Mutex<HashMap<String, InMemoryQueueState>>,
    notify: Notify,
    default_visibility_timeout: Duration,
    unavailable: AtomicBool,
    failing_deletes: AtomicBool,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::with_visibility_timeout(DEFAULT_VISIBILITY_TIMEOUT)
    }

    pub fn with_visibility_timeout(default_visibility_timeout: Duration) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            default_visibility_timeout,
            unavailable: AtomicBool::new(false),
            failing_deletes: AtomicBool::new(false),
        }
    }

    /// Simulate an outage: every operation fails with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Simulate a worker dying between outcome write and delete: message
    /// deletes fail while everything else keeps working.
    pub fn set_failing_deletes(&self, failing: bool) {
        self.failing_deletes.store(failing, Ordering::SeqCst);
    }

    /// Names of existing queues, sorted.
    pub async fn queue_names(&self) -> Vec<String> {
        let queues = self.queues.lock().await;
        let mut names: Vec<String> = queues.keys().cloned().collect();
        names.sort();
        names
    }

    /// Total number of messages on `name`, hidden ones included.
    pub async fn total_count(&self, name: &str) -> usize {
        let queues = self.queues.lock().await;
        queues.get(name).map_or(0, |q| q.messages.len())
    }

    fn check_available(&self) -> Result<(), TransportError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("in-memory transport is down".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(queue: &QueueHandle) -> TransportError {
    TransportError::QueueNotFound(queue.name().to_string())
}

#[async_trait]
impl QueueTransport for InMemoryTransport {
    async fn create_or_get(
        &self,
        name: &str,
        visibility_timeout: Option<Duration>,
    ) -> Result<QueueHandle, TransportError> {
        self.check_available()?;
        if name.is_empty() {
            return Err(TransportError::InvalidArgument("queue name must not be empty".into()));
        }
        let mut queues = self.queues.lock().await;
        queues.entry(name.to_string()).or_insert_with(|| {
            InMemoryQueueState::new(visibility_timeout.unwrap_or(self.default_visibility_timeout))
        });
        Ok(QueueHandle::new(name, format!("memory://{name}")))
    }

    async fn send(
        &self,
        queue: &QueueHandle,
        body: Vec<u8>,
        delay: Option<Duration>,
    ) -> Result<MessageId, TransportError> {
        self.check_available()?;
        let delay = delay.unwrap_or_default();
        check_delay(delay)?;

        let id = MessageId::generate();
        {
            let mut queues = self.queues.lock().await;
            let state = queues.get_mut(queue.name()).ok_or_else(|| not_found(queue))?;
            state.messages.push(StoredMessage {
                id: id.clone(),
                body,
                visible_at: Instant::now() + delay,
                receive_count: 0,
            });
        }
        // ロック解放後に通知
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn receive(
        &self,
        queue: &QueueHandle,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, TransportError> {
        self.check_available()?;
        if max_messages == 0 || max_messages > MAX_RECEIVE_BATCH {
            return Err(TransportError::InvalidArgument(format!(
                "max_messages must be within 1..={MAX_RECEIVE_BATCH}, got {max_messages}"
            )));
        }

        let deadline = Instant::now() + wait;
        loop {
            // 先に enable しておき、チェック後の send を取りこぼさない
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_visible = {
                let mut queues = self.queues.lock().await;
                let state = queues.get_mut(queue.name()).ok_or_else(|| not_found(queue))?;
                let now = Instant::now();
                let batch = state.take_visible(max_messages, now);
                if !batch.is_empty() {
                    return Ok(batch);
                }
                state.next_visible_at()
            };

            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            let wake_at = next_visible.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                _ = &mut notified => {},
                _ = tokio::time::sleep_until(wake_at) => {},
            }
        }
    }

    async fn delete(
        &self,
        queue: &QueueHandle,
        message_id: &MessageId,
    ) -> Result<(), TransportError> {
        self.check_available()?;
        if self.failing_deletes.load(Ordering::SeqCst) {
            return Err(TransportError::OperationFailed(format!(
                "delete of {message_id} failed"
            )));
        }
        let mut queues = self.queues.lock().await;
        let state = queues.get_mut(queue.name()).ok_or_else(|| not_found(queue))?;
        // Deleting an already deleted message is not an error.
        state.messages.retain(|m| &m.id != message_id);
        Ok(())
    }

    async fn purge(&self, queue: &QueueHandle) -> Result<(), TransportError> {
        self.check_available()?;
        let mut queues = self.queues.lock().await;
        let state = queues.get_mut(queue.name()).ok_or_else(|| not_found(queue))?;
        state.messages.clear();
        Ok(())
    }

    async fn destroy(&self, queue: &QueueHandle) -> Result<(), TransportError> {
        self.check_available()?;
        let mut queues = self.queues.lock().await;
        queues.remove(queue.name()).ok_or_else(|| not_found(queue))?;
        Ok(())
    }

    async fn approximate_count(&self, queue: &QueueHandle) -> Result<usize, TransportError> {
        self.check_available()?;
        let queues = self.queues.lock().await;
        let state = queues.get(queue.name()).ok_or_else(|| not_found(queue))?;
        Ok(state.visible_count(Instant::now()))
    }
}
