//! QueueRegistry - pool 名から transport の queue handle への解決
//!
//! # 設計
//! - pool → queue name は決定的（`domain::pool` の命名規約）
//! - 初回 resolve で create_or_get、以後はキャッシュ（プロセス寿命）
//! - キャッシュは registry インスタンスが所有し、tokio Mutex で保護
//!
//! Admin operations (purge / destroy) only see pools this instance has
//! resolved. Queues that exist remotely but were never resolved here are not
//! enumerated.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::status::PoolCounts;
use crate::domain::{MessageId, PoolRef, TransportError, slugify};
use crate::ports::{QueueHandle, QueueTransport, ReceivedMessage};

pub struct QueueRegistry {
    namespace: String,
    visibility_timeout: Option<Duration>,
    transport: Arc<dyn QueueTransport>,
    handles: Mutex<HashMap<PoolRef, QueueHandle>>,
}

impl QueueRegistry {
    /// `namespace` is slugged here; pass the human-readable name.
    pub fn new(
        namespace: &str,
        visibility_timeout: Option<Duration>,
        transport: Arc<dyn QueueTransport>,
    ) -> Self {
        Self {
            namespace: slugify(namespace),
            visibility_timeout,
            transport,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// The slugged namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn queue_name(&self, pool: &PoolRef) -> String {
        pool.queue_name(&self.namespace)
    }

    pub fn transport(&self) -> &Arc<dyn QueueTransport> {
        &self.transport
    }

    /// Resolve `pool` to a handle, creating the queue on first use.
    ///
    /// A failed lookup / creation is not cached; the next call tries again.
    pub async fn resolve(&self, pool: &PoolRef) -> Result<QueueHandle, TransportError> {
        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.get(pool) {
            return Ok(handle.clone());
        }
        let name = self.queue_name(pool);
        let handle = self
            .transport
            .create_or_get(&name, self.visibility_timeout)
            .await?;
        debug!(pool = %pool, queue = %name, "resolved queue");
        handles.insert(pool.clone(), handle.clone());
        Ok(handle)
    }

    /// Cached handle, without touching the transport.
    pub async fn cached(&self, pool: &PoolRef) -> Option<QueueHandle> {
        self.handles.lock().await.get(pool).cloned()
    }

    /// Every pool resolved so far, sorted by pool.
    pub async fn resolved(&self) -> Vec<(PoolRef, QueueHandle)> {
        let handles = self.handles.lock().await;
        let mut all: Vec<(PoolRef, QueueHandle)> =
            handles.iter().map(|(p, h)| (p.clone(), h.clone())).collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub async fn send(
        &self,
        pool: &PoolRef,
        body: Vec<u8>,
        delay: Option<Duration>,
    ) -> Result<MessageId, TransportError> {
        let handle = self.resolve(pool).await?;
        self.transport.send(&handle, body, delay).await
    }

    pub async fn receive(
        &self,
        pool: &PoolRef,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, TransportError> {
        let handle = self.resolve(pool).await?;
        self.transport.receive(&handle, max_messages, wait).await
    }

    pub async fn delete_message(
        &self,
        pool: &PoolRef,
        message_id: &MessageId,
    ) -> Result<(), TransportError> {
        let handle = self.resolve(pool).await?;
        self.transport.delete(&handle, message_id).await
    }

    /// Purge a resolved pool. Returns `false` (and does nothing) if the pool
    /// was never resolved by this instance.
    pub async fn purge(&self, pool: &PoolRef) -> Result<bool, TransportError> {
        let Some(handle) = self.cached(pool).await else {
            return Ok(false);
        };
        self.transport.purge(&handle).await?;
        info!(queue = %handle.name(), "purged queue");
        Ok(true)
    }

    /// Purge every resolved pool; returns how many were purged.
    pub async fn purge_all(&self) -> Result<usize, TransportError> {
        let resolved = self.resolved().await;
        for (_, handle) in &resolved {
            self.transport.purge(handle).await?;
            info!(queue = %handle.name(), "purged queue");
        }
        Ok(resolved.len())
    }

    /// Destroy a resolved pool's queue and forget its handle, so a later
    /// resolve creates it again.
    pub async fn destroy(&self, pool: &PoolRef) -> Result<bool, TransportError> {
        let mut handles = self.handles.lock().await;
        let Some(handle) = handles.get(pool).cloned() else {
            return Ok(false);
        };
        self.transport.destroy(&handle).await?;
        handles.remove(pool);
        info!(queue = %handle.name(), "destroyed queue");
        Ok(true)
    }

    /// Destroy every resolved pool; returns how many were destroyed.
    pub async fn destroy_all(&self) -> Result<usize, TransportError> {
        let mut handles = self.handles.lock().await;
        let mut pools: Vec<PoolRef> = handles.keys().cloned().collect();
        pools.sort();
        let mut destroyed = 0;
        for pool in pools {
            if let Some(handle) = handles.get(&pool).cloned() {
                self.transport.destroy(&handle).await?;
                handles.remove(&pool);
                info!(queue = %handle.name(), "destroyed queue");
                destroyed += 1;
            }
        }
        Ok(destroyed)
    }

    /// Approximate visible message counts of the resolved pools.
    pub async fn counts(&self) -> Result<PoolCounts, TransportError> {
        let mut counts = PoolCounts::default();
        for (pool, handle) in self.resolved().await {
            let n = self.transport.approximate_count(&handle).await?;
            counts.insert(&pool, n);
        }
        Ok(counts)
    }
}
