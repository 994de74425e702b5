//! Runtime - task descriptor を registry の handler で実行
//!
//! Every way an invocation can go wrong (unknown handler, bad arguments,
//! handler error, handler panic) comes back as a [`TaskFailure`], so callers
//! only have one failure shape to classify.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;

use crate::domain::{TaskDescriptor, TaskFailure};
use crate::typed::TaskRegistry;

#[derive(Clone)]
pub struct Runtime {
    registry: Arc<TaskRegistry>,
}

impl Runtime {
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Execute one descriptor on the caller's task.
    pub async fn execute(&self, task: TaskDescriptor) -> Result<Value, TaskFailure> {
        let (name, call) = task.into_call();
        let handler = self
            .registry
            .get(&name)
            .ok_or_else(|| TaskFailure::new(format!("no handler registered for '{name}'")))?;

        AssertUnwindSafe(handler.invoke(call))
            .catch_unwind()
            .await
            .map_err(TaskFailure::from_panic)?
    }
}
