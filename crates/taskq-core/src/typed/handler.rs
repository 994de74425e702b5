//! Handler trait - Task を実行する Handler の定義
//!
//! # 学習ポイント
//! - ジェネリック trait (Handler<T>)
//! - Object-safe trait (DynHandler)
//! - Type erasure パターン (TypedHandler<T, H> → DynHandler)
//! - Closure handlers (FnHandler / AsyncFnHandler) for untyped args

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::task::Task;
use crate::domain::{TaskCall, TaskFailure};

/// Handler executes a typed task and returns its result.
///
/// # 使用例
/// ```ignore
/// struct ResizeHandler;
///
/// #[async_trait]
/// impl Handler<Resize> for ResizeHandler {
///     type Output = String;
///
///     async fn handle(&self, task: Resize) -> Result<String, TaskFailure> {
///         Ok(format!("{}@{}", task.image, task.width))
///     }
/// }
/// ```
#[async_trait]
pub trait Handler<T: Task>: Send + Sync {
    type Output: Serialize + Send;

    async fn handle(&self, task: T) -> Result<Self::Output, TaskFailure>;
}

/// Object-safe handler: raw call in, JSON result out.
///
/// Every registered handler is stored as `Arc<dyn DynHandler>` keyed by
/// [`DynHandler::name`].
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn invoke(&self, call: TaskCall) -> Result<Value, TaskFailure>;

    fn name(&self) -> &str;
}

pub struct TypedHandler<T: Task, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Task, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Task, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    async fn invoke(&self, call: TaskCall) -> Result<Value, TaskFailure> {
        let task: T = call.bind()?;
        let output = self.handler.handle(task).await?;
        serde_json::to_value(output).map_err(|e| TaskFailure::new(format!("result encode: {e}")))
    }

    fn name(&self) -> &str {
        T::NAME
    }
}

/// Synchronous closure handler.
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(TaskCall) -> Result<Value, TaskFailure> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> DynHandler for FnHandler<F>
where
    F: Fn(TaskCall) -> Result<Value, TaskFailure> + Send + Sync,
{
    async fn invoke(&self, call: TaskCall) -> Result<Value, TaskFailure> {
        (self.f)(call)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Closure handler returning a future.
pub struct AsyncFnHandler<F> {
    name: String,
    f: F,
}

impl<F, Fut> AsyncFnHandler<F>
where
    F: Fn(TaskCall) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, TaskFailure>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> DynHandler for AsyncFnHandler<F>
where
    F: Fn(TaskCall) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, TaskFailure>> + Send + 'static,
{
    async fn invoke(&self, call: TaskCall) -> Result<Value, TaskFailure> {
        (self.f)(call).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
