//! Task trait - 型付き Task の定義
//!
//! # 学習ポイント
//! - Associated Constants (`const NAME`)
//! - Trait bounds の組み合わせ (Serialize + DeserializeOwned + Send + Sync + 'static)

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Task ties a handler name to an argument type.
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Resize {
///     image: String,
///     width: u32,
/// }
///
/// impl Task for Resize {
///     const NAME: &'static str = "media.resize.v1";
/// }
/// ```
///
/// The fields travel as kwargs when enqueued with
/// [`TaskDescriptor::from_task`](crate::domain::TaskDescriptor::from_task);
/// positional args bind to the fields in declaration order.
pub trait Task: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Handler name written into the task descriptor.
    ///
    /// # 命名規約
    /// - `{domain}.{action}.v{major}`
    /// - 例: `billing.charge.v1`
    const NAME: &'static str;
}
