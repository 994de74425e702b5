//! Typed - 型付き Task API
//!
//! Handler names are strings on the wire; this module lets callers pair them
//! with argument types so a typo or a wrong argument shape is caught when the
//! handler is registered or bound, not discovered in the failed pool.
//!
//! # 二層構造
//! - **表層（Typed）**: `Task` trait, `Handler<T>` trait - 型安全
//! - **内部（Dyn）**: `DynHandler` trait - object-safe, type erasure

pub mod codec;
pub mod handler;
pub mod registry;
pub mod task;

pub use self::codec::JsonCodec;
pub use self::handler::{AsyncFnHandler, DynHandler, FnHandler, Handler, TypedHandler};
pub use self::registry::{RegistryError, TaskRegistry};
pub use self::task::Task;
