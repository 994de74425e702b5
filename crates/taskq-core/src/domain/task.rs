//! Task descriptor: the unit of work written to a queued pool.
//!
//! Work is described by data, not code: `handler` names a handler registered
//! ahead of time in the worker's [`TaskRegistry`](crate::typed::TaskRegistry),
//! and `args` / `kwargs` are the recorded arguments.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{CodecError, TaskFailure};
use crate::typed::Task;

/// Keyword arguments (keys are unique by construction).
pub type Kwargs = BTreeMap<String, Value>;

/// Immutable once written to the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub handler: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub kwargs: Kwargs,
}

impl TaskDescriptor {
    pub fn new(handler: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            args: Vec::new(),
            kwargs: Kwargs::new(),
        }
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a keyword argument (last write wins).
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Build a descriptor from a typed task: the task's fields become kwargs.
    pub fn from_task<T: Task>(task: &T) -> Result<Self, CodecError> {
        let value = serde_json::to_value(task).map_err(|e| CodecError::Encode(e.to_string()))?;
        let kwargs = match value {
            Value::Object(map) => map.into_iter().collect(),
            Value::Null => Kwargs::new(),
            other => {
                return Err(CodecError::Encode(format!(
                    "typed task '{}' must serialize to an object, got {other}",
                    T::NAME
                )));
            }
        };
        Ok(Self {
            handler: T::NAME.to_string(),
            args: Vec::new(),
            kwargs,
        })
    }

    /// Split off the arguments for invocation.
    pub fn into_call(self) -> (String, TaskCall) {
        (
            self.handler,
            TaskCall {
                args: self.args,
                kwargs: self.kwargs,
            },
        )
    }
}

/// Arguments handed to a handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskCall {
    pub args: Vec<Value>,
    pub kwargs: Kwargs,
}

impl TaskCall {
    /// Positional argument `index`, deserialized.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, TaskFailure> {
        let value = self
            .args
            .get(index)
            .ok_or_else(|| TaskFailure::new(format!("missing positional argument {index}")))?;
        serde_json::from_value(value.clone())
            .map_err(|e| TaskFailure::new(format!("argument {index}: {e}")))
    }

    /// Keyword argument `name`, deserialized.
    pub fn kwarg<T: DeserializeOwned>(&self, name: &str) -> Result<T, TaskFailure> {
        let value = self
            .kwargs
            .get(name)
            .ok_or_else(|| TaskFailure::new(format!("missing keyword argument '{name}'")))?;
        serde_json::from_value(value.clone())
            .map_err(|e| TaskFailure::new(format!("argument '{name}': {e}")))
    }

    /// Bind the whole call to a typed value.
    ///
    /// Positional args bind as a sequence (struct fields in declaration order),
    /// keyword args bind as a map. Mixing both is an argument mismatch.
    pub fn bind<T: DeserializeOwned>(self) -> Result<T, TaskFailure> {
        let value = match (self.args.is_empty(), self.kwargs.is_empty()) {
            (true, _) => Value::Object(self.kwargs.into_iter().collect()),
            (false, true) => Value::Array(self.args),
            (false, false) => {
                return Err(TaskFailure::new(
                    "argument mismatch: typed tasks take positional or keyword arguments, not both",
                ));
            }
        };
        serde_json::from_value(value).map_err(|e| TaskFailure::new(format!("argument mismatch: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Add {
        a: i64,
        b: i64,
    }

    impl Task for Add {
        const NAME: &'static str = "math.add";
    }

    #[test]
    fn builder_collects_args_and_kwargs() {
        let t = TaskDescriptor::new("add").arg(2).arg(3).kwarg("round", true);
        assert_eq!(t.args, vec![json!(2), json!(3)]);
        assert_eq!(t.kwargs.get("round"), Some(&json!(true)));
    }

    #[test]
    fn empty_collections_are_omitted_on_the_wire() {
        let s = serde_json::to_value(TaskDescriptor::new("noop")).unwrap();
        assert_eq!(s, json!({ "handler": "noop" }));
    }

    #[test]
    fn from_task_uses_fields_as_kwargs() {
        let t = TaskDescriptor::from_task(&Add { a: 1, b: 2 }).unwrap();
        assert_eq!(t.handler, "math.add");
        assert_eq!(t.kwargs.get("a"), Some(&json!(1)));
        assert!(t.args.is_empty());
    }

    #[test]
    fn bind_from_positional_and_keyword() {
        let (_, call) = TaskDescriptor::new("x").arg(2).arg(3).into_call();
        assert_eq!(call.bind::<Add>().unwrap(), Add { a: 2, b: 3 });

        let (_, call) = TaskDescriptor::new("x").kwarg("a", 4).kwarg("b", 5).into_call();
        assert_eq!(call.bind::<Add>().unwrap(), Add { a: 4, b: 5 });
    }

    #[test]
    fn bind_rejects_mixed_and_missing_arguments() {
        let (_, call) = TaskDescriptor::new("x").arg(2).kwarg("b", 3).into_call();
        let err = call.bind::<Add>().unwrap_err();
        assert!(err.message().contains("argument mismatch"));

        let (_, call) = TaskDescriptor::new("x").arg(2).into_call();
        assert!(call.bind::<Add>().is_err());
    }

    #[test]
    fn single_argument_accessors() {
        let (_, call) = TaskDescriptor::new("x").arg("hi").kwarg("n", 3).into_call();
        assert_eq!(call.arg::<String>(0).unwrap(), "hi");
        assert_eq!(call.kwarg::<u32>("n").unwrap(), 3);
        assert!(call.arg::<String>(1).is_err());
        assert!(call.kwarg::<u32>("missing").is_err());
    }
}
