//! Outcome record: what a worker writes to the completed / failed pool after
//! one execution attempt.
//!
//! One record per attempt, not per task: a redelivered task produces another
//! attempt and therefore another record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::errors::TaskFailure;
use super::ids::MessageId;
use super::pool::PoolRef;
use super::task::TaskDescriptor;

/// Terminal status of an attempt. There is no `pending` variant: the in-flight
/// state never leaves the worker (see [`AttemptState`](super::AttemptState)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Completed,
    Failed,
}

impl OutcomeStatus {
    /// The outcome pool records with this status are written to.
    pub fn pool(self) -> PoolRef {
        match self {
            OutcomeStatus::Completed => PoolRef::completed(),
            OutcomeStatus::Failed => PoolRef::failed(),
        }
    }
}

/// `result` is present iff `status = completed`, `error_message` iff
/// `status = failed`. The constructors are the only way to build one, and
/// decoding rejects records that break the pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawOutcomeRecord")]
pub struct OutcomeRecord {
    message_id: MessageId,
    queue_name: String,
    status: OutcomeStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,

    /// The descriptor that was executed, when the source message decoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    task: Option<TaskDescriptor>,

    created_at: DateTime<Utc>,
}

/// Wire shape before the status pairing is checked.
#[derive(Deserialize)]
struct RawOutcomeRecord {
    message_id: MessageId,
    queue_name: String,
    status: OutcomeStatus,
    #[serde(default, deserialize_with = "present_value")]
    result: Option<Value>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    task: Option<TaskDescriptor>,
    created_at: DateTime<Utc>,
}

/// A decoded record whose fields contradict its status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutcomeShapeError {
    #[error("completed record must carry a result and no error_message")]
    Completed,
    #[error("failed record must carry an error_message and no result")]
    Failed,
}

impl TryFrom<RawOutcomeRecord> for OutcomeRecord {
    type Error = OutcomeShapeError;

    fn try_from(raw: RawOutcomeRecord) -> Result<Self, Self::Error> {
        match (raw.status, &raw.result, &raw.error_message) {
            (OutcomeStatus::Completed, Some(_), None) | (OutcomeStatus::Failed, None, Some(_)) => {}
            (OutcomeStatus::Completed, ..) => return Err(OutcomeShapeError::Completed),
            (OutcomeStatus::Failed, ..) => return Err(OutcomeShapeError::Failed),
        }
        Ok(Self {
            message_id: raw.message_id,
            queue_name: raw.queue_name,
            status: raw.status,
            result: raw.result,
            error_message: raw.error_message,
            task: raw.task,
            created_at: raw.created_at,
        })
    }
}

impl OutcomeRecord {
    pub fn completed(
        message_id: MessageId,
        queue_name: impl Into<String>,
        task: Option<TaskDescriptor>,
        result: Value,
    ) -> Self {
        Self {
            message_id,
            queue_name: queue_name.into(),
            status: OutcomeStatus::Completed,
            result: Some(result),
            error_message: None,
            task,
            created_at: Utc::now(),
        }
    }

    pub fn failed(
        message_id: MessageId,
        queue_name: impl Into<String>,
        task: Option<TaskDescriptor>,
        failure: &TaskFailure,
    ) -> Self {
        Self {
            message_id,
            queue_name: queue_name.into(),
            status: OutcomeStatus::Failed,
            result: None,
            error_message: Some(failure.message().to_string()),
            task,
            created_at: Utc::now(),
        }
    }

    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    /// Transport name of the queued pool the task came from.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn status(&self) -> OutcomeStatus {
        self.status
    }

    pub fn is_completed(&self) -> bool {
        self.status == OutcomeStatus::Completed
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn task(&self) -> Option<&TaskDescriptor> {
        self.task.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

// A completed task may legitimately return `null`; keep it as `Some(Null)`
// instead of collapsing it into "absent".
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn completed_record_shape() {
        let r = OutcomeRecord::completed(
            MessageId::new("m-1"),
            "ns-QUEUED",
            Some(TaskDescriptor::new("add").arg(2).arg(3)),
            json!(5),
        );
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], "completed");
        assert_eq!(v["result"], 5);
        assert_eq!(v["message_id"], "m-1");
        assert_eq!(v["task"]["handler"], "add");
        assert!(v.get("error_message").is_none());
    }

    #[test]
    fn failed_record_shape() {
        let r = OutcomeRecord::failed(
            MessageId::new("m-2"),
            "ns-QUEUED-FAST",
            None,
            &TaskFailure::new("boom"),
        );
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], "failed");
        assert_eq!(v["error_message"], "boom");
        assert!(v.get("result").is_none());
        assert!(v.get("task").is_none());
        assert_eq!(r.status().pool(), PoolRef::failed());
    }

    #[test]
    fn null_result_survives_the_wire() {
        let r = OutcomeRecord::completed(MessageId::new("m"), "q", None, Value::Null);
        let back: OutcomeRecord = serde_json::from_str(&serde_json::to_string(&r).unwrap()).unwrap();
        assert_eq!(back.result(), Some(&Value::Null));
        assert!(back.is_completed());
    }

    #[test]
    fn completed_record_with_error_message_is_rejected() {
        let mut v = serde_json::to_value(OutcomeRecord::completed(
            MessageId::new("m"),
            "q",
            None,
            json!(1),
        ))
        .unwrap();
        v["error_message"] = json!("boom");
        let err = serde_json::from_value::<OutcomeRecord>(v).unwrap_err();
        assert!(err.to_string().contains("completed record"), "{err}");
    }

    #[test]
    fn completed_record_without_result_is_rejected() {
        let mut v = serde_json::to_value(OutcomeRecord::completed(
            MessageId::new("m"),
            "q",
            None,
            json!(1),
        ))
        .unwrap();
        v.as_object_mut().unwrap().remove("result");
        assert!(serde_json::from_value::<OutcomeRecord>(v).is_err());
    }

    #[test]
    fn failed_record_without_error_message_is_rejected() {
        let mut v = serde_json::to_value(OutcomeRecord::failed(
            MessageId::new("m"),
            "q",
            None,
            &TaskFailure::new("boom"),
        ))
        .unwrap();
        v.as_object_mut().unwrap().remove("error_message");
        let err = serde_json::from_value::<OutcomeRecord>(v).unwrap_err();
        assert!(err.to_string().contains("failed record"), "{err}");
    }

    #[test]
    fn failed_record_with_result_is_rejected() {
        let mut v = serde_json::to_value(OutcomeRecord::failed(
            MessageId::new("m"),
            "q",
            None,
            &TaskFailure::new("boom"),
        ))
        .unwrap();
        v["result"] = json!(null);
        assert!(serde_json::from_value::<OutcomeRecord>(v).is_err());
    }
}
