//! Domain model (pools, ids, task descriptors, outcome records, errors).

pub mod errors;
pub mod ids;
pub mod outcome;
pub mod pool;
pub mod state;
pub mod task;

pub use errors::{CodecError, ErrorKind, TaskFailure, TaskQError, TransportError};
pub use ids::MessageId;
pub use outcome::{OutcomeRecord, OutcomeShapeError, OutcomeStatus};
pub use pool::{PoolKind, PoolRef, slugify};
pub use state::AttemptState;
pub use task::{Kwargs, TaskCall, TaskDescriptor};
