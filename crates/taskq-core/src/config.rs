//! Configuration for the facade and the two loops.
//!
//! Every config has `Default`, chained `with_*` setters and a `from_env()`
//! reader. Unset or unparsable variables fall back to the defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ports::{MAX_RECEIVE_BATCH, MAX_RECEIVE_WAIT};

pub const ENV_NAMESPACE: &str = "TASKQ_NAMESPACE";
pub const ENV_VISIBILITY_TIMEOUT_SECS: &str = "TASKQ_VISIBILITY_TIMEOUT_SECS";
pub const ENV_POOL: &str = "TASKQ_POOL";
pub const ENV_BATCH_SIZE: &str = "TASKQ_BATCH_SIZE";
pub const ENV_POLL_WAIT_SECS: &str = "TASKQ_POLL_WAIT_SECS";
pub const ENV_PAUSE_SECS: &str = "TASKQ_PAUSE_SECS";
pub const ENV_RUN_ONCE: &str = "TASKQ_RUN_ONCE";
pub const ENV_WRITE_FAILED: &str = "TASKQ_WRITE_FAILED";
pub const ENV_DELETE_ON_CONSUME: &str = "TASKQ_DELETE_ON_CONSUME";

const DEFAULT_BATCH_SIZE: usize = 5;
const DEFAULT_POLL_WAIT: Duration = Duration::from_secs(20);
const DEFAULT_PAUSE: Duration = Duration::from_secs(5);

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.trim().parse().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_secs)
}

fn env_bool(key: &str) -> Option<bool> {
    env_string(key).and_then(|v| match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    })
}

fn clamp_batch(size: usize) -> usize {
    size.clamp(1, MAX_RECEIVE_BATCH)
}

/// Facade configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskQConfig {
    /// Namespace all pool names derive from; slugged on use.
    pub namespace: String,

    /// Visibility timeout for queues this process creates. `None` keeps the
    /// transport default.
    #[serde(default, with = "duration_secs_opt")]
    pub visibility_timeout: Option<Duration>,
}

impl TaskQConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            visibility_timeout: None,
        }
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = Some(timeout);
        self
    }

    /// Read `TASKQ_NAMESPACE` (default `"taskq"`) and
    /// `TASKQ_VISIBILITY_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self {
            namespace: env_string(ENV_NAMESPACE).unwrap_or_else(|| "taskq".to_string()),
            visibility_timeout: env_secs(ENV_VISIBILITY_TIMEOUT_SECS),
        }
    }
}

/// Worker loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Queued sub-pool to work on; `None` is the default queued pool.
    pub pool: Option<String>,

    /// Messages requested per receive (1..=10).
    pub batch_size: usize,

    /// Long-poll wait per receive (at most 20s).
    #[serde(with = "duration_secs")]
    pub poll_wait: Duration,

    /// Sleep between iterations.
    #[serde(with = "duration_secs")]
    pub pause: Duration,

    /// Stop after one iteration.
    pub run_once: bool,

    /// Write failed outcomes to the failed pool. When `false`, a failed
    /// attempt leaves nothing behind but an error log line.
    pub write_failed: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool: None,
            batch_size: DEFAULT_BATCH_SIZE,
            poll_wait: DEFAULT_POLL_WAIT,
            pause: DEFAULT_PAUSE,
            run_once: false,
            write_failed: true,
        }
    }
}

impl WorkerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(mut self, pool: impl Into<String>) -> Self {
        self.pool = Some(pool.into());
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = clamp_batch(size);
        self
    }

    pub fn with_poll_wait(mut self, wait: Duration) -> Self {
        self.poll_wait = wait.min(MAX_RECEIVE_WAIT);
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_run_once(mut self, run_once: bool) -> Self {
        self.run_once = run_once;
        self
    }

    pub fn with_write_failed(mut self, write_failed: bool) -> Self {
        self.write_failed = write_failed;
        self
    }

    /// Bring `batch_size` and `poll_wait` back into the transport limits.
    /// Values set directly on the fields or read through serde skip the
    /// setters, so the loops normalize every config they are given.
    pub fn normalized(mut self) -> Self {
        self.batch_size = clamp_batch(self.batch_size);
        self.poll_wait = self.poll_wait.min(MAX_RECEIVE_WAIT);
        self
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            pool: env_string(ENV_POOL),
            batch_size: env_parse(ENV_BATCH_SIZE).map_or(defaults.batch_size, clamp_batch),
            poll_wait: env_secs(ENV_POLL_WAIT_SECS)
                .map_or(defaults.poll_wait, |w| w.min(MAX_RECEIVE_WAIT)),
            pause: env_secs(ENV_PAUSE_SECS).unwrap_or(defaults.pause),
            run_once: env_bool(ENV_RUN_ONCE).unwrap_or(defaults.run_once),
            write_failed: env_bool(ENV_WRITE_FAILED).unwrap_or(defaults.write_failed),
        }
    }
}

/// Drain loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrainConfig {
    pub batch_size: usize,

    #[serde(with = "duration_secs")]
    pub poll_wait: Duration,

    #[serde(with = "duration_secs")]
    pub pause: Duration,

    pub run_once: bool,

    /// Delete a message once its callback returned `Ok`.
    pub delete_on_consume: bool,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            poll_wait: DEFAULT_POLL_WAIT,
            pause: DEFAULT_PAUSE,
            run_once: false,
            delete_on_consume: true,
        }
    }
}

impl DrainConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = clamp_batch(size);
        self
    }

    pub fn with_poll_wait(mut self, wait: Duration) -> Self {
        self.poll_wait = wait.min(MAX_RECEIVE_WAIT);
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_run_once(mut self, run_once: bool) -> Self {
        self.run_once = run_once;
        self
    }

    pub fn with_delete_on_consume(mut self, delete: bool) -> Self {
        self.delete_on_consume = delete;
        self
    }

    /// Bring `batch_size` and `poll_wait` back into the transport limits.
    /// Values set directly on the fields or read through serde skip the
    /// setters, so the loops normalize every config they are given.
    pub fn normalized(mut self) -> Self {
        self.batch_size = clamp_batch(self.batch_size);
        self.poll_wait = self.poll_wait.min(MAX_RECEIVE_WAIT);
        self
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: env_parse(ENV_BATCH_SIZE).map_or(defaults.batch_size, clamp_batch),
            poll_wait: env_secs(ENV_POLL_WAIT_SECS)
                .map_or(defaults.poll_wait, |w| w.min(MAX_RECEIVE_WAIT)),
            pause: env_secs(ENV_PAUSE_SECS).unwrap_or(defaults.pause),
            run_once: env_bool(ENV_RUN_ONCE).unwrap_or(defaults.run_once),
            delete_on_consume: env_bool(ENV_DELETE_ON_CONSUME)
                .unwrap_or(defaults.delete_on_consume),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

mod duration_secs_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|v| v.map(Duration::from_secs))
    }
}
