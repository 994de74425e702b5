use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskq_core::{
    DrainConfig, Handler, InMemoryTransport, OutcomeRecord, Task, TaskCall, TaskDescriptor,
    TaskFailure, TaskQBuilder, TaskQConfig, WorkerConfig,
};

/// 型付き task の例：kwargs として運ばれ、Handler に構造体で届く
#[derive(Debug, Serialize, Deserialize)]
struct Greet {
    name: String,
}

impl Task for Greet {
    const NAME: &'static str = "demo.greet.v1";
}

struct GreetHandler;

#[async_trait]
impl Handler<Greet> for GreetHandler {
    type Output = String;

    async fn handle(&self, task: Greet) -> Result<String, TaskFailure> {
        if task.name.is_empty() {
            return Err(TaskFailure::new("name must not be empty"));
        }
        Ok(format!("Hello, {}!", task.name))
    }
}

fn add(call: TaskCall) -> Result<serde_json::Value, TaskFailure> {
    Ok(json!(call.arg::<i64>(0)? + call.arg::<i64>(1)?))
}

fn print_record(label: &str, record: &OutcomeRecord) {
    let handler = record.task().map_or("<undecodable>", |t| t.handler.as_str());
    match (record.result(), record.error_message()) {
        (Some(result), _) => println!("{label}: id={} handler={handler} result={result}", record.message_id()),
        (None, Some(error)) => println!("{label}: id={} handler={handler} error={error}", record.message_id()),
        (None, None) => println!("{label}: id={} handler={handler}", record.message_id()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskq=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = TaskQConfig::from_env();
    // デモは 1 回だけ回して終わる
    let worker_config = WorkerConfig::from_env().with_run_once(true);
    let drain_config = DrainConfig::from_env()
        .with_run_once(true)
        .with_poll_wait(std::time::Duration::ZERO);
    tracing::info!(namespace = %config.namespace, "taskq demo starting");

    let taskq = TaskQBuilder::from_config(config)
        .transport(Arc::new(InMemoryTransport::new()))
        .register_fn("add", add)?
        .register_fn("boom", |_| Err(TaskFailure::new("boom")))?
        .register::<Greet, _>(GreetHandler)?
        .expect_handlers(&["add", "boom", Greet::NAME])
        .build()?;

    let pool = worker_config.pool.as_deref();
    taskq
        .enqueue(&TaskDescriptor::new("add").arg(2).arg(3), pool, None)
        .await?;
    taskq
        .enqueue(&TaskDescriptor::new("boom"), pool, None)
        .await?;
    taskq
        .enqueue_task(&Greet { name: "world".into() }, pool, None)
        .await?;
    taskq
        .enqueue(&TaskDescriptor::new("missing"), pool, None)
        .await?;

    let stats = taskq.run(worker_config).await?;
    println!(
        "worker: fetched={} completed={} failed={}",
        stats.fetched, stats.completed, stats.failed
    );

    taskq
        .run_completed(
            |record| {
                print_record("completed", &record);
                Ok::<_, TaskFailure>(())
            },
            drain_config.clone(),
        )
        .await?;
    taskq
        .run_failed(
            |record| {
                print_record("failed", &record);
                Ok::<_, TaskFailure>(())
            },
            drain_config,
        )
        .await?;

    for (pool, count) in taskq.counts().await?.iter() {
        println!("{pool}: {count}");
    }
    Ok(())
}
