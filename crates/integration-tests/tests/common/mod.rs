// Shared fixtures for the scenario tests

#![allow(dead_code)]

use resq_core::application::{shutdown_channel, Dispatcher, DispatcherConfig};
use resq_core::domain::{JobArgs, QueueSet};
use resq_core::port::{TaskError, TaskRegistry};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

pub fn config(max_workers: usize, queues: &[&str]) -> DispatcherConfig {
    let mut config =
        DispatcherConfig::new(max_workers, QueueSet::new(queues.iter().copied()).unwrap());
    config.blpop_max_block_time = Duration::from_millis(100);
    config
}

pub fn args(value: serde_json::Value) -> JobArgs {
    value.as_object().cloned().unwrap_or_default()
}

pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..4_000 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

/// Registry with one handler pushing each job's `id` argument into `seen`
pub fn recording_registry(name: &str, delay: Duration) -> (TaskRegistry, Arc<Mutex<Vec<i64>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut registry = TaskRegistry::new();
    let sink = seen.clone();
    registry.register_fn(name, move |args: JobArgs| {
        let sink = sink.clone();
        async move {
            sleep(delay).await;
            let id = args.get("id").and_then(|v| v.as_i64()).unwrap_or(-1);
            sink.lock().unwrap().push(id);
            Ok::<(), TaskError>(())
        }
    });
    (registry, seen)
}

/// Run the pool until `done` resolves, then shut it down and wait for it
pub async fn run_until<F>(dispatcher: &Dispatcher, registry: TaskRegistry, done: F)
where
    F: Future<Output = ()>,
{
    let (tx, shutdown) = shutdown_channel();
    let run = dispatcher.run(registry, shutdown);
    let stop = async {
        done.await;
        tx.shutdown();
    };
    let (result, ()) = tokio::join!(run, stop);
    result.unwrap();
}
