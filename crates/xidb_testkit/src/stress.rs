//! Stress tests for xidb.
//!
//! These runs drive one store from many tasks at once and report what
//! happened, leaving the assertions to the caller.

use crate::fixtures::RecordFactory;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use xidb_core::{Context, RecordStore};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Operations that wrote a new row.
    pub inserted: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, inserted: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            inserted,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Inserted: {}", self.inserted);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent tasks.
    pub tasks: usize,
    /// Operations per task.
    pub ops_per_task: usize,
    /// Number of distinct identities written.
    pub identities: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            tasks: 8,
            ops_per_task: 250,
            identities: 64,
        }
    }
}

#[derive(Default)]
struct Counters {
    successful: AtomicUsize,
    failed: AtomicUsize,
    inserted: AtomicUsize,
}

async fn run_tasks<F, Fut>(config: &StressConfig, op: F) -> StressTestResult
where
    F: Fn(usize, usize) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Option<bool>> + Send,
{
    let counters = Arc::new(Counters::default());
    let op = Arc::new(op);
    let start = Instant::now();

    let mut tasks = JoinSet::new();
    for task in 0..config.tasks {
        let counters = counters.clone();
        let op = op.clone();
        let ops = config.ops_per_task;
        tasks.spawn(async move {
            for i in 0..ops {
                match op(task, i).await {
                    Some(inserted) => {
                        counters.successful.fetch_add(1, Ordering::Relaxed);
                        if inserted {
                            counters.inserted.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    None => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        });
    }
    while let Some(joined) = tasks.join_next().await {
        if joined.is_err() {
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    StressTestResult::new(
        counters.successful.load(Ordering::Relaxed),
        counters.failed.load(Ordering::Relaxed),
        counters.inserted.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Every task creates every identity under the same idempotency keys. A
/// correct store inserts each identity exactly once.
pub async fn stress_idempotent_creates(
    store: &RecordStore,
    factory: &RecordFactory,
    config: &StressConfig,
) -> StressTestResult {
    let store = store.clone();
    let factory = factory.clone();
    let identities = config.identities.max(1);
    run_tasks(config, move |_, i| {
        let store = store.clone();
        let factory = factory.clone();
        async move {
            let id = format!("user-{}", i % identities);
            let key = format!("create-{id}");
            let record = factory.record(&id, 1);
            store
                .create(&Context::new(), factory.path(), record, Some(&key))
                .await
                .ok()
                .map(|outcome| outcome.is_inserted())
        }
    })
    .await
}

/// Every task upserts a shared set of identities. A correct store keeps one
/// row per identity.
pub async fn stress_concurrent_upserts(
    store: &RecordStore,
    factory: &RecordFactory,
    config: &StressConfig,
) -> StressTestResult {
    let store = store.clone();
    let factory = factory.clone();
    let identities = config.identities.max(1);
    run_tasks(config, move |task, i| {
        let store = store.clone();
        let factory = factory.clone();
        async move {
            let id = format!("user-{}", (task + i) % identities);
            let record = factory.marked(&id, i64::try_from(i).unwrap_or(i64::MAX) + 1, task);
            store.upsert(&Context::new(), record).await.ok().map(|_| true)
        }
    })
    .await
}
