//! Stress tests for RecorDB.
//!
//! These helpers drive a connection under heavy load and concurrent access.

use crate::fixtures::{task, TASKS};
use recordb_core::{Connection, Key, TransactionMode};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
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
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Number of distinct keys each thread writes.
    pub key_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 1_000,
            threads: 4,
            key_count: 100,
        }
    }
}

fn key_for(thread: usize, i: usize, config: &StressConfig) -> i64 {
    (thread * config.key_count + i % config.key_count) as i64
}

/// Runs `config.threads` writers, each putting into its own key range.
pub fn stress_concurrent_writes(conn: &Connection, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let outcomes: Vec<(usize, usize)> = thread::scope(|scope| {
        let handles: Vec<_> = (0..config.threads)
            .map(|t| {
                let conn = conn.clone();
                scope.spawn(move || {
                    let mut ok = 0usize;
                    let mut failed = 0usize;
                    for i in 0..config.operations {
                        let record = task(key_for(t, i, config));
                        let result = conn
                            .transaction(&[TASKS], TransactionMode::ReadWrite)
                            .and_then(|mut txn| {
                                txn.put(TASKS, &record)?;
                                txn.commit()
                            });
                        match result {
                            Ok(_) => ok += 1,
                            Err(_) => failed += 1,
                        }
                    }
                    (ok, failed)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or((0, config.operations)))
            .collect()
    });

    let (ok, failed) = outcomes
        .into_iter()
        .fold((0, 0), |(a, b), (c, d)| (a + c, b + d));
    StressTestResult::new(ok, failed, start.elapsed())
}

/// Runs writers racing `add` on the same keys. Exactly one add per key may
/// win; every other attempt must fail with a constraint violation.
pub fn stress_contended_adds(conn: &Connection, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let outcomes: Vec<(usize, usize)> = thread::scope(|scope| {
        let handles: Vec<_> = (0..config.threads)
            .map(|_| {
                let conn = conn.clone();
                scope.spawn(move || {
                    let mut won = 0usize;
                    let mut lost = 0usize;
                    for i in 0..config.key_count {
                        let record = task(i as i64);
                        let result = conn
                            .transaction(&[TASKS], TransactionMode::ReadWrite)
                            .and_then(|mut txn| {
                                let added = txn.add(TASKS, &record);
                                let committed = txn.commit();
                                added.and(committed)
                            });
                        match result {
                            Ok(_) => won += 1,
                            Err(_) => lost += 1,
                        }
                    }
                    (won, lost)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or((0, config.key_count)))
            .collect()
    });

    let (won, lost) = outcomes
        .into_iter()
        .fold((0, 0), |(a, b), (c, d)| (a + c, b + d));
    StressTestResult::new(won, lost, start.elapsed())
}

/// Reads random keys while the collection is being written.
pub fn stress_reads(conn: &Connection, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut ok = 0usize;
    let mut failed = 0usize;
    for i in 0..config.operations {
        let key = Key::from((i % config.key_count) as i64);
        let result = conn
            .transaction(&[TASKS], TransactionMode::ReadOnly)
            .and_then(|mut txn| txn.get(TASKS, &key));
        match result {
            Ok(_) => ok += 1,
            Err(_) => failed += 1,
        }
    }
    StressTestResult::new(ok, failed, start.elapsed())
}
