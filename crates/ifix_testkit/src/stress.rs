//! Load helpers for the record store.
//!
//! These drive many operations, sequentially or from several threads, and
//! report throughput and failures.

use ifix_core::{fields, Database};
use serde_json::json;
use std::sync::Arc;
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
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Length of the text field of each record.
    pub payload_len: usize,
    /// Table to write to.
    pub table: String,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 200,
            threads: 4,
            payload_len: 64,
            table: "STRESS".to_string(),
        }
    }
}

/// Creates then updates records from one thread.
pub fn stress_sequential_writes(db: &Database, config: &StressConfig) -> StressTestResult {
    let store = match db.table(&config.table) {
        Ok(store) => store,
        Err(_) => return StressTestResult::new(0, config.operations, Duration::ZERO),
    };
    let payload = "x".repeat(config.payload_len);

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;
    let mut last_id: Option<String> = None;

    for i in 0..config.operations {
        let result = match (&last_id, i % 2) {
            (Some(id), 1) => store
                .update(id, fields(json!({"step": i})))
                .map(|r| r.id),
            _ => store
                .create(fields(json!({"step": i, "payload": payload})))
                .map(|r| r.id),
        };
        match result {
            Ok(id) => {
                last_id = Some(id);
                successful += 1;
            }
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Creates records from `config.threads` threads sharing one table.
pub fn stress_concurrent_creates(db: &Arc<Database>, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let db = Arc::clone(db);
            let config = config.clone();
            thread::spawn(move || {
                let Ok(store) = db.table(&config.table) else {
                    return (0, config.operations);
                };
                let payload = "x".repeat(config.payload_len);
                let mut ok = 0usize;
                let mut failed = 0usize;
                for i in 0..config.operations {
                    match store.create(fields(json!({
                        "thread": t,
                        "step": i,
                        "payload": payload,
                    }))) {
                        Ok(_) => ok += 1,
                        Err(_) => failed += 1,
                    }
                }
                (ok, failed)
            })
        })
        .collect();

    let (successful, failed) = handles
        .into_iter()
        .map(|h| h.join().unwrap_or((0, 0)))
        .fold((0, 0), |(s, f), (ok, failed)| (s + ok, f + failed));

    StressTestResult::new(successful, failed, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> StressConfig {
        StressConfig {
            operations: 40,
            threads: 4,
            ..StressConfig::default()
        }
    }

    #[test]
    fn sequential_writes_succeed() {
        let db = Database::in_memory();
        let result = stress_sequential_writes(&db, &small());
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 40);
        assert_eq!(db.table("STRESS").unwrap().count(), 20);
    }

    #[test]
    fn concurrent_creates_lose_nothing() {
        let db = Arc::new(Database::in_memory());
        let config = small();
        let result = stress_concurrent_creates(&db, &config);
        assert_eq!(result.failed_ops, 0);

        let store = db.table("STRESS").unwrap();
        assert_eq!(store.count(), config.threads * config.operations);
        assert!(db.verify_table("STRESS").unwrap().is_ok());
    }
}
