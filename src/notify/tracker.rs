//! Per-thread tracking of in-flight agent executions.

use chrono::{DateTime, Utc};
use log::warn;
use std::collections::HashMap;

/// One in-flight agent execution. Keyed by thread id in the tracker; the
/// record is evicted when the execution completes.
#[derive(Debug, Clone)]
struct OperationRecord {
    agent_name: String,
    run_id: String,
    started_at: DateTime<Utc>,
}

/// Map of in-flight agent executions, keyed by thread.
///
/// At most one execution is tracked per thread; a duplicate start is a
/// caller error and the existing record wins.
#[derive(Debug)]
pub struct OperationTracker {
    operations: HashMap<String, OperationRecord>,
}

impl OperationTracker {
    pub fn new() -> Self {
        Self {
            operations: HashMap::new(),
        }
    }

    /// Record the start of an agent execution for a thread.
    ///
    /// Returns `false` (and warns) when the thread already has an execution
    /// in flight; the new record is rejected, not merged.
    pub fn start(&mut self, thread_id: &str, agent_name: &str, run_id: &str) -> bool {
        if let Some(existing) = self.operations.get(thread_id) {
            warn!(
                "agent {} already processing on thread {} since {} (run {}), rejecting duplicate start (run {})",
                existing.agent_name, thread_id, existing.started_at, existing.run_id, run_id
            );
            return false;
        }

        self.operations.insert(
            thread_id.to_string(),
            OperationRecord {
                agent_name: agent_name.to_string(),
                run_id: run_id.to_string(),
                started_at: Utc::now(),
            },
        );
        true
    }

    /// Mark the thread's execution as finished and evict its record.
    ///
    /// Completing an absent or already-completed thread is a no-op.
    pub fn complete(&mut self, thread_id: &str) {
        self.operations.remove(thread_id);
    }

    pub fn is_processing(&self, thread_id: &str) -> bool {
        self.operations.contains_key(thread_id)
    }

    /// Number of threads with an agent still processing.
    pub fn active_count(&self) -> usize {
        self.operations.len()
    }

    pub fn clear(&mut self) {
        self.operations.clear();
    }
}

impl Default for OperationTracker {
    fn default() -> Self {
        Self::new()
    }
}
