//! Rate-limited "processing is delayed" notices.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Per-thread record of the most recent backlog notice.
#[derive(Debug, Clone)]
struct BacklogRecord {
    last_notified_at: DateTime<Utc>,
    pending_count: usize,
}

/// Tracks when each thread last received a backlog notice so a sustained
/// failure does not re-notify the user on every retry tick.
#[derive(Debug)]
pub struct BacklogState {
    threads: HashMap<String, BacklogRecord>,
    sent: u64,
}

impl BacklogState {
    pub fn new() -> Self {
        Self {
            threads: HashMap::new(),
            sent: 0,
        }
    }

    /// Record a failed-and-requeued delivery for the thread.
    ///
    /// Returns the pending count to include in a backlog notice when the
    /// cooldown has elapsed, `None` while the thread is still cooling down.
    /// The cooldown window restarts whenever a notice is due, whether or not
    /// the caller's send attempt succeeds.
    pub fn note_failure(
        &mut self,
        thread_id: &str,
        pending: usize,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) -> Option<usize> {
        match self.threads.get_mut(thread_id) {
            Some(record) => {
                record.pending_count = pending;
                if now - record.last_notified_at >= cooldown {
                    record.last_notified_at = now;
                    Some(record.pending_count)
                } else {
                    None
                }
            }
            None => {
                self.threads.insert(
                    thread_id.to_string(),
                    BacklogRecord {
                        last_notified_at: now,
                        pending_count: pending,
                    },
                );
                Some(pending)
            }
        }
    }

    /// Count one notice the sink accepted.
    pub fn record_sent(&mut self) {
        self.sent += 1;
    }

    pub fn sent_count(&self) -> u64 {
        self.sent
    }

    pub fn clear(&mut self) {
        self.threads.clear();
        self.sent = 0;
    }
}

impl Default for BacklogState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_failure_notifies() {
        let mut backlog = BacklogState::new();
        let now = Utc::now();
        assert_eq!(
            backlog.note_failure("t1", 2, Duration::seconds(3), now),
            Some(2)
        );
    }

    #[test]
    fn test_cooldown_suppresses_repeat() {
        let mut backlog = BacklogState::new();
        let now = Utc::now();
        let cooldown = Duration::seconds(3);

        assert!(backlog.note_failure("t1", 1, cooldown, now).is_some());
        assert!(
            backlog
                .note_failure("t1", 2, cooldown, now + Duration::seconds(1))
                .is_none()
        );
        // Cooldown elapsed; the latest pending count is reported.
        assert_eq!(
            backlog.note_failure("t1", 3, cooldown, now + Duration::seconds(4)),
            Some(3)
        );
    }

    #[test]
    fn test_threads_are_independent() {
        let mut backlog = BacklogState::new();
        let now = Utc::now();
        let cooldown = Duration::seconds(3);

        assert!(backlog.note_failure("t1", 1, cooldown, now).is_some());
        assert!(backlog.note_failure("t2", 1, cooldown, now).is_some());
    }

    #[test]
    fn test_clear_resets_counter() {
        let mut backlog = BacklogState::new();
        backlog.record_sent();
        backlog.record_sent();
        assert_eq!(backlog.sent_count(), 2);

        backlog.clear();
        assert_eq!(backlog.sent_count(), 0);
    }
}
