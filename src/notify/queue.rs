//! Undelivered-event queue with per-thread FIFO ordering.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};

use super::types::Event;

/// Outcome of a failed delivery attempt on a thread's head event.
#[derive(Debug)]
pub enum FailOutcome {
    /// Attempts remain; the event stays queued for the retry worker.
    Requeued {
        /// Events still pending for the thread, including the requeued head.
        pending: usize,
    },

    /// Attempts are exhausted; the event was removed from the queue.
    Exhausted(Event),
}

#[derive(Debug, Default)]
struct ThreadQueue {
    events: VecDeque<Event>,
    /// The head is out with the worker for a delivery attempt.
    delivering: bool,
}

/// Queue of undelivered events, one FIFO sub-queue per thread.
///
/// Only the head of each sub-queue is ever handed out for delivery, so
/// events sharing a thread reach the sink in submission order no matter how
/// often earlier ones are retried.
#[derive(Debug)]
pub struct DeliveryQueue {
    threads: HashMap<String, ThreadQueue>,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self {
            threads: HashMap::new(),
        }
    }

    /// Append an event to its thread's sub-queue.
    pub fn push(&mut self, event: Event) {
        self.threads
            .entry(event.thread_id.clone())
            .or_default()
            .events
            .push_back(event);
    }

    /// Whether the thread has queued or in-flight events.
    pub fn has_pending(&self, thread_id: &str) -> bool {
        self.threads
            .get(thread_id)
            .map(|queue| !queue.events.is_empty())
            .unwrap_or(false)
    }

    /// Take the due head of every thread whose head is not already out for
    /// delivery, marking each as in flight.
    ///
    /// The batch is ordered critical-first, then earliest `created_at`.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let mut batch = Vec::new();
        for queue in self.threads.values_mut() {
            if queue.delivering {
                continue;
            }
            if let Some(head) = queue.events.front()
                && head.next_attempt_at <= now
            {
                queue.delivering = true;
                batch.push(head.clone());
            }
        }

        batch.sort_by(|a, b| {
            b.critical
                .cmp(&a.critical)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        batch
    }

    /// Remove the thread's head after a successful delivery.
    pub fn confirm_head(&mut self, thread_id: &str) -> Option<Event> {
        let queue = self.threads.get_mut(thread_id)?;
        let event = queue.events.pop_front();
        queue.delivering = false;
        if queue.events.is_empty() {
            self.threads.remove(thread_id);
        }
        event
    }

    /// Record a failed delivery attempt on the thread's head.
    ///
    /// Increments the attempt count; the event is either rescheduled for
    /// `next_attempt_at` or, once `max_attempts` is reached, removed.
    pub fn fail_head(
        &mut self,
        thread_id: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Option<FailOutcome> {
        let queue = self.threads.get_mut(thread_id)?;
        queue.delivering = false;
        let head = queue.events.front_mut()?;

        head.attempt_count += 1;
        if head.attempt_count >= head.max_attempts {
            let event = queue.events.pop_front()?;
            if queue.events.is_empty() {
                self.threads.remove(thread_id);
            }
            return Some(FailOutcome::Exhausted(event));
        }

        head.next_attempt_at = next_attempt_at;
        let pending = queue.events.len();
        Some(FailOutcome::Requeued { pending })
    }

    /// Total events across all sub-queues.
    pub fn len(&self) -> usize {
        self.threads.values().map(|queue| queue.events.len()).sum()
    }

    pub fn clear(&mut self) {
        self.threads.clear();
    }
}

impl Default for DeliveryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::types::EventKind;
    use serde_json::json;

    fn event(id: u64, thread_id: &str, kind: EventKind, critical: bool) -> Event {
        let now = Utc::now();
        Event {
            id,
            kind,
            thread_id: thread_id.to_string(),
            user_id: "u1".to_string(),
            run_id: "r1".to_string(),
            payload: json!({}),
            critical,
            created_at: now + chrono::Duration::milliseconds(id as i64),
            attempt_count: 0,
            max_attempts: 3,
            next_attempt_at: now,
        }
    }

    #[test]
    fn test_only_heads_are_taken() {
        let mut queue = DeliveryQueue::new();
        queue.push(event(1, "t1", EventKind::AgentStarted, true));
        queue.push(event(2, "t1", EventKind::AgentThinking, false));
        queue.push(event(3, "t2", EventKind::ToolExecuting, true));

        let batch = queue.take_due(Utc::now() + chrono::Duration::seconds(1));
        let ids: Vec<u64> = batch.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_in_flight_head_is_not_retaken() {
        let mut queue = DeliveryQueue::new();
        queue.push(event(1, "t1", EventKind::AgentStarted, true));

        let later = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(queue.take_due(later).len(), 1);
        assert!(queue.take_due(later).is_empty());

        queue.confirm_head("t1");
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_critical_events_drain_first() {
        let mut queue = DeliveryQueue::new();
        queue.push(event(1, "t1", EventKind::AgentThinking, false));
        queue.push(event(2, "t2", EventKind::AgentStarted, true));
        queue.push(event(3, "t3", EventKind::AgentUpdate, false));

        let batch = queue.take_due(Utc::now() + chrono::Duration::seconds(1));
        let ids: Vec<u64> = batch.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn test_backoff_defers_retry() {
        let mut queue = DeliveryQueue::new();
        queue.push(event(1, "t1", EventKind::AgentStarted, true));

        let now = Utc::now();
        assert_eq!(queue.take_due(now + chrono::Duration::seconds(1)).len(), 1);

        let retry_at = now + chrono::Duration::seconds(10);
        match queue.fail_head("t1", retry_at) {
            Some(FailOutcome::Requeued { pending }) => assert_eq!(pending, 1),
            other => panic!("unexpected outcome: {:?}", other),
        }

        // Not due yet.
        assert!(queue.take_due(now + chrono::Duration::seconds(5)).is_empty());
        assert_eq!(queue.take_due(now + chrono::Duration::seconds(11)).len(), 1);
    }

    #[test]
    fn test_exhaustion_removes_event() {
        let mut queue = DeliveryQueue::new();
        let mut e = event(1, "t1", EventKind::AgentStarted, true);
        e.attempt_count = 2;
        queue.push(e);

        let later = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(queue.take_due(later).len(), 1);
        match queue.fail_head("t1", later) {
            Some(FailOutcome::Exhausted(dropped)) => {
                assert_eq!(dropped.id, 1);
                assert_eq!(dropped.attempt_count, dropped.max_attempts);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_len_counts_all_threads() {
        let mut queue = DeliveryQueue::new();
        queue.push(event(1, "t1", EventKind::AgentStarted, true));
        queue.push(event(2, "t1", EventKind::AgentCompleted, true));
        queue.push(event(3, "t2", EventKind::AgentThinking, false));
        assert_eq!(queue.len(), 3);
        assert!(queue.has_pending("t1"));
        assert!(!queue.has_pending("t3"));

        queue.clear();
        assert_eq!(queue.len(), 0);
    }
}
