//! Background retry worker for queued events.

use chrono::Utc;
use log::{debug, error, info};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::notifier::Shared;
use super::queue::FailOutcome;
use super::types::{Event, EventKind, WireMessage};

/// Drain loop for the delivery queue.
///
/// Wakes on a fixed interval and attempts the due head of every per-thread
/// sub-queue until the shutdown signal arrives.
pub(crate) async fn run(shared: Arc<Shared>, mut shutdown_rx: broadcast::Receiver<()>) {
    let interval = shared.config.worker_interval();
    debug!("retry worker started (interval {:?})", interval);

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                tick(&shared).await;
            }
            _ = shutdown_rx.recv() => {
                debug!("retry worker stopping");
                break;
            }
        }
    }
}

/// One drain pass over the due per-thread heads.
async fn tick(shared: &Shared) {
    let batch = {
        let mut state = shared.lock_state();
        state.queue.take_due(Utc::now())
    };

    for event in batch {
        let message = event.wire_message();
        let delivered = shared.try_send(&event.thread_id, &message).await;

        let notice = {
            let mut state = shared.lock_state();
            if delivered {
                if let Some(done) = state.queue.confirm_head(&event.thread_id) {
                    info!(
                        "delivered {} to thread {} after {} attempts",
                        done.kind,
                        done.thread_id,
                        done.attempt_count + 1
                    );
                    state.confirmations.insert(done.id, Utc::now());
                    if done.kind == EventKind::AgentCompleted {
                        state.tracker.complete(&done.thread_id);
                    }
                }
                None
            } else {
                apply_failure(&mut state, shared, &event)
            }
        };

        // The backlog notice is best-effort: one attempt, never queued.
        if let Some(notice) = notice {
            if shared.try_send(&event.thread_id, &notice).await {
                shared.lock_state().backlog.record_sent();
            }
        }
    }
}

/// Record a failed attempt; returns a backlog notice when one is due.
fn apply_failure(
    state: &mut super::notifier::DeliveryState,
    shared: &Shared,
    event: &Event,
) -> Option<WireMessage> {
    let now = Utc::now();
    let delay_ms = shared.config.backoff_delay_ms(event.attempt_count + 1);
    let next_attempt_at = now + chrono::Duration::milliseconds(delay_ms as i64);

    match state.queue.fail_head(&event.thread_id, next_attempt_at)? {
        FailOutcome::Requeued { pending } => {
            debug!(
                "delivery of {} failed for thread {} (attempt {}), retrying in {}ms",
                event.kind,
                event.thread_id,
                event.attempt_count + 1,
                delay_ms
            );
            let cooldown = shared.config.backlog_cooldown();
            state
                .backlog
                .note_failure(&event.thread_id, pending, cooldown, now)
                .map(|pending| backlog_notice(event, pending))
        }
        FailOutcome::Exhausted(dropped) => {
            if dropped.critical {
                error!(
                    "EMERGENCY: retries exhausted for {} on thread {} after {} attempts, dropping event",
                    dropped.kind, dropped.thread_id, dropped.attempt_count
                );
            } else {
                debug!(
                    "dropping non-critical {} for thread {} after {} attempts",
                    dropped.kind, dropped.thread_id, dropped.attempt_count
                );
            }
            if dropped.kind == EventKind::AgentCompleted {
                state.tracker.complete(&dropped.thread_id);
            }
            None
        }
    }
}

/// Low-priority "processing is delayed" message for the user.
fn backlog_notice(event: &Event, pending: usize) -> WireMessage {
    WireMessage {
        kind: EventKind::AgentUpdate,
        payload: json!({
            "run_id": event.run_id,
            "current_task": "backlog_processing",
            "pending_count": pending,
        }),
    }
}
