//! Notifier facade: emit entry points, stats, and shutdown.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::settings::NotifierConfig;
use crate::sink::EventSink;

use super::backlog::BacklogState;
use super::queue::DeliveryQueue;
use super::tracker::OperationTracker;
use super::types::{DeliveryStats, Event, EventContext, EventKind, WireMessage};
use super::worker;

/// The four delivery structures, guarded together so a stats snapshot is
/// never torn.
#[derive(Default)]
pub(crate) struct DeliveryState {
    pub(crate) queue: DeliveryQueue,
    pub(crate) tracker: OperationTracker,
    pub(crate) confirmations: HashMap<u64, DateTime<Utc>>,
    pub(crate) backlog: BacklogState,
}

/// State shared between the notifier facade and its retry worker.
pub(crate) struct Shared {
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) config: NotifierConfig,
    pub(crate) state: Mutex<DeliveryState>,
}

impl Shared {
    /// Lock the delivery state. Sections under this guard must stay short
    /// and must never span an await.
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, DeliveryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Single best-effort sink attempt; errors collapse into a failed attempt.
    pub(crate) async fn try_send(&self, thread_id: &str, message: &WireMessage) -> bool {
        match self.sink.send_to_thread(thread_id, message).await {
            Ok(accepted) => accepted,
            Err(e) => {
                debug!("sink error for thread {}: {}", thread_id, e);
                false
            }
        }
    }
}

/// Per-session delivery subsystem.
///
/// One instance per user session, constructed with the session's sink
/// injected - there is no shared global notifier. Dropping the instance
/// stops its worker; call [`Notifier::shutdown`] for an orderly teardown
/// that also clears state.
pub struct Notifier {
    shared: Arc<Shared>,
    next_id: AtomicU64,
    shutdown_tx: broadcast::Sender<()>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Notifier {
    /// Create a notifier and start its retry worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(sink: Arc<dyn EventSink>, config: NotifierConfig) -> Self {
        let shared = Arc::new(Shared {
            sink,
            config,
            state: Mutex::new(DeliveryState::default()),
        });

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(worker::run(shared.clone(), shutdown_rx));

        Self {
            shared,
            next_id: AtomicU64::new(1),
            shutdown_tx,
            worker: tokio::sync::Mutex::new(Some(handle)),
        }
    }

    /// Deliver one event, retrying in the background on failure.
    ///
    /// Returns once the event is either accepted by the sink or queued for
    /// the retry worker. Delivery problems never propagate to the caller;
    /// a failed critical event is surfaced through an emergency log entry.
    pub async fn emit(
        &self,
        kind: EventKind,
        ctx: &EventContext,
        payload: Value,
        critical: Option<bool>,
    ) {
        let now = Utc::now();
        let mut event = Event {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
            thread_id: ctx.thread_id.clone(),
            user_id: ctx.user_id.clone(),
            run_id: ctx.run_id.clone(),
            payload,
            critical: critical.unwrap_or_else(|| kind.default_critical()),
            created_at: now,
            attempt_count: 0,
            max_attempts: self.shared.config.max_attempts,
            next_attempt_at: now,
        };

        let behind_backlog = {
            let mut state = self.shared.lock_state();
            if kind == EventKind::AgentStarted {
                state.tracker.start(&ctx.thread_id, &ctx.agent_name, &ctx.run_id);
            }
            state.queue.has_pending(&event.thread_id)
        };

        // Events behind a queued predecessor skip the immediate attempt so
        // the sink observes per-thread submission order.
        if behind_backlog {
            debug!(
                "thread {} has a delivery backlog, queueing {} behind it",
                event.thread_id, event.kind
            );
            self.shared.lock_state().queue.push(event);
            return;
        }

        event.attempt_count = 1;
        let message = event.wire_message();
        match self.shared.sink.send_to_thread(&event.thread_id, &message).await {
            Ok(true) => {
                let mut state = self.shared.lock_state();
                state.confirmations.insert(event.id, Utc::now());
                if event.kind == EventKind::AgentCompleted {
                    state.tracker.complete(&event.thread_id);
                }
                debug!("delivered {} to thread {}", event.kind, event.thread_id);
            }
            Ok(false) => {
                if event.critical {
                    error!(
                        "EMERGENCY: sink rejected critical {} for thread {}, queueing for retry",
                        event.kind, event.thread_id
                    );
                }
                self.queue_or_drop(event);
            }
            Err(e) => {
                if event.critical {
                    error!(
                        "EMERGENCY: delivery of critical {} failed for thread {}: {}",
                        event.kind, event.thread_id, e
                    );
                }
                self.queue_or_drop(event);
            }
        }
    }

    /// Queue a failed event for the retry worker, or drop it outright when
    /// its attempts are already spent (`max_attempts` of 1).
    fn queue_or_drop(&self, event: Event) {
        if event.attempt_count >= event.max_attempts {
            if event.critical {
                error!(
                    "EMERGENCY: retries exhausted for {} on thread {} after {} attempts, dropping event",
                    event.kind, event.thread_id, event.attempt_count
                );
            }
            if event.kind == EventKind::AgentCompleted {
                self.shared.lock_state().tracker.complete(&event.thread_id);
            }
            return;
        }
        self.shared.lock_state().queue.push(event);
    }

    /// Announce that an agent picked up the thread.
    pub async fn send_agent_started(&self, ctx: &EventContext) {
        let payload = json!({
            "run_id": ctx.run_id,
            "agent_name": ctx.agent_name,
            "started_at": Utc::now(),
        });
        self.emit(EventKind::AgentStarted, ctx, payload, None).await;
    }

    /// Stream a thinking/progress update.
    pub async fn send_agent_thinking(
        &self,
        ctx: &EventContext,
        message: &str,
        step: Option<&str>,
        progress_percent: Option<u8>,
        current_operation: Option<&str>,
    ) {
        let payload = json!({
            "run_id": ctx.run_id,
            "agent_name": ctx.agent_name,
            "message": message,
            "step": step,
            "progress_percent": progress_percent,
            "current_operation": current_operation,
        });
        self.emit(EventKind::AgentThinking, ctx, payload, None).await;
    }

    /// Announce a tool invocation.
    pub async fn send_tool_executing(
        &self,
        ctx: &EventContext,
        tool_name: &str,
        purpose: Option<&str>,
        estimated_duration_ms: Option<u64>,
    ) {
        let payload = json!({
            "run_id": ctx.run_id,
            "agent_name": ctx.agent_name,
            "tool_name": tool_name,
            "purpose": purpose,
            "estimated_duration_ms": estimated_duration_ms,
        });
        self.emit(EventKind::ToolExecuting, ctx, payload, None).await;
    }

    /// Report a tool invocation's result.
    pub async fn send_tool_completed(&self, ctx: &EventContext, tool_name: &str, result: Value) {
        let payload = json!({
            "run_id": ctx.run_id,
            "agent_name": ctx.agent_name,
            "tool_name": tool_name,
            "result": result,
        });
        self.emit(EventKind::ToolCompleted, ctx, payload, None).await;
    }

    /// Announce that the agent finished the thread.
    pub async fn send_agent_completed(
        &self,
        ctx: &EventContext,
        result: Value,
        duration_ms: Option<u64>,
    ) {
        let payload = json!({
            "run_id": ctx.run_id,
            "agent_name": ctx.agent_name,
            "result": result,
            "duration_ms": duration_ms,
        });
        self.emit(EventKind::AgentCompleted, ctx, payload, None).await;
    }

    /// Whether an agent execution is currently in flight for the thread.
    pub fn is_processing(&self, thread_id: &str) -> bool {
        self.shared.lock_state().tracker.is_processing(thread_id)
    }

    /// Point-in-time snapshot of the delivery structures.
    ///
    /// Safe to call concurrently with the worker and with emitters; all four
    /// counts come from the same locked view.
    pub fn delivery_stats(&self) -> DeliveryStats {
        let state = self.shared.lock_state();
        DeliveryStats {
            queued_events: state.queue.len(),
            active_operations: state.tracker.active_count(),
            delivery_confirmations: state.confirmations.len(),
            backlog_notifications_sent: state.backlog.sent_count(),
        }
    }

    /// Stop the retry worker and clear all delivery state.
    ///
    /// Waits up to the configured timeout for the worker to finish its
    /// current tick, then clears regardless. Safe to call more than once.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        let handle = self.worker.lock().await.take();
        if let Some(mut handle) = handle {
            let timeout = self.shared.config.shutdown_timeout();
            match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(())) => debug!("retry worker stopped"),
                Ok(Err(e)) => warn!("retry worker failed during shutdown: {}", e),
                Err(_) => {
                    warn!(
                        "retry worker did not stop within {:?}, clearing state anyway",
                        timeout
                    );
                    handle.abort();
                }
            }
        }

        let mut state = self.shared.lock_state();
        state.queue.clear();
        state.tracker.clear();
        state.confirmations.clear();
        state.backlog.clear();
        info!("notifier shut down");
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        // Stop the worker even if shutdown() was never called.
        let _ = self.shutdown_tx.send(());
    }
}
