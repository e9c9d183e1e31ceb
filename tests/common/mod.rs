//! Shared sinks for delivery tests.

use async_trait::async_trait;
use std::sync::Mutex;

use courier::notify::{EventKind, WireMessage};
use courier::sink::{EventSink, SinkError, SinkResult};

/// Initialize test logging; safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Sink that records every invocation and every accepted message.
///
/// Optionally rejects the first N sends to exercise the retry path.
pub struct RecordingSink {
    attempts: Mutex<Vec<(String, WireMessage)>>,
    delivered: Mutex<Vec<(String, WireMessage)>>,
    fail_first: Mutex<u32>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::failing_first(0)
    }

    pub fn failing_first(n: u32) -> Self {
        Self {
            attempts: Mutex::new(Vec::new()),
            delivered: Mutex::new(Vec::new()),
            fail_first: Mutex::new(n),
        }
    }

    /// Every invocation, in sink-call order, successful or not.
    pub fn attempted_kinds(&self) -> Vec<EventKind> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, message)| message.kind)
            .collect()
    }

    pub fn delivered(&self) -> Vec<(String, WireMessage)> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn delivered_kinds(&self) -> Vec<EventKind> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|(_, message)| message.kind)
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn send_to_thread(&self, thread_id: &str, message: &WireMessage) -> SinkResult<bool> {
        self.attempts
            .lock()
            .unwrap()
            .push((thread_id.to_string(), message.clone()));

        let mut remaining = self.fail_first.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Ok(false);
        }
        drop(remaining);

        self.delivered
            .lock()
            .unwrap()
            .push((thread_id.to_string(), message.clone()));
        Ok(true)
    }
}

/// Sink whose transport is permanently gone.
pub struct DeadSink;

#[async_trait]
impl EventSink for DeadSink {
    async fn send_to_thread(&self, thread_id: &str, _message: &WireMessage) -> SinkResult<bool> {
        Err(SinkError::ConnectionClosed {
            thread_id: thread_id.to_string(),
        })
    }
}

/// Sink that only lets backlog notices (`agent_update`) through.
pub struct BacklogOnlySink {
    delivered: Mutex<Vec<WireMessage>>,
}

impl BacklogOnlySink {
    pub fn new() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
        }
    }

    pub fn notice_count(&self) -> usize {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter(|message| message.kind == EventKind::AgentUpdate)
            .count()
    }
}

#[async_trait]
impl EventSink for BacklogOnlySink {
    async fn send_to_thread(&self, _thread_id: &str, message: &WireMessage) -> SinkResult<bool> {
        if message.kind == EventKind::AgentUpdate {
            self.delivered.lock().unwrap().push(message.clone());
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
