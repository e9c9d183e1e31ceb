//! Courier - guaranteed delivery of agent lifecycle events.
//!
//! This library delivers real-time lifecycle events (agent started, thinking,
//! tool executing, tool completed, agent completed) to the WebSocket session
//! belonging to the originating user/thread, retrying failed deliveries in
//! the background without ever blocking the producing agent process.

pub mod notify;
pub mod settings;
pub mod sink;
