//! Guaranteed delivery of agent lifecycle events to a user's session.
//!
//! One [`Notifier`] instance serves one user session. Producers call the
//! emit entry points; a background worker owns all retry/backoff logic.
//!
//! ```text
//! ┌──────────────────┐   emit / send_*    ┌──────────────────────────────┐
//! │  Agent execution │ ─────────────────► │  Notifier                    │
//! │  (producer)      │    never blocked   │  - one immediate attempt     │
//! └──────────────────┘                    │  - operation tracker         │
//!                                         └──────┬───────────────▲───────┘
//!                                        failure │               │ retry
//!                                                ▼               │
//!                                         ┌──────────────────────┴───────┐
//!                                         │  DeliveryQueue + worker      │
//!                                         │  - per-thread FIFO heads     │
//!                                         │  - exponential backoff       │
//!                                         │  - backlog notices           │
//!                                         └──────┬───────────────────────┘
//!                                                │ send_to_thread
//!                                                ▼
//!                                         ┌──────────────────────────────┐
//!                                         │  EventSink (WebSocket side)  │
//!                                         └──────────────────────────────┘
//! ```
//!
//! Guarantees:
//! - Events sharing a thread reach the sink in submission order.
//! - Critical events are retried up to `max_attempts`; an undeliverable one
//!   is surfaced through an emergency log entry, never raised to the
//!   producer.
//! - A sustained backlog produces at most one rate-limited notice to the
//!   user per cooldown window.

mod backlog;
mod notifier;
mod queue;
mod tracker;
mod types;
mod worker;

pub use notifier::Notifier;
pub use types::{DeliveryStats, Event, EventContext, EventKind, WireMessage};
