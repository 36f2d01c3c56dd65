//! Reliable notification delivery.
//!
//! Outbound messages flow: idempotent enqueue → [`worker::DeliveryWorker`]
//! dispatch with a bounded retry budget → Sent, or DeadLetter for manual
//! recovery via [`queue::NotificationQueue::retry_dead_letters`]. A
//! correlation key deduplicates enqueues for one logical event once the
//! first copy is Sent.

pub mod metrics;
pub mod model;
pub mod queue;
pub mod transport;
pub mod worker;

pub use metrics::{DeliveryMetrics, MetricsSnapshot};
pub use model::{OutboundMessage, OutboundStatus};
pub use queue::{EnqueueRequest, NotificationQueue, spawn_dispatch_task};
pub use transport::{LogOnlyTransport, NotificationTransport, SmtpNotifier};
pub use worker::{DeliveryWorker, DispatchSummary};
