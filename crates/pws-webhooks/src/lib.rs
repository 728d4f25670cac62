//! Webhook dispatch for a Pusher-compatible real-time server.
//!
//! ```text
//! channel event
//!      ↓
//! WebhookSender::notify_*  (format payload)
//!      ↓
//! Signer                   (stamp time_ms, serialize once, sign, headers)
//!      ↓
//! interested_endpoints     (one DeliveryJob per subscribed endpoint)
//!      ↓
//! JobQueue "webhooks"
//!      ↓
//! DeliveryWorker           (HTTP POST, DeliveryPolicy, ack)
//! ```
//!
//! The producer side never performs network I/O. Delivery is best-effort by
//! default ([`AckAlways`]); a [`RetryWithBackoff`] policy can be plugged in
//! without touching the producer.

pub mod app;
pub mod channel;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod filter;
pub mod job;
pub mod payload;
pub mod policy;
pub mod queue;
pub mod sender;
pub mod signer;
pub mod transport;
pub mod worker;

pub use app::{App, WebhookApp, WebhookEndpoint};
pub use channel::is_presence_channel;
pub use clock::{Clock, StepClock, SystemClock};
pub use config::{ConfigError, WebhooksConfig};
pub use error::{WebhookError, WebhookResult};
pub use events::WebhookEvent;
pub use filter::interested_endpoints;
pub use job::{DeliveryJob, WEBHOOK_QUEUE};
pub use payload::{ClientEventData, StampedPayload};
pub use policy::{
    AckAlways, DeadLetter, DeadLetterSink, DeliveryPolicy, LogDeadLetters, MemoryDeadLetters,
    PolicyDecision, RetryWithBackoff,
};
pub use queue::{Ack, JobHandler, JobQueue, MemoryQueue, QueueError, QueueStats};
pub use sender::WebhookSender;
pub use signer::{SignedPayload, Signer, WebhookHeaders, sign_payload, verify_signature};
pub use transport::{DeliveryResult, HttpTransport, WebhookTransport};
pub use worker::{DeliveryReport, DeliveryWorker};
