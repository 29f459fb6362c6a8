//! Outbox pattern for booking domain events.
//!
//! Saga steps stage events with [`Outbox::add`]; a sweep
//! ([`Outbox::publish`], driven periodically by [`OutboxRelay`]) hands every
//! unpublished event to a [`Publisher`]. An event leaves the outbox only after
//! its publish call returned success, so delivery is at-least-once and
//! consumers must tolerate duplicates.

pub mod error;
pub mod event;
pub mod outbox;
pub mod publisher;
pub mod relay;

pub use common::EventId;
pub use error::{OutboxError, PublishError, Result};
pub use event::{OutboxEvent, OutboxEventBuilder};
pub use outbox::{Outbox, PublishReport};
pub use publisher::{Publisher, RecordingPublisher};
pub use relay::{OutboxRelay, RelayConfig};
