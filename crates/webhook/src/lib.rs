//! Outbound webhook delivery and inbound webhook verification.
//!
//! Outbound payloads are signed with HMAC-SHA256 over the exact body bytes
//! and sent with `X-Webhook-*` headers; [`WebhookDispatcher::retry_webhook`]
//! retries transient failures with exponential backoff. Inbound payment
//! notifications are verified with the gateway's own signature scheme before
//! anything in them is trusted.

pub mod dispatcher;
pub mod error;
pub mod inbound;
pub mod signature;

pub use dispatcher::{DeliveryReceipt, DispatcherConfig, WebhookDispatcher, WebhookEvent};
pub use error::{Result, WebhookError};
pub use inbound::PaymentNotification;
pub use signature::{midtrans_signature, sign, verify, verify_midtrans_signature};
