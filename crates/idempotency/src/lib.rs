//! Idempotency manager.
//!
//! Deduplicates a logical operation identified by a caller-supplied key and
//! replays its outcome (success or error) to duplicates within a TTL. This is
//! what keeps a double-submitted booking request or a redelivered queue
//! message from holding two rooms or charging a card twice.

pub mod manager;

pub use manager::{IdempotencyConfig, IdempotencyManager};
