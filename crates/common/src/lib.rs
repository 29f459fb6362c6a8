//! Shared building blocks for the booking coordination crates.
//!
//! - [`AggregateId`] / [`EventId`]: typed UUID identifiers
//! - [`BackoffPolicy`] and [`retry`]: cancellable exponential backoff
//! - [`Shutdown`] / [`ShutdownSignal`]: cooperative cancellation for background loops
//! - [`Retryable`]: transient vs. permanent error classification

pub mod retry;
pub mod shutdown;
pub mod types;

pub use retry::{BackoffPolicy, RetryOutcome, Retryable, retry};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use types::{AggregateId, EventId};
