//! Saga orchestration for hotel bookings.
//!
//! A [`Saga`] runs its steps in order. If a step fails, every step that
//! already completed is compensated in reverse order, so the booking either
//! commits fully or leaves nothing behind at the supplier, the payment
//! gateway or the booking store.
//!
//! The booking saga:
//! 1. Reserve a room (priority failover across suppliers)
//! 2. Charge the payment (deduplicated per booking)
//! 3. Persist the booking row
//! 4. Stage `booking.confirmed` in the outbox
//!
//! Asynchronous payments settle later through [`PaymentWebhookService`].

pub mod booking;
pub mod error;
pub mod orchestrator;
pub mod payment_webhook;
pub mod services;
pub mod state;
pub mod step;

pub use booking::{BookingConfig, BookingContext, BookingCoordinator, BookingError, BookingReceipt};
pub use error::{Result, SagaError};
pub use orchestrator::{Saga, SagaReport};
pub use payment_webhook::{PaymentWebhookError, PaymentWebhookService, WebhookOutcome};
pub use services::{
    ChargeRequest, InMemoryPaymentGateway, PaymentError, PaymentGateway, PaymentResult,
};
pub use state::SagaState;
pub use step::{SagaStep, StepError};
