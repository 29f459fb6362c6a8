//! The hotel booking saga.
//!
//! [`BookingCoordinator`] runs `reserve_room`, `charge_payment`,
//! `persist_booking` and `stage_confirmation` as one saga behind a client
//! idempotency key.

pub mod coordinator;
pub mod error;
pub mod events;
pub mod steps;

pub use coordinator::{BookingConfig, BookingCoordinator, BookingReceipt};
pub use error::BookingError;
pub use events::{
    AGGREGATE_BOOKING, AGGREGATE_PAYMENT, BOOKING_CONFIRMED, BOOKING_ROLLED_BACK,
    BookingConfirmedEvent, BookingRolledBackEvent, PAYMENT_STATUS_CHANGED,
    PaymentStatusChangedEvent,
};
pub use steps::BookingContext;
