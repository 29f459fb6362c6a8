//! External service ports and in-memory implementations for saga steps.

pub mod payment;

pub use payment::{ChargeRequest, InMemoryPaymentGateway, PaymentError, PaymentGateway, PaymentResult};
