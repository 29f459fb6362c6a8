//! Outbox payloads staged by the booking saga and the payment webhook.

use chrono::NaiveDate;
use common::AggregateId;
use domain::{Booking, BookingStatus, PaymentStatus};
use serde::{Deserialize, Serialize};

pub const AGGREGATE_BOOKING: &str = "booking";
pub const AGGREGATE_PAYMENT: &str = "payment";

pub const BOOKING_CONFIRMED: &str = "booking.confirmed";
pub const BOOKING_ROLLED_BACK: &str = "booking.rolled_back";
pub const PAYMENT_STATUS_CHANGED: &str = "payment.status_changed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfirmedEvent {
    pub booking_id: AggregateId,
    pub provider_code: String,
    pub provider_reference: String,
    pub hotel_id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub amount: String,
    pub currency: String,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_id: Option<String>,
    pub guest_email: String,
}

impl From<&Booking> for BookingConfirmedEvent {
    fn from(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id,
            provider_code: booking.provider_code.clone(),
            provider_reference: booking.provider_reference.clone(),
            hotel_id: booking.hotel_id.clone(),
            check_in: booking.check_in,
            check_out: booking.check_out,
            amount: booking.amount.to_decimal_string(),
            currency: booking.currency.clone(),
            status: booking.status(),
            payment_status: booking.payment_status(),
            payment_id: booking.payment_id.clone(),
            guest_email: booking.guest.email.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRolledBackEvent {
    pub booking_id: AggregateId,
    pub failed_step: String,
    pub reason: String,
    pub compensated_steps: Vec<String>,
    pub requires_manual_intervention: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatusChangedEvent {
    pub booking_id: AggregateId,
    pub previous: PaymentStatus,
    pub payment_status: PaymentStatus,
    pub booking_status: BookingStatus,
    pub transaction_id: Option<String>,
}
