//! The persisted booking row.

use chrono::{DateTime, NaiveDate, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use super::status::{BookingStatus, PaymentStatus, Transition};
use super::types::{BookingConfirmation, BookingRequest, GuestInfo};
use super::value_objects::Money;

/// A booking as stored after the supplier hold and the payment charge.
///
/// Status fields are private so every change goes through the terminal-state
/// rules of [`PaymentStatus`] and [`BookingStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: AggregateId,
    pub hotel_id: String,
    pub room_type: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guest: GuestInfo,
    pub provider_code: String,
    pub provider_reference: String,
    pub amount: Money,
    pub currency: String,
    pub payment_id: Option<String>,
    status: BookingStatus,
    payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Builds the row from the original request, the supplier hold and the
    /// payment outcome known at persistence time.
    pub fn new(
        request: &BookingRequest,
        confirmation: &BookingConfirmation,
        payment_id: Option<String>,
        payment_status: PaymentStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: request.booking_id,
            hotel_id: request.hotel_id.clone(),
            room_type: request.room_type.clone(),
            check_in: request.check_in,
            check_out: request.check_out,
            guest: request.guest.clone(),
            provider_code: confirmation.provider_code.clone(),
            provider_reference: confirmation.provider_reference.clone(),
            amount: request.amount,
            currency: request.currency.clone(),
            payment_id,
            status: BookingStatus::from_payment(payment_status),
            payment_status,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> BookingStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    /// Applies a payment status reported by the gateway. The booking status
    /// follows the payment status when the payment transition is applied.
    pub fn apply_payment_status(&mut self, next: PaymentStatus) -> Transition<PaymentStatus> {
        let transition = self.payment_status.transition(next);
        if let Transition::Applied(status) = transition {
            self.payment_status = status;
            if let Transition::Applied(booking_status) =
                self.status.transition(BookingStatus::from_payment(status))
            {
                self.status = booking_status;
            }
            self.updated_at = Utc::now();
        }
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::types::ProviderBookingStatus;

    fn pending_booking() -> Booking {
        let request = BookingRequest {
            booking_id: AggregateId::new(),
            hotel_id: "H-1".to_string(),
            room_type: "standard".to_string(),
            check_in: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2026, 5, 2).unwrap(),
            rooms: 1,
            guest: GuestInfo {
                name: "Bo".to_string(),
                email: "bo@example.com".to_string(),
            },
            amount: Money::from_units(120),
            currency: "USD".to_string(),
        };
        let confirmation = BookingConfirmation {
            provider_code: "alpha".to_string(),
            provider_reference: "ALPHA-1".to_string(),
            status: ProviderBookingStatus::Held,
        };
        Booking::new(
            &request,
            &confirmation,
            Some("PAY-0001".to_string()),
            PaymentStatus::Pending,
        )
    }

    #[test]
    fn test_new_booking_follows_payment_status() {
        let booking = pending_booking();
        assert_eq!(booking.status(), BookingStatus::Pending);
        assert_eq!(booking.payment_status(), PaymentStatus::Pending);
        assert_eq!(booking.provider_reference, "ALPHA-1");
    }

    #[test]
    fn test_payment_success_confirms_booking() {
        let mut booking = pending_booking();
        let t = booking.apply_payment_status(PaymentStatus::Success);
        assert!(t.is_applied());
        assert_eq!(booking.status(), BookingStatus::Confirmed);
    }

    #[test]
    fn test_replayed_terminal_status_is_noop() {
        let mut booking = pending_booking();
        booking.apply_payment_status(PaymentStatus::Failed);
        let updated_at = booking.updated_at;

        let t = booking.apply_payment_status(PaymentStatus::Success);
        assert_eq!(
            t,
            Transition::Ignored {
                current: PaymentStatus::Failed
            }
        );
        assert_eq!(booking.status(), BookingStatus::Failed);
        assert_eq!(booking.updated_at, updated_at);
    }
}
