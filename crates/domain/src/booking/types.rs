//! Request/response shapes shared by every hotel supplier.

use chrono::NaiveDate;
use common::AggregateId;
use serde::{Deserialize, Serialize};

use super::value_objects::Money;
use crate::error::DomainError;

/// Availability search criteria.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub city: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    pub rooms: u32,
}

impl SearchRequest {
    /// Number of nights between check-in and check-out.
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        validate_stay(self.check_in, self.check_out)?;
        if self.guests == 0 || self.rooms == 0 {
            return Err(DomainError::Validation(
                "guests and rooms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A bookable room offer, tagged with the supplier that returned it so
/// ranking can deduplicate hotels listed by several suppliers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotelOffer {
    pub provider_code: String,
    pub hotel_id: String,
    pub name: String,
    pub room_type: String,
    pub price: Money,
    pub currency: String,
    pub available_rooms: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hotels: Vec<HotelOffer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotelDetails {
    pub provider_code: String,
    pub hotel_id: String,
    pub name: String,
    pub address: String,
    pub star_rating: Option<u8>,
    pub amenities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestInfo {
    pub name: String,
    pub email: String,
}

/// A booking request as sent to a supplier.
///
/// `booking_id` is generated by the marketplace and doubles as the supplier
/// side idempotency reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub booking_id: AggregateId,
    pub hotel_id: String,
    pub room_type: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub rooms: u32,
    pub guest: GuestInfo,
    pub amount: Money,
    pub currency: String,
}

impl BookingRequest {
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_stay(self.check_in, self.check_out)?;
        if self.rooms == 0 {
            return Err(DomainError::Validation("rooms must be at least 1".to_string()));
        }
        if !self.amount.is_positive() {
            return Err(DomainError::Validation("amount must be positive".to_string()));
        }
        if self.guest.email.trim().is_empty() {
            return Err(DomainError::Validation("guest email is required".to_string()));
        }
        Ok(())
    }
}

/// Booking state as reported by a supplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderBookingStatus {
    Held,
    Confirmed,
    Cancelled,
    Failed,
}

/// A supplier's acknowledgement of a hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub provider_code: String,
    pub provider_reference: String,
    pub status: ProviderBookingStatus,
}

fn validate_stay(check_in: NaiveDate, check_out: NaiveDate) -> Result<(), DomainError> {
    if check_out <= check_in {
        return Err(DomainError::Validation(format!(
            "check-out {check_out} must be after check-in {check_in}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn booking_request() -> BookingRequest {
        BookingRequest {
            booking_id: AggregateId::new(),
            hotel_id: "H-1".to_string(),
            room_type: "deluxe".to_string(),
            check_in: date(2026, 3, 1),
            check_out: date(2026, 3, 4),
            rooms: 1,
            guest: GuestInfo {
                name: "Ana".to_string(),
                email: "ana@example.com".to_string(),
            },
            amount: Money::from_units(300),
            currency: "USD".to_string(),
        }
    }

    #[test]
    fn test_search_nights() {
        let req = SearchRequest {
            city: "Bali".to_string(),
            check_in: date(2026, 3, 1),
            check_out: date(2026, 3, 4),
            guests: 2,
            rooms: 1,
        };
        assert_eq!(req.nights(), 3);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_search_rejects_inverted_dates() {
        let req = SearchRequest {
            city: "Bali".to_string(),
            check_in: date(2026, 3, 4),
            check_out: date(2026, 3, 4),
            guests: 2,
            rooms: 1,
        };
        assert!(matches!(req.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_booking_request_validation() {
        assert!(booking_request().validate().is_ok());

        let mut zero_amount = booking_request();
        zero_amount.amount = Money::zero();
        assert!(zero_amount.validate().is_err());

        let mut no_email = booking_request();
        no_email.guest.email = " ".to_string();
        assert!(no_email.validate().is_err());
    }
}
