//! Booking domain for the hotel marketplace coordination layer.
//!
//! Only the fields the saga, webhook and provider layers inspect live here:
//! - Payment and booking status state machines with terminal states
//! - Money and identifiers
//! - Supplier request/response shapes shared by every provider
//! - The booking row and the repository port used to persist it

pub mod booking;
pub mod error;

pub use booking::{
    Booking, BookingConfirmation, BookingRepository, BookingRequest, BookingStatus, GuestInfo,
    HotelDetails, HotelOffer, InMemoryBookingRepository, Money, PaymentStatus,
    ProviderBookingStatus, SearchRequest, SearchResponse, Transition,
};
pub use error::DomainError;
