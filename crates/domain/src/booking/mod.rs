//! Booking aggregate, status machines and supplier-facing shapes.

mod record;
mod repository;
mod status;
mod types;
mod value_objects;

pub use record::Booking;
pub use repository::{BookingRepository, InMemoryBookingRepository};
pub use status::{BookingStatus, PaymentStatus, Transition};
pub use types::{
    BookingConfirmation, BookingRequest, GuestInfo, HotelDetails, HotelOffer,
    ProviderBookingStatus, SearchRequest, SearchResponse,
};
pub use value_objects::Money;
