//! The capability interface every hotel supplier implements.

use async_trait::async_trait;
use domain::{
    BookingConfirmation, BookingRequest, HotelDetails, ProviderBookingStatus, SearchRequest,
    SearchResponse,
};

use crate::error::ProviderError;

/// Uniform interface over hotel suppliers.
///
/// Implementations should treat `BookingRequest::booking_id` as their own
/// idempotency reference so a retried `create_booking` does not hold twice.
#[async_trait]
pub trait HotelProvider: Send + Sync {
    /// Unique supplier code, also used to tag offers.
    fn name(&self) -> &str;

    async fn search_availability(
        &self,
        request: &SearchRequest,
    ) -> Result<SearchResponse, ProviderError>;

    async fn get_hotel_details(&self, hotel_id: &str) -> Result<HotelDetails, ProviderError>;

    async fn create_booking(
        &self,
        request: &BookingRequest,
    ) -> Result<BookingConfirmation, ProviderError>;

    async fn cancel_booking(&self, reference: &str) -> Result<(), ProviderError>;

    async fn get_booking_status(
        &self,
        reference: &str,
    ) -> Result<ProviderBookingStatus, ProviderError>;

    async fn health_check(&self) -> Result<(), ProviderError>;
}
