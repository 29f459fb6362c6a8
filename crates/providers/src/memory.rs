//! In-memory supplier for tests and local runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use common::AggregateId;
use domain::{
    BookingConfirmation, BookingRequest, HotelDetails, HotelOffer, ProviderBookingStatus,
    SearchRequest, SearchResponse,
};

use crate::error::ProviderError;
use crate::provider::HotelProvider;

#[derive(Debug)]
struct InMemoryProviderState {
    offers: Vec<HotelOffer>,
    bookings: HashMap<String, ProviderBookingStatus>,
    references: HashMap<AggregateId, String>,
    next_id: u32,
    healthy: bool,
    health_delay: Option<Duration>,
    create_delay: Option<Duration>,
    fail_on_search: Option<ProviderError>,
    fail_on_create: Option<ProviderError>,
    fail_on_cancel: Option<ProviderError>,
    create_calls: u32,
    cancel_calls: u32,
}

impl Default for InMemoryProviderState {
    fn default() -> Self {
        Self {
            offers: Vec::new(),
            bookings: HashMap::new(),
            references: HashMap::new(),
            next_id: 0,
            healthy: true,
            health_delay: None,
            create_delay: None,
            fail_on_search: None,
            fail_on_create: None,
            fail_on_cancel: None,
            create_calls: 0,
            cancel_calls: 0,
        }
    }
}

/// In-memory hotel supplier with switchable failure modes.
///
/// `create_booking` is idempotent per `booking_id`, like a real supplier
/// keyed on the marketplace reference.
#[derive(Debug, Clone)]
pub struct InMemoryProvider {
    name: String,
    state: Arc<Mutex<InMemoryProviderState>>,
}

impl InMemoryProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(InMemoryProviderState::default())),
        }
    }

    /// Adds an offer returned by every search.
    pub fn with_offer(self, offer: HotelOffer) -> Self {
        self.state().offers.push(offer);
        self
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state().healthy = healthy;
    }

    pub fn set_health_delay(&self, delay: Option<Duration>) {
        self.state().health_delay = delay;
    }

    pub fn set_create_delay(&self, delay: Option<Duration>) {
        self.state().create_delay = delay;
    }

    pub fn set_fail_on_search(&self, error: Option<ProviderError>) {
        self.state().fail_on_search = error;
    }

    pub fn set_fail_on_create(&self, error: Option<ProviderError>) {
        self.state().fail_on_create = error;
    }

    pub fn set_fail_on_cancel(&self, error: Option<ProviderError>) {
        self.state().fail_on_cancel = error;
    }

    /// Number of `create_booking` calls received, including failed ones.
    pub fn create_calls(&self) -> u32 {
        self.state().create_calls
    }

    pub fn cancel_calls(&self) -> u32 {
        self.state().cancel_calls
    }

    /// Number of holds that are not cancelled.
    pub fn active_bookings(&self) -> usize {
        self.state()
            .bookings
            .values()
            .filter(|s| matches!(s, ProviderBookingStatus::Held | ProviderBookingStatus::Confirmed))
            .count()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryProviderState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl HotelProvider for InMemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search_availability(
        &self,
        request: &SearchRequest,
    ) -> Result<SearchResponse, ProviderError> {
        let state = self.state();
        if let Some(error) = &state.fail_on_search {
            return Err(error.clone());
        }
        let hotels = state
            .offers
            .iter()
            .filter(|offer| offer.available_rooms >= request.rooms)
            .cloned()
            .map(|mut offer| {
                offer.provider_code = self.name.clone();
                offer
            })
            .collect();
        Ok(SearchResponse { hotels })
    }

    /// Details are derived from the first offer for the hotel.
    async fn get_hotel_details(&self, hotel_id: &str) -> Result<HotelDetails, ProviderError> {
        self.state()
            .offers
            .iter()
            .find(|offer| offer.hotel_id == hotel_id)
            .map(|offer| HotelDetails {
                provider_code: self.name.clone(),
                hotel_id: offer.hotel_id.clone(),
                name: offer.name.clone(),
                address: String::new(),
                star_rating: None,
                amenities: Vec::new(),
            })
            .ok_or_else(|| ProviderError::NotFound(hotel_id.to_string()))
    }

    async fn create_booking(
        &self,
        request: &BookingRequest,
    ) -> Result<BookingConfirmation, ProviderError> {
        let delay = {
            let mut state = self.state();
            state.create_calls += 1;
            state.create_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if let Some(error) = &state.fail_on_create {
            return Err(error.clone());
        }

        let reference = match state.references.get(&request.booking_id) {
            Some(existing) => existing.clone(),
            None => {
                state.next_id += 1;
                let reference = format!("{}-{:04}", self.name.to_uppercase(), state.next_id);
                state
                    .references
                    .insert(request.booking_id, reference.clone());
                state
                    .bookings
                    .insert(reference.clone(), ProviderBookingStatus::Held);
                reference
            }
        };

        Ok(BookingConfirmation {
            provider_code: self.name.clone(),
            provider_reference: reference,
            status: ProviderBookingStatus::Held,
        })
    }

    async fn cancel_booking(&self, reference: &str) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.cancel_calls += 1;
        if let Some(error) = &state.fail_on_cancel {
            return Err(error.clone());
        }
        match state.bookings.get_mut(reference) {
            Some(status) => {
                *status = ProviderBookingStatus::Cancelled;
                Ok(())
            }
            None => Err(ProviderError::NotFound(reference.to_string())),
        }
    }

    async fn get_booking_status(
        &self,
        reference: &str,
    ) -> Result<ProviderBookingStatus, ProviderError> {
        self.state()
            .bookings
            .get(reference)
            .copied()
            .ok_or_else(|| ProviderError::NotFound(reference.to_string()))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        let (healthy, delay) = {
            let state = self.state();
            (state.healthy, state.health_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if healthy {
            Ok(())
        } else {
            Err(ProviderError::Unhealthy(format!("{} is down", self.name)))
        }
    }
}
