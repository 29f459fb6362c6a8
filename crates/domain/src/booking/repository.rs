//! Booking persistence port and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use tokio::sync::RwLock;

use super::record::Booking;
use crate::error::DomainError;

/// Narrow persistence interface the coordination layer writes bookings through.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Inserts a new booking. Fails if the id is already present.
    async fn insert(&self, booking: Booking) -> Result<(), DomainError>;

    /// Loads a booking by id.
    async fn get(&self, id: AggregateId) -> Result<Option<Booking>, DomainError>;

    /// Replaces an existing booking.
    async fn update(&self, booking: Booking) -> Result<(), DomainError>;

    /// Removes a booking, returning whether it existed.
    async fn delete(&self, id: AggregateId) -> Result<bool, DomainError>;
}

/// In-memory booking repository for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBookingRepository {
    rows: Arc<RwLock<HashMap<AggregateId, Booking>>>,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored bookings.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn insert(&self, booking: Booking) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&booking.id) {
            return Err(DomainError::BookingAlreadyExists(booking.id));
        }
        rows.insert(booking.id, booking);
        Ok(())
    }

    async fn get(&self, id: AggregateId) -> Result<Option<Booking>, DomainError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn update(&self, booking: Booking) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&booking.id) {
            Some(row) => {
                *row = booking;
                Ok(())
            }
            None => Err(DomainError::BookingNotFound(booking.id)),
        }
    }

    async fn delete(&self, id: AggregateId) -> Result<bool, DomainError> {
        Ok(self.rows.write().await.remove(&id).is_some())
    }
}
