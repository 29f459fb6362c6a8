//! Booking coordinator: the booking saga behind request idempotency.

use std::sync::Arc;
use std::time::Duration;

use common::{AggregateId, ShutdownSignal};
use domain::{Booking, BookingRepository, BookingRequest, BookingStatus, PaymentStatus};
use idempotency::{IdempotencyConfig, IdempotencyManager};
use outbox::Outbox;
use providers::ProviderRegistry;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::booking::error::BookingError;
use crate::booking::events::{AGGREGATE_BOOKING, BOOKING_ROLLED_BACK, BookingRolledBackEvent};
use crate::booking::steps::{
    BookingContext, ChargePayment, PersistBooking, ReserveRoom, SAGA_NAME, StageConfirmation,
};
use crate::error::SagaError;
use crate::orchestrator::Saga;
use crate::services::payment::{PaymentError, PaymentGateway, PaymentResult};

#[derive(Debug, Clone)]
pub struct BookingConfig {
    /// How long a client idempotency key replays its first outcome.
    pub request_ttl: Duration,
    /// How long a booking's charge is deduplicated.
    pub payment_ttl: Duration,
    pub idempotency: IdempotencyConfig,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            request_ttl: Duration::from_secs(24 * 60 * 60),
            payment_ttl: Duration::from_secs(24 * 60 * 60),
            idempotency: IdempotencyConfig::default(),
        }
    }
}

impl BookingConfig {
    pub fn with_request_ttl(mut self, ttl: Duration) -> Self {
        self.request_ttl = ttl;
        self
    }

    pub fn with_idempotency(mut self, config: IdempotencyConfig) -> Self {
        self.idempotency = config;
        self
    }
}

/// What a successful booking returns to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingReceipt {
    pub booking_id: AggregateId,
    pub provider_code: String,
    pub provider_reference: String,
    pub payment_id: Option<String>,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub amount: String,
    pub currency: String,
}

impl From<&Booking> for BookingReceipt {
    fn from(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id,
            provider_code: booking.provider_code.clone(),
            provider_reference: booking.provider_reference.clone(),
            payment_id: booking.payment_id.clone(),
            status: booking.status(),
            payment_status: booking.payment_status(),
            amount: booking.amount.to_decimal_string(),
            currency: booking.currency.clone(),
        }
    }
}

/// Runs booking requests through the booking saga.
///
/// A request either produces a [`BookingReceipt`] or a [`BookingError`]
/// after every completed step was undone. A client retrying with the same
/// idempotency key gets the first outcome back without a second run.
pub struct BookingCoordinator {
    saga: Saga<BookingContext>,
    requests: IdempotencyManager<BookingReceipt, BookingError>,
    payments: IdempotencyManager<PaymentResult, PaymentError>,
    bookings: Arc<dyn BookingRepository>,
    outbox: Outbox,
    config: BookingConfig,
}

impl BookingCoordinator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        gateway: Arc<dyn PaymentGateway>,
        bookings: Arc<dyn BookingRepository>,
        outbox: Outbox,
        config: BookingConfig,
    ) -> Self {
        let payments = IdempotencyManager::new(config.idempotency.clone());
        let saga = Saga::new(SAGA_NAME)
            .step(ReserveRoom::new(registry))
            .step(ChargePayment::new(
                gateway,
                payments.clone(),
                config.payment_ttl,
            ))
            .step(PersistBooking::new(Arc::clone(&bookings)))
            .step(StageConfirmation::new(outbox.clone()));

        Self {
            saga,
            requests: IdempotencyManager::new(config.idempotency.clone()),
            payments,
            bookings,
            outbox,
            config,
        }
    }

    pub fn saga(&self) -> &Saga<BookingContext> {
        &self.saga
    }

    #[tracing::instrument(skip(self, request), fields(booking_id = %request.booking_id))]
    pub async fn create_booking(
        &self,
        idempotency_key: &str,
        request: BookingRequest,
    ) -> Result<BookingReceipt, BookingError> {
        if idempotency_key.trim().is_empty() {
            return Err(BookingError::Invalid(
                "idempotency key must not be empty".to_string(),
            ));
        }
        request
            .validate()
            .map_err(|e| BookingError::Invalid(e.to_string()))?;

        let key = format!("booking-create:{idempotency_key}");
        self.requests
            .execute(&key, self.config.request_ttl, || self.run(request))
            .await
    }

    pub async fn get_booking(&self, id: AggregateId) -> Result<Booking, BookingError> {
        self.bookings
            .get(id)
            .await
            .map_err(|e| BookingError::Internal(e.to_string()))?
            .ok_or(BookingError::NotFound(id))
    }

    /// Starts the eviction sweeps of both idempotency caches.
    pub fn spawn_sweepers(&self, signal: ShutdownSignal) -> Vec<JoinHandle<()>> {
        vec![
            self.requests.spawn_sweeper(signal.clone()),
            self.payments.spawn_sweeper(signal),
        ]
    }

    async fn run(&self, request: BookingRequest) -> Result<BookingReceipt, BookingError> {
        let booking_id = request.booking_id;
        let mut ctx = BookingContext::new(request);

        match self.saga.execute(&mut ctx).await {
            Ok(_) => {
                let booking = ctx.booking.ok_or_else(|| {
                    BookingError::Internal("saga completed without a booking".to_string())
                })?;
                tracing::info!(
                    provider = %booking.provider_code,
                    reference = %booking.provider_reference,
                    status = %booking.status(),
                    "booking confirmed"
                );
                Ok(BookingReceipt::from(&booking))
            }
            Err(error) => {
                self.stage_rollback(booking_id, &error).await;
                Err(BookingError::from_saga(error, booking_id))
            }
        }
    }

    async fn stage_rollback(&self, booking_id: AggregateId, error: &SagaError) {
        let event = match error {
            SagaError::StepFailed {
                step,
                error,
                compensated,
            } => BookingRolledBackEvent {
                booking_id,
                failed_step: step.clone(),
                reason: error.to_string(),
                compensated_steps: compensated.clone(),
                requires_manual_intervention: false,
            },
            SagaError::CompensationFailed {
                failed_step,
                failed_reason,
                compensated,
                ..
            } => BookingRolledBackEvent {
                booking_id,
                failed_step: failed_step.clone(),
                reason: failed_reason.clone(),
                compensated_steps: compensated.clone(),
                requires_manual_intervention: true,
            },
            SagaError::Empty(_) => return,
        };

        if let Err(e) = self
            .outbox
            .add(AGGREGATE_BOOKING, booking_id, BOOKING_ROLLED_BACK, &event)
            .await
        {
            tracing::warn!(%booking_id, error = %e, "failed to stage rollback event");
        }
    }
}
