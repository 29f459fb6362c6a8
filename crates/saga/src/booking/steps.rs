//! Steps of the booking saga.
//!
//! ```text
//! reserve_room ──► charge_payment ──► persist_booking ──► stage_confirmation
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::AggregateId;
use domain::{
    Booking, BookingConfirmation, BookingRepository, BookingRequest, DomainError, PaymentStatus,
};
use idempotency::IdempotencyManager;
use outbox::Outbox;
use providers::{ProviderError, ProviderRegistry, RegistryError};

use crate::booking::events::{AGGREGATE_BOOKING, BOOKING_CONFIRMED, BookingConfirmedEvent};
use crate::services::payment::{ChargeRequest, PaymentError, PaymentGateway, PaymentResult};
use crate::step::{SagaStep, StepError};

pub const SAGA_NAME: &str = "booking";
pub const RESERVE_ROOM: &str = "reserve_room";
pub const CHARGE_PAYMENT: &str = "charge_payment";
pub const PERSIST_BOOKING: &str = "persist_booking";
pub const STAGE_CONFIRMATION: &str = "stage_confirmation";

/// State threaded through the booking saga.
#[derive(Debug, Clone)]
pub struct BookingContext {
    pub request: BookingRequest,
    pub confirmation: Option<BookingConfirmation>,
    pub payment: Option<PaymentResult>,
    pub booking: Option<Booking>,
}

impl BookingContext {
    pub fn new(request: BookingRequest) -> Self {
        Self {
            request,
            confirmation: None,
            payment: None,
            booking: None,
        }
    }
}

/// Gateway-side and cache-side idempotency key for a booking's charge.
pub fn payment_key(booking_id: AggregateId) -> String {
    format!("payment:{booking_id}")
}

/// Holds a room through priority failover.
pub struct ReserveRoom {
    registry: Arc<ProviderRegistry>,
}

impl ReserveRoom {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// Best-effort release of a hold whose outcome is unknown.
    async fn release_uncertain_hold(
        &self,
        booking_id: AggregateId,
        provider: &str,
        reference: Option<&str>,
    ) {
        let Some(reference) = reference else {
            tracing::error!(
                %booking_id,
                provider,
                requires_manual_intervention = true,
                "provider may hold a room but returned no reference to cancel"
            );
            return;
        };
        match self.registry.cancel_booking(provider, reference).await {
            Ok(()) => tracing::info!(%booking_id, provider, reference, "uncertain hold released"),
            Err(e) => tracing::error!(
                %booking_id,
                provider,
                reference,
                error = %e,
                requires_manual_intervention = true,
                "failed to release uncertain hold"
            ),
        }
    }
}

#[async_trait]
impl SagaStep<BookingContext> for ReserveRoom {
    fn name(&self) -> &'static str {
        RESERVE_ROOM
    }

    async fn execute(&self, ctx: &mut BookingContext) -> Result<(), StepError> {
        match self.registry.create_booking_with_fallback(&ctx.request).await {
            Ok(confirmation) => {
                ctx.confirmation = Some(confirmation);
                Ok(())
            }
            Err(error) => {
                if let RegistryError::HoldUncertain {
                    provider,
                    reference,
                    ..
                } = &error
                {
                    self.release_uncertain_hold(ctx.request.booking_id, provider, reference.as_deref())
                        .await;
                }
                Err(StepError::from_source(error))
            }
        }
    }

    async fn compensate(&self, ctx: &mut BookingContext) -> Result<(), StepError> {
        let Some(confirmation) = &ctx.confirmation else {
            return Ok(());
        };
        match self
            .registry
            .cancel_booking(&confirmation.provider_code, &confirmation.provider_reference)
            .await
        {
            Ok(()) => Ok(()),
            // Nothing held, nothing to undo.
            Err(RegistryError::Provider {
                source: ProviderError::NotFound(_),
                ..
            }) => {
                tracing::warn!(
                    provider = %confirmation.provider_code,
                    reference = %confirmation.provider_reference,
                    "hold already gone at provider"
                );
                Ok(())
            }
            Err(e) => Err(StepError::from_source(e)),
        }
    }
}

/// Charges the guest through the idempotency manager so a retried saga
/// never charges twice.
pub struct ChargePayment {
    payments: Arc<dyn PaymentGateway>,
    idempotency: IdempotencyManager<PaymentResult, PaymentError>,
    ttl: Duration,
}

impl ChargePayment {
    pub fn new(
        payments: Arc<dyn PaymentGateway>,
        idempotency: IdempotencyManager<PaymentResult, PaymentError>,
        ttl: Duration,
    ) -> Self {
        Self {
            payments,
            idempotency,
            ttl,
        }
    }
}

#[async_trait]
impl SagaStep<BookingContext> for ChargePayment {
    fn name(&self) -> &'static str {
        CHARGE_PAYMENT
    }

    async fn execute(&self, ctx: &mut BookingContext) -> Result<(), StepError> {
        let key = payment_key(ctx.request.booking_id);
        let charge = ChargeRequest {
            booking_id: ctx.request.booking_id,
            amount: ctx.request.amount,
            currency: ctx.request.currency.clone(),
            customer_email: ctx.request.guest.email.clone(),
            idempotency_key: key.clone(),
        };

        let result = self
            .idempotency
            .execute(&key, self.ttl, || self.payments.charge(&charge))
            .await
            .map_err(StepError::from_source)?;

        if matches!(result.status, PaymentStatus::Failed | PaymentStatus::Cancelled) {
            return Err(StepError::new(format!(
                "payment {} ended {}",
                result.payment_id, result.status
            )));
        }

        tracing::info!(payment_id = %result.payment_id, status = %result.status, "payment charged");
        ctx.payment = Some(result);
        Ok(())
    }

    async fn compensate(&self, ctx: &mut BookingContext) -> Result<(), StepError> {
        let Some(payment) = &ctx.payment else {
            return Ok(());
        };
        self.payments
            .refund(&payment.payment_id)
            .await
            .map_err(StepError::from_source)?;
        self.idempotency.invalidate(&payment_key(ctx.request.booking_id));
        tracing::info!(payment_id = %payment.payment_id, "payment refunded");
        Ok(())
    }
}

/// Writes the booking row.
pub struct PersistBooking {
    bookings: Arc<dyn BookingRepository>,
}

impl PersistBooking {
    pub fn new(bookings: Arc<dyn BookingRepository>) -> Self {
        Self { bookings }
    }
}

#[async_trait]
impl SagaStep<BookingContext> for PersistBooking {
    fn name(&self) -> &'static str {
        PERSIST_BOOKING
    }

    async fn execute(&self, ctx: &mut BookingContext) -> Result<(), StepError> {
        let (Some(confirmation), Some(payment)) = (&ctx.confirmation, &ctx.payment) else {
            return Err(StepError::new("no supplier hold or payment to persist"));
        };
        let booking = Booking::new(
            &ctx.request,
            confirmation,
            Some(payment.payment_id.clone()),
            payment.status,
        );

        match self.bookings.insert(booking.clone()).await {
            Ok(()) => {
                ctx.booking = Some(booking);
                Ok(())
            }
            // A retried saga finds the row it wrote last time.
            Err(DomainError::BookingAlreadyExists(id)) => {
                let existing = self
                    .bookings
                    .get(id)
                    .await
                    .map_err(StepError::from_source)?
                    .ok_or_else(|| StepError::new(format!("booking {id} vanished")))?;
                ctx.booking = Some(existing);
                Ok(())
            }
            Err(e) => Err(StepError::from_source(e)),
        }
    }

    async fn compensate(&self, ctx: &mut BookingContext) -> Result<(), StepError> {
        self.bookings
            .delete(ctx.request.booking_id)
            .await
            .map_err(StepError::from_source)?;
        ctx.booking = None;
        Ok(())
    }
}

/// Stages `booking.confirmed` in the outbox.
pub struct StageConfirmation {
    outbox: Outbox,
}

impl StageConfirmation {
    pub fn new(outbox: Outbox) -> Self {
        Self { outbox }
    }
}

#[async_trait]
impl SagaStep<BookingContext> for StageConfirmation {
    fn name(&self) -> &'static str {
        STAGE_CONFIRMATION
    }

    async fn execute(&self, ctx: &mut BookingContext) -> Result<(), StepError> {
        let Some(booking) = &ctx.booking else {
            return Err(StepError::new("no booking to confirm"));
        };
        self.outbox
            .add(
                AGGREGATE_BOOKING,
                booking.id,
                BOOKING_CONFIRMED,
                &BookingConfirmedEvent::from(booking),
            )
            .await
            .map_err(StepError::from_source)?;
        Ok(())
    }

    async fn compensate(&self, _ctx: &mut BookingContext) -> Result<(), StepError> {
        // Last step: never compensated, its failure is the trigger.
        Ok(())
    }
}
