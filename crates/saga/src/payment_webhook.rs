//! Resumes bookings from payment gateway notifications.

use std::sync::Arc;

use common::AggregateId;
use domain::{BookingRepository, BookingStatus, DomainError, PaymentStatus, Transition};
use outbox::{Outbox, OutboxError, OutboxEvent};
use providers::ProviderRegistry;
use serde::Serialize;
use thiserror::Error;
use webhook::PaymentNotification;

use crate::booking::events::{AGGREGATE_PAYMENT, PAYMENT_STATUS_CHANGED, PaymentStatusChangedEvent};

#[derive(Debug, Error)]
pub enum PaymentWebhookError {
    #[error("Invalid payment notification signature")]
    InvalidSignature,

    #[error("Unknown transaction status: {0}")]
    UnknownStatus(String),

    #[error("Invalid order id: {0}")]
    InvalidOrderId(String),

    #[error("Booking not found: {0}")]
    BookingNotFound(AggregateId),

    #[error(transparent)]
    Storage(#[from] DomainError),

    #[error(transparent)]
    Outbox(#[from] OutboxError),
}

/// What a notification did to its booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied {
        booking_id: AggregateId,
        payment_status: PaymentStatus,
        booking_status: BookingStatus,
    },
    /// Replay, or a notification after the payment already settled.
    Ignored {
        booking_id: AggregateId,
        current: PaymentStatus,
    },
}

/// Applies verified payment notifications to booking rows.
///
/// Notifications for the same payment may arrive more than once and out of
/// order. Only `Pending` can move, so a replay or a late notification leaves
/// the booking untouched and stages nothing.
pub struct PaymentWebhookService {
    bookings: Arc<dyn BookingRepository>,
    outbox: Outbox,
    server_key: String,
    registry: Option<Arc<ProviderRegistry>>,
    // Serializes read-modify-write of booking rows.
    apply_lock: tokio::sync::Mutex<()>,
}

impl PaymentWebhookService {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        outbox: Outbox,
        server_key: impl Into<String>,
    ) -> Self {
        Self {
            bookings,
            outbox,
            server_key: server_key.into(),
            registry: None,
            apply_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Releases the supplier hold when a payment fails or is cancelled.
    pub fn with_registry(mut self, registry: Arc<ProviderRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    #[tracing::instrument(skip(self, notification), fields(order_id = %notification.order_id))]
    pub async fn handle(
        &self,
        notification: &PaymentNotification,
    ) -> Result<WebhookOutcome, PaymentWebhookError> {
        if !notification.verify(&self.server_key) {
            tracing::warn!("payment notification rejected: bad signature");
            return Err(PaymentWebhookError::InvalidSignature);
        }
        let booking_id: AggregateId = notification
            .order_id
            .parse()
            .map_err(|_| PaymentWebhookError::InvalidOrderId(notification.order_id.clone()))?;
        let next = notification.payment_status().ok_or_else(|| {
            PaymentWebhookError::UnknownStatus(notification.transaction_status.clone())
        })?;

        let _guard = self.apply_lock.lock().await;

        let mut booking = self
            .bookings
            .get(booking_id)
            .await?
            .ok_or(PaymentWebhookError::BookingNotFound(booking_id))?;
        let previous = booking.payment_status();

        let payment_status = match booking.apply_payment_status(next) {
            Transition::Applied(status) => status,
            Transition::Ignored { current } => {
                tracing::info!(%booking_id, %current, requested = %next, "payment notification ignored");
                return Ok(WebhookOutcome::Ignored {
                    booking_id,
                    current,
                });
            }
        };

        // Everything fallible happens before the write, so a stored status
        // change always has its event staged.
        let event = OutboxEvent::builder()
            .aggregate_type(AGGREGATE_PAYMENT)
            .aggregate_id(booking_id)
            .event_type(PAYMENT_STATUS_CHANGED)
            .payload(&PaymentStatusChangedEvent {
                booking_id,
                previous,
                payment_status,
                booking_status: booking.status(),
                transaction_id: notification.transaction_id.clone(),
            })?
            .build()?;
        self.bookings.update(booking.clone()).await?;
        self.outbox.add_event(event).await;

        tracing::info!(
            %booking_id,
            %previous,
            %payment_status,
            booking_status = %booking.status(),
            "payment status applied"
        );

        if matches!(booking.status(), BookingStatus::Failed | BookingStatus::Cancelled) {
            self.release_hold(&booking.provider_code, &booking.provider_reference)
                .await;
        }

        Ok(WebhookOutcome::Applied {
            booking_id,
            payment_status,
            booking_status: booking.status(),
        })
    }

    async fn release_hold(&self, provider: &str, reference: &str) {
        let Some(registry) = &self.registry else {
            return;
        };
        if let Err(e) = registry.cancel_booking(provider, reference).await {
            tracing::error!(
                provider,
                reference,
                error = %e,
                requires_manual_intervention = true,
                "failed to release hold after payment failure"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use domain::{
        Booking, BookingConfirmation, BookingRequest, GuestInfo, InMemoryBookingRepository, Money,
        ProviderBookingStatus,
    };
    use webhook::midtrans_signature;

    use super::*;

    const SERVER_KEY: &str = "SB-Mid-server-test";

    async fn pending_booking(repo: &InMemoryBookingRepository) -> AggregateId {
        let request = BookingRequest {
            booking_id: AggregateId::new(),
            hotel_id: "H-1".to_string(),
            room_type: "standard".to_string(),
            check_in: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2026, 8, 2).unwrap(),
            rooms: 1,
            guest: GuestInfo {
                name: "Budi".to_string(),
                email: "budi@example.com".to_string(),
            },
            amount: Money::from_units(500_000),
            currency: "IDR".to_string(),
        };
        let confirmation = BookingConfirmation {
            provider_code: "alpha".to_string(),
            provider_reference: "ALPHA-0001".to_string(),
            status: ProviderBookingStatus::Held,
        };
        let booking = Booking::new(
            &request,
            &confirmation,
            Some("PAY-0001".to_string()),
            PaymentStatus::Pending,
        );
        let id = booking.id;
        repo.insert(booking).await.unwrap();
        id
    }

    fn notification(order_id: AggregateId, status: &str) -> PaymentNotification {
        let order_id = order_id.to_string();
        let signature_key = midtrans_signature(&order_id, "200", "500000.00", SERVER_KEY);
        PaymentNotification {
            order_id,
            transaction_id: Some("tx-1".to_string()),
            transaction_status: status.to_string(),
            status_code: "200".to_string(),
            gross_amount: "500000.00".to_string(),
            signature_key,
            fraud_status: None,
            payment_type: Some("bank_transfer".to_string()),
        }
    }

    fn service(repo: &InMemoryBookingRepository, outbox: &Outbox) -> PaymentWebhookService {
        PaymentWebhookService::new(Arc::new(repo.clone()), outbox.clone(), SERVER_KEY)
    }

    #[tokio::test]
    async fn test_settlement_confirms_booking() {
        let repo = InMemoryBookingRepository::new();
        let outbox = Outbox::new();
        let id = pending_booking(&repo).await;

        let outcome = service(&repo, &outbox)
            .handle(&notification(id, "settlement"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::Applied {
                booking_id: id,
                payment_status: PaymentStatus::Success,
                booking_status: BookingStatus::Confirmed,
            }
        );
        let stored = repo.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status(), BookingStatus::Confirmed);
        let pending = outbox.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_type, PAYMENT_STATUS_CHANGED);
    }

    #[tokio::test]
    async fn test_replay_is_noop() {
        let repo = InMemoryBookingRepository::new();
        let outbox = Outbox::new();
        let id = pending_booking(&repo).await;
        let service = service(&repo, &outbox);
        let settlement = notification(id, "settlement");

        service.handle(&settlement).await.unwrap();
        let replay = service.handle(&settlement).await.unwrap();
        let late_failure = service.handle(&notification(id, "deny")).await.unwrap();

        assert_eq!(
            replay,
            WebhookOutcome::Ignored {
                booking_id: id,
                current: PaymentStatus::Success,
            }
        );
        assert!(matches!(late_failure, WebhookOutcome::Ignored { .. }));
        assert_eq!(outbox.len().await, 1);
        assert_eq!(
            repo.get(id).await.unwrap().unwrap().status(),
            BookingStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn test_bad_signature_rejected() {
        let repo = InMemoryBookingRepository::new();
        let outbox = Outbox::new();
        let id = pending_booking(&repo).await;
        let mut forged = notification(id, "settlement");
        forged.gross_amount = "1.00".to_string();

        let result = service(&repo, &outbox).handle(&forged).await;

        assert!(matches!(result, Err(PaymentWebhookError::InvalidSignature)));
        assert_eq!(
            repo.get(id).await.unwrap().unwrap().payment_status(),
            PaymentStatus::Pending
        );
        assert!(outbox.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_booking() {
        let repo = InMemoryBookingRepository::new();
        let outbox = Outbox::new();
        let id = AggregateId::new();

        let result = service(&repo, &outbox)
            .handle(&notification(id, "settlement"))
            .await;

        assert!(matches!(result, Err(PaymentWebhookError::BookingNotFound(found)) if found == id));
    }

    #[tokio::test]
    async fn test_unknown_status() {
        let repo = InMemoryBookingRepository::new();
        let outbox = Outbox::new();
        let id = pending_booking(&repo).await;

        let result = service(&repo, &outbox)
            .handle(&notification(id, "chargeback"))
            .await;

        assert!(matches!(result, Err(PaymentWebhookError::UnknownStatus(_))));
    }

    #[tokio::test]
    async fn test_concurrent_notifications_apply_once() {
        let repo = InMemoryBookingRepository::new();
        let outbox = Outbox::new();
        let id = pending_booking(&repo).await;
        let service = Arc::new(service(&repo, &outbox));

        let handles: Vec<_> = ["settlement", "expire", "settlement", "deny"]
            .into_iter()
            .map(|status| {
                let service = Arc::clone(&service);
                let n = notification(id, status);
                tokio::spawn(async move { service.handle(&n).await.unwrap() })
            })
            .collect();

        let mut applied = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), WebhookOutcome::Applied { .. }) {
                applied += 1;
            }
        }

        assert_eq!(applied, 1);
        assert_eq!(outbox.len().await, 1);
    }

    struct FlakyRepository {
        inner: InMemoryBookingRepository,
        fail_updates: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl BookingRepository for FlakyRepository {
        async fn insert(&self, booking: Booking) -> Result<(), DomainError> {
            self.inner.insert(booking).await
        }

        async fn get(&self, id: AggregateId) -> Result<Option<Booking>, DomainError> {
            self.inner.get(id).await
        }

        async fn update(&self, booking: Booking) -> Result<(), DomainError> {
            if self.fail_updates.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(DomainError::Validation("storage unavailable".to_string()));
            }
            self.inner.update(booking).await
        }

        async fn delete(&self, id: AggregateId) -> Result<bool, DomainError> {
            self.inner.delete(id).await
        }
    }

    #[tokio::test]
    async fn test_failed_write_stages_nothing_and_retry_applies() {
        let inner = InMemoryBookingRepository::new();
        let outbox = Outbox::new();
        let id = pending_booking(&inner).await;
        let repo = Arc::new(FlakyRepository {
            inner: inner.clone(),
            fail_updates: std::sync::atomic::AtomicBool::new(true),
        });
        let service = PaymentWebhookService::new(repo.clone(), outbox.clone(), SERVER_KEY);
        let settlement = notification(id, "settlement");

        let err = service.handle(&settlement).await.unwrap_err();
        assert!(matches!(err, PaymentWebhookError::Storage(_)));
        assert!(outbox.is_empty().await);
        let stored = inner.get(id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status(), PaymentStatus::Pending);

        repo.fail_updates
            .store(false, std::sync::atomic::Ordering::SeqCst);
        let retried = service.handle(&settlement).await.unwrap();

        assert!(matches!(retried, WebhookOutcome::Applied { .. }));
        assert_eq!(outbox.len().await, 1);
    }
}
