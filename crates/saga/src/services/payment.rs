//! Payment gateway port and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use common::{AggregateId, Retryable};
use domain::{Money, PaymentStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A charge request sent to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    pub booking_id: AggregateId,
    pub amount: Money,
    pub currency: String,
    pub customer_email: String,
    /// Forwarded to the gateway so a retried charge is deduplicated there too.
    pub idempotency_key: String,
}

/// Result of a charge. `status` is `Pending` for asynchronous payment
/// methods that settle later through the payment webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResult {
    pub payment_id: String,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("Payment declined: {0}")]
    Declined(String),

    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Payment not found: {0}")]
    NotFound(String),
}

impl Retryable for PaymentError {
    fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::Unavailable(_))
    }
}

/// Payment gateway operations used by the booking saga.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charges the guest for a booking.
    async fn charge(&self, request: &ChargeRequest) -> Result<PaymentResult, PaymentError>;

    /// Refunds a previously made payment.
    async fn refund(&self, payment_id: &str) -> Result<(), PaymentError>;
}

#[derive(Debug)]
struct InMemoryPaymentState {
    /// Payment id to refunded flag.
    payments: HashMap<String, bool>,
    by_key: HashMap<String, PaymentResult>,
    next_id: u32,
    charge_status: PaymentStatus,
    fail_on_charge: Option<PaymentError>,
    charge_calls: u32,
}

impl Default for InMemoryPaymentState {
    fn default() -> Self {
        Self {
            payments: HashMap::new(),
            by_key: HashMap::new(),
            next_id: 0,
            charge_status: PaymentStatus::Success,
            fail_on_charge: None,
            charge_calls: 0,
        }
    }
}

/// In-memory payment gateway for testing.
///
/// Deduplicates charges on the request's idempotency key, like a real
/// gateway does.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<Mutex<InMemoryPaymentState>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every charge fail with `error` until cleared.
    pub fn set_fail_on_charge(&self, error: Option<PaymentError>) {
        self.state().fail_on_charge = error;
    }

    /// Status reported for new charges. Defaults to `Success`.
    pub fn set_charge_status(&self, status: PaymentStatus) {
        self.state().charge_status = status;
    }

    /// Number of charges received by the gateway, including failed ones.
    pub fn charge_calls(&self) -> u32 {
        self.state().charge_calls
    }

    /// Number of payments that have not been refunded.
    pub fn payment_count(&self) -> usize {
        self.state().payments.values().filter(|refunded| !**refunded).count()
    }

    pub fn has_payment(&self, payment_id: &str) -> bool {
        self.state().payments.contains_key(payment_id)
    }

    pub fn is_refunded(&self, payment_id: &str) -> bool {
        self.state()
            .payments
            .get(payment_id)
            .is_some_and(|refunded| *refunded)
    }

    fn state(&self) -> MutexGuard<'_, InMemoryPaymentState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<PaymentResult, PaymentError> {
        let mut state = self.state();
        state.charge_calls += 1;

        if let Some(error) = &state.fail_on_charge {
            return Err(error.clone());
        }
        if let Some(existing) = state.by_key.get(&request.idempotency_key) {
            return Ok(existing.clone());
        }

        state.next_id += 1;
        let payment_id = format!("PAY-{:04}", state.next_id);
        let result = PaymentResult {
            payment_id: payment_id.clone(),
            status: state.charge_status,
        };
        state.payments.insert(payment_id, false);
        state
            .by_key
            .insert(request.idempotency_key.clone(), result.clone());

        Ok(result)
    }

    async fn refund(&self, payment_id: &str) -> Result<(), PaymentError> {
        let mut state = self.state();
        match state.payments.get_mut(payment_id) {
            Some(refunded) => {
                *refunded = true;
                Ok(())
            }
            None => Err(PaymentError::NotFound(payment_id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn charge_request(key: &str) -> ChargeRequest {
        ChargeRequest {
            booking_id: AggregateId::new(),
            amount: Money::from_units(150_000),
            currency: "IDR".to_string(),
            customer_email: "guest@example.com".to_string(),
            idempotency_key: key.to_string(),
        }
    }

    #[tokio::test]
    async fn test_charge_and_refund() {
        let gateway = InMemoryPaymentGateway::new();

        let result = gateway.charge(&charge_request("k-1")).await.unwrap();
        assert!(result.payment_id.starts_with("PAY-"));
        assert_eq!(result.status, PaymentStatus::Success);
        assert_eq!(gateway.payment_count(), 1);
        assert!(gateway.has_payment(&result.payment_id));

        gateway.refund(&result.payment_id).await.unwrap();
        assert_eq!(gateway.payment_count(), 0);
        assert!(gateway.is_refunded(&result.payment_id));
    }

    #[tokio::test]
    async fn test_fail_on_charge() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.set_fail_on_charge(Some(PaymentError::Declined("insufficient funds".into())));

        let result = gateway.charge(&charge_request("k-1")).await;
        assert!(matches!(result, Err(PaymentError::Declined(_))));
        assert_eq!(gateway.payment_count(), 0);
        assert_eq!(gateway.charge_calls(), 1);
    }

    #[tokio::test]
    async fn test_same_key_is_charged_once() {
        let gateway = InMemoryPaymentGateway::new();
        let request = charge_request("payment:b-1");

        let first = gateway.charge(&request).await.unwrap();
        let second = gateway.charge(&request).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.payment_count(), 1);
    }

    #[tokio::test]
    async fn test_sequential_payment_ids() {
        let gateway = InMemoryPaymentGateway::new();

        let r1 = gateway.charge(&charge_request("a")).await.unwrap();
        let r2 = gateway.charge(&charge_request("b")).await.unwrap();

        assert_eq!(r1.payment_id, "PAY-0001");
        assert_eq!(r2.payment_id, "PAY-0002");
    }

    #[tokio::test]
    async fn test_refund_unknown_payment() {
        let gateway = InMemoryPaymentGateway::new();
        assert!(matches!(
            gateway.refund("PAY-9999").await,
            Err(PaymentError::NotFound(_))
        ));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(PaymentError::Unavailable("503".into()).is_retryable());
        assert!(!PaymentError::Declined("card".into()).is_retryable());
    }
}
