//! Inbound payment gateway notifications.

use domain::PaymentStatus;
use serde::{Deserialize, Serialize};

use crate::signature::verify_midtrans_signature;

/// Payment notification as posted by the gateway (Midtrans shape).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentNotification {
    /// The booking id the charge was created for.
    pub order_id: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
    pub transaction_status: String,
    pub status_code: String,
    pub gross_amount: String,
    #[serde(default)]
    pub signature_key: String,
    #[serde(default)]
    pub fraud_status: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
}

impl PaymentNotification {
    /// Verifies `signature_key` against the merchant server key.
    pub fn verify(&self, server_key: &str) -> bool {
        verify_midtrans_signature(
            &self.order_id,
            &self.status_code,
            &self.gross_amount,
            server_key,
            &self.signature_key,
        )
    }

    /// Maps the gateway transaction status onto [`PaymentStatus`].
    ///
    /// A capture flagged `challenge` by fraud screening stays pending.
    /// Unknown statuses map to `None`.
    pub fn payment_status(&self) -> Option<PaymentStatus> {
        let status = match self.transaction_status.as_str() {
            "capture" => match self.fraud_status.as_deref() {
                Some("challenge") => PaymentStatus::Pending,
                Some("deny") => PaymentStatus::Failed,
                _ => PaymentStatus::Success,
            },
            "settlement" => PaymentStatus::Success,
            "pending" | "authorize" => PaymentStatus::Pending,
            "deny" | "failure" => PaymentStatus::Failed,
            "cancel" | "expire" => PaymentStatus::Cancelled,
            "refund" | "partial_refund" => PaymentStatus::Refunded,
            _ => return None,
        };
        Some(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::midtrans_signature;

    fn notification(transaction_status: &str) -> PaymentNotification {
        PaymentNotification {
            order_id: "b-1".into(),
            transaction_id: Some("tx-1".into()),
            transaction_status: transaction_status.into(),
            status_code: "200".into(),
            gross_amount: "150000.00".into(),
            signature_key: midtrans_signature("b-1", "200", "150000.00", "server-key"),
            fraud_status: None,
            payment_type: Some("bank_transfer".into()),
        }
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            ("settlement", Some(PaymentStatus::Success)),
            ("capture", Some(PaymentStatus::Success)),
            ("pending", Some(PaymentStatus::Pending)),
            ("deny", Some(PaymentStatus::Failed)),
            ("failure", Some(PaymentStatus::Failed)),
            ("cancel", Some(PaymentStatus::Cancelled)),
            ("expire", Some(PaymentStatus::Cancelled)),
            ("refund", Some(PaymentStatus::Refunded)),
            ("something_new", None),
        ];
        for (status, expected) in cases {
            assert_eq!(notification(status).payment_status(), expected, "{status}");
        }
    }

    #[test]
    fn test_challenged_capture_stays_pending() {
        let mut n = notification("capture");
        n.fraud_status = Some("challenge".into());
        assert_eq!(n.payment_status(), Some(PaymentStatus::Pending));
    }

    #[test]
    fn test_signature_check() {
        let mut n = notification("settlement");
        assert!(n.verify("server-key"));
        assert!(!n.verify("other-key"));

        n.gross_amount = "1.00".into();
        assert!(!n.verify("server-key"));
    }

    #[test]
    fn test_deserialize_minimal_payload() {
        let n: PaymentNotification = serde_json::from_value(serde_json::json!({
            "order_id": "b-1",
            "transaction_status": "settlement",
            "status_code": "200",
            "gross_amount": "150000.00"
        }))
        .unwrap();

        assert!(n.signature_key.is_empty());
        assert!(!n.verify("server-key"));
    }
}
