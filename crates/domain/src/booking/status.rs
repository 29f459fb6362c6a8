//! Payment and booking status state machines.

use serde::{Deserialize, Serialize};

/// Outcome of requesting a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition<S> {
    /// The status moved to the contained value.
    Applied(S),

    /// The request was a replay or arrived after a terminal state; nothing changed.
    Ignored { current: S },
}

impl<S> Transition<S> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }
}

/// The state of a payment as reported by the gateway.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Success
///           ├──► Failed
///           ├──► Refunded
///           └──► Cancelled
/// ```
/// Every state except `Pending` is terminal. Requests to leave a terminal
/// state are ignored so replayed gateway webhooks are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Charge submitted, awaiting settlement.
    #[default]
    Pending,

    /// Funds captured (terminal state).
    Success,

    /// Charge declined or errored (terminal state).
    Failed,

    /// Funds returned to the guest (terminal state).
    Refunded,

    /// Charge voided or expired before capture (terminal state).
    Cancelled,
}

impl PaymentStatus {
    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    /// Requests a move to `next`.
    pub fn transition(&self, next: PaymentStatus) -> Transition<PaymentStatus> {
        if self.is_terminal() || *self == next {
            Transition::Ignored { current: *self }
        } else {
            Transition::Applied(next)
        }
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The state of a booking as seen by guests.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Confirmed
///           ├──► Failed
///           └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Room held, payment not settled yet.
    #[default]
    Pending,

    /// Room held and paid (terminal state).
    Confirmed,

    /// Payment failed after the hold (terminal state).
    Failed,

    /// Booking voided or refunded (terminal state).
    Cancelled,
}

impl BookingStatus {
    /// Maps a payment status onto the booking it pays for.
    pub fn from_payment(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Pending => BookingStatus::Pending,
            PaymentStatus::Success => BookingStatus::Confirmed,
            PaymentStatus::Failed => BookingStatus::Failed,
            PaymentStatus::Refunded | PaymentStatus::Cancelled => BookingStatus::Cancelled,
        }
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BookingStatus::Pending)
    }

    /// Requests a move to `next`.
    pub fn transition(&self, next: BookingStatus) -> Transition<BookingStatus> {
        if self.is_terminal() || *self == next {
            Transition::Ignored { current: *self }
        } else {
            Transition::Applied(next)
        }
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Failed => "failed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_states_are_pending() {
        assert_eq!(PaymentStatus::default(), PaymentStatus::Pending);
        assert_eq!(BookingStatus::default(), BookingStatus::Pending);
    }

    #[test]
    fn test_terminal_payment_states() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Success.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(PaymentStatus::Refunded.is_terminal());
        assert!(PaymentStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_pending_can_move_to_any_terminal_state() {
        for next in [
            PaymentStatus::Success,
            PaymentStatus::Failed,
            PaymentStatus::Refunded,
            PaymentStatus::Cancelled,
        ] {
            assert_eq!(PaymentStatus::Pending.transition(next), Transition::Applied(next));
        }
    }

    #[test]
    fn test_terminal_payment_state_ignores_everything() {
        let current = PaymentStatus::Success;
        assert_eq!(
            current.transition(PaymentStatus::Success),
            Transition::Ignored { current }
        );
        assert_eq!(
            current.transition(PaymentStatus::Failed),
            Transition::Ignored { current }
        );
        assert_eq!(
            current.transition(PaymentStatus::Pending),
            Transition::Ignored { current }
        );
    }

    #[test]
    fn test_pending_replay_is_ignored() {
        assert!(
            !PaymentStatus::Pending
                .transition(PaymentStatus::Pending)
                .is_applied()
        );
    }

    #[test]
    fn test_booking_status_from_payment() {
        assert_eq!(
            BookingStatus::from_payment(PaymentStatus::Pending),
            BookingStatus::Pending
        );
        assert_eq!(
            BookingStatus::from_payment(PaymentStatus::Success),
            BookingStatus::Confirmed
        );
        assert_eq!(
            BookingStatus::from_payment(PaymentStatus::Failed),
            BookingStatus::Failed
        );
        assert_eq!(
            BookingStatus::from_payment(PaymentStatus::Refunded),
            BookingStatus::Cancelled
        );
        assert_eq!(
            BookingStatus::from_payment(PaymentStatus::Cancelled),
            BookingStatus::Cancelled
        );
    }

    #[test]
    fn test_booking_terminal_state_ignores_transitions() {
        let current = BookingStatus::Cancelled;
        assert!(!current.transition(BookingStatus::Confirmed).is_applied());
    }

    #[test]
    fn test_serialization_uses_lowercase_names() {
        let json = serde_json::to_string(&PaymentStatus::Refunded).unwrap();
        assert_eq!(json, "\"refunded\"");
        let parsed: BookingStatus = serde_json::from_str("\"confirmed\"").unwrap();
        assert_eq!(parsed, BookingStatus::Confirmed);
    }

    #[test]
    fn test_display() {
        assert_eq!(PaymentStatus::Cancelled.to_string(), "cancelled");
        assert_eq!(BookingStatus::Failed.to_string(), "failed");
    }
}
