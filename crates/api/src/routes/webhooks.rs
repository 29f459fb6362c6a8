//! Inbound payment gateway notifications.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use saga::WebhookOutcome;
use webhook::PaymentNotification;

use crate::AppState;
use crate::error::ApiError;

/// POST /webhooks/payments: apply a signed payment status notification.
///
/// Replays answer 200 with an `ignored` outcome so the gateway stops retrying.
#[tracing::instrument(skip(state, notification), fields(order_id = %notification.order_id))]
pub async fn payment(
    State(state): State<Arc<AppState>>,
    Json(notification): Json<PaymentNotification>,
) -> Result<Json<WebhookOutcome>, ApiError> {
    let outcome = state.payments.handle(&notification).await?;
    Ok(Json(outcome))
}
