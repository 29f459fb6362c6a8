//! Booking endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, NaiveDate, Utc};
use common::AggregateId;
use domain::{Booking, BookingRequest, GuestInfo, Money};
use saga::BookingReceipt;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

// -- Request types --

#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub hotel_id: String,
    pub room_type: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[serde(default = "default_rooms")]
    pub rooms: u32,
    pub guest_name: String,
    pub guest_email: String,
    pub amount_cents: i64,
    pub currency: String,
}

fn default_rooms() -> u32 {
    1
}

// -- Response types --

#[derive(Serialize)]
pub struct BookingResponse {
    pub id: String,
    pub hotel_id: String,
    pub room_type: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub provider_code: String,
    pub provider_reference: String,
    pub status: String,
    pub payment_status: String,
    pub payment_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        Self {
            id: booking.id.to_string(),
            status: booking.status().to_string(),
            payment_status: booking.payment_status().to_string(),
            hotel_id: booking.hotel_id,
            room_type: booking.room_type,
            check_in: booking.check_in,
            check_out: booking.check_out,
            provider_code: booking.provider_code,
            provider_reference: booking.provider_reference,
            payment_id: booking.payment_id,
            amount_cents: booking.amount.cents(),
            currency: booking.currency,
            created_at: booking.created_at,
            updated_at: booking.updated_at,
        }
    }
}

// -- Handlers --

/// POST /bookings: run the booking saga. Requires an `Idempotency-Key` header.
#[tracing::instrument(skip(state, headers, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingReceipt>), ApiError> {
    let key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Idempotency-Key header is required".to_string()))?
        .to_string();

    let request = BookingRequest {
        booking_id: AggregateId::new(),
        hotel_id: req.hotel_id,
        room_type: req.room_type,
        check_in: req.check_in,
        check_out: req.check_out,
        rooms: req.rooms,
        guest: GuestInfo {
            name: req.guest_name,
            email: req.guest_email,
        },
        amount: Money::from_cents(req.amount_cents),
        currency: req.currency,
    };

    let receipt = state.bookings.create_booking(&key, request).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// GET /bookings/:id: load a booking by ID.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, ApiError> {
    let booking_id = parse_booking_id(&id)?;
    let booking = state.bookings.get_booking(booking_id).await?;
    Ok(Json(BookingResponse::from(booking)))
}

fn parse_booking_id(id: &str) -> Result<AggregateId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid booking id: {id}")))
}
