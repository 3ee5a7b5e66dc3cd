use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use voyage_catalog::Package;
use voyage_core::search::normalize_term;
use voyage_core::{Booking, BookingRecord, BuyerProfile, NewBooking, Payment, Requester};
use voyage_shared::Masked;

use crate::error::AppError;
use crate::middleware::{admin_auth_middleware, auth_middleware, Claims};
use crate::state::AppState;

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookPackageRequest {
    pub package_details: Option<String>,
    pub buyer: Option<String>,
    pub total_price: Option<i64>,
    pub persons: Option<u32>,
    /// `YYYY-MM-DD` or RFC 3339
    pub date: Option<String>,
    pub card_number: Option<Masked<String>>,
    pub cvv: Option<Masked<String>>,
    pub expiry_date: Option<String>,
    pub name_on_card: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(rename = "searchTerm")]
    pub search_term: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    pub id: Uuid,
    pub package_details: Uuid,
    pub buyer: String,
    pub total_price: i64,
    pub persons: u32,
    pub date: DateTime<Utc>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Booking> for BookingView {
    fn from(booking: &Booking) -> Self {
        Self {
            id: booking.id,
            package_details: booking.package_id,
            buyer: booking.buyer_id.clone(),
            total_price: booking.total_price,
            persons: booking.persons,
            date: booking.date,
            status: booking.status.to_string(),
            created_at: booking.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub id: Uuid,
    pub booking: Uuid,
    pub card_number: String,
    pub expiry_date: String,
    pub name_on_card: String,
    pub amount: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Payment> for PaymentView {
    fn from(payment: &Payment) -> Self {
        Self {
            id: payment.id,
            booking: payment.booking_id,
            card_number: payment.masked_card(),
            expiry_date: payment.expiry_date.clone(),
            name_on_card: payment.name_on_card.clone(),
            amount: payment.amount,
            status: payment.status.to_string(),
            created_at: payment.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageView {
    pub id: Uuid,
    pub package_name: String,
    pub package_destination: String,
    pub package_price: i64,
    pub package_discount_price: Option<i64>,
    pub package_offer: bool,
    pub package_rating: f64,
    pub package_total_ratings: i32,
    pub package_images: Vec<String>,
}

impl From<&Package> for PackageView {
    fn from(package: &Package) -> Self {
        Self {
            id: package.id,
            package_name: package.name.clone(),
            package_destination: package.destination.clone(),
            package_price: package.price,
            package_discount_price: package.discount_price,
            package_offer: package.has_offer(),
            package_rating: package.rating,
            package_total_ratings: package.total_ratings,
            package_images: package.images.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BuyerView {
    pub id: String,
    pub username: String,
    pub email: String,
}

impl From<&BuyerProfile> for BuyerView {
    fn from(buyer: &BuyerProfile) -> Self {
        Self {
            id: buyer.id.clone(),
            username: buyer.username.clone(),
            email: buyer.email.clone(),
        }
    }
}

/// Listing entry: the booking with its package and buyer populated.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRecordView {
    pub id: Uuid,
    pub package_details: Option<PackageView>,
    pub buyer: Option<BuyerView>,
    pub total_price: i64,
    pub persons: u32,
    pub date: DateTime<Utc>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<&BookingRecord> for BookingRecordView {
    fn from(record: &BookingRecord) -> Self {
        Self {
            id: record.booking.id,
            package_details: record.package.as_ref().map(PackageView::from),
            buyer: record.buyer.as_ref().map(BuyerView::from),
            total_price: record.booking.total_price,
            persons: record.booking.persons,
            date: record.booking.date,
            status: record.booking.status.to_string(),
            created_at: record.booking.created_at,
        }
    }
}

pub fn routes(state: AppState) -> Router<AppState> {
    let admin = Router::new()
        .route("/api/booking/get-currentBookings", get(get_current_bookings))
        .route("/api/booking/get-allBookings", get(get_all_bookings))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware));

    let user = Router::new()
        .route("/api/booking/book-package/{package_id}", post(book_package))
        .route("/api/booking/get-UserCurrentBookings/{id}", get(get_user_current_bookings))
        .route("/api/booking/get-allUserBookings/{id}", get(get_all_user_bookings))
        .route("/api/booking/delete-booking-history/{id}/{user_id}", delete(delete_booking_history))
        .route(
            "/api/booking/cancel-booking/{id}/{user_id}",
            post(cancel_booking).patch(cancel_booking),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    admin.merge(user)
}

/// Accepts `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp.
fn parse_travel_date(value: &str) -> Result<DateTime<Utc>, AppError> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| AppError::Validation("Invalid travel date".to_string()))
}

fn parse_id(value: &str, what: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(value.trim()).map_err(|_| AppError::NotFound(format!("{} Not Found!", what)))
}

impl BookPackageRequest {
    /// Users book only for themselves; checked before anything else in the body.
    fn ensure_own_account(&self, requester_id: &str) -> Result<(), AppError> {
        match self.buyer.as_deref().map(str::trim) {
            Some(buyer) if !buyer.is_empty() && buyer != requester_id => {
                tracing::warn!("Requester {} attempted to book for {}", requester_id, buyer);
                Err(AppError::Authorization("You can only buy on your account!".to_string()))
            }
            _ => Ok(()),
        }
    }

    fn into_new_booking(self, path_package_id: &str, idempotency_key: Option<String>) -> Result<NewBooking, AppError> {
        let package_ref = match self.package_details.as_deref().map(str::trim) {
            Some(body_id) if !body_id.is_empty() => {
                if body_id != path_package_id.trim() {
                    return Err(AppError::Validation(
                        "Package in request body does not match the booked package".to_string(),
                    ));
                }
                Some(body_id.to_string())
            }
            _ => None,
        };

        let package_id = match package_ref {
            Some(id) => Some(parse_id(&id, "Package")?),
            None => None,
        };

        let date = match self.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(raw) => Some(parse_travel_date(raw)?),
            None => None,
        };

        Ok(NewBooking {
            package_id,
            buyer: self.buyer,
            total_price: self.total_price,
            persons: self.persons,
            date,
            card_number: self.card_number,
            cvv: self.cvv,
            expiry_date: self.expiry_date,
            name_on_card: self.name_on_card,
            idempotency_key,
        })
    }
}

fn requester(claims: &Claims) -> Requester<'_> {
    Requester {
        id: &claims.sub,
        is_admin: claims.is_admin(),
    }
}

fn listing_response(records: Vec<BookingRecord>) -> Json<serde_json::Value> {
    if records.is_empty() {
        return Json(json!({
            "success": false,
            "message": "No Bookings Available",
        }));
    }

    let bookings: Vec<BookingRecordView> = records.iter().map(BookingRecordView::from).collect();
    Json(json!({
        "success": true,
        "bookings": bookings,
    }))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/booking/book-package/{package_id}
async fn book_package(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(package_id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<BookPackageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let Json(req) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    let idempotency_key = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    req.ensure_own_account(&claims.sub)?;
    let request = req.into_new_booking(&package_id, idempotency_key)?;
    let result = state.bookings.create(&claims.sub, request).await;
    state.metrics.record("create", &result);
    let created = result?;

    let status = if created.replayed { StatusCode::OK } else { StatusCode::CREATED };
    Ok((
        status,
        Json(json!({
            "success": true,
            "message": "Package Booked and Payment Successful!",
            "replayed": created.replayed,
            "booking": BookingView::from(&created.booking),
            "payment": PaymentView::from(&created.payment),
        })),
    ))
}

/// GET /api/booking/get-currentBookings
async fn get_current_bookings(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let term = normalize_term(query.search_term.as_deref());
    let result = state.bookings.list_current_for_admin(&term).await;
    state.metrics.record("list_current_admin", &result);
    Ok(listing_response(result?))
}

/// GET /api/booking/get-allBookings
async fn get_all_bookings(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let term = normalize_term(query.search_term.as_deref());
    let result = state.bookings.list_all_for_admin(&term).await;
    state.metrics.record("list_all_admin", &result);
    Ok(listing_response(result?))
}

/// GET /api/booking/get-UserCurrentBookings/{id}
async fn get_user_current_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(owner_id): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let term = normalize_term(query.search_term.as_deref());
    let result = state.bookings.list_current_for_user(&claims.sub, &owner_id, &term).await;
    state.metrics.record("list_current_user", &result);
    Ok(listing_response(result?))
}

/// GET /api/booking/get-allUserBookings/{id}
async fn get_all_user_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(owner_id): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let term = normalize_term(query.search_term.as_deref());
    let result = state.bookings.list_all_for_user(&claims.sub, &owner_id, &term).await;
    state.metrics.record("list_all_user", &result);
    Ok(listing_response(result?))
}

/// DELETE /api/booking/delete-booking-history/{id}/{user_id}
async fn delete_booking_history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((booking_id, owner_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let booking_id = parse_id(&booking_id, "Booking")?;
    let result = state.bookings.delete_history(requester(&claims), &owner_id, booking_id).await;
    state.metrics.record("delete_history", &result);
    result?;

    Ok(Json(json!({
        "success": true,
        "message": "Booking History Deleted!",
    })))
}

/// POST|PATCH /api/booking/cancel-booking/{id}/{user_id}
async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((booking_id, owner_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let booking_id = parse_id(&booking_id, "Booking")?;
    let result = state.bookings.cancel(requester(&claims), &owner_id, booking_id).await;
    state.metrics.record("cancel", &result);
    let booking = result?;

    Ok(Json(json!({
        "success": true,
        "message": "Booking Cancelled!",
        "booking": BookingView::from(&booking),
    })))
}
