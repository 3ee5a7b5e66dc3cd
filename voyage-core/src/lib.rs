pub mod clock;
pub mod models;
pub mod search;
pub mod repository;
pub mod payment;
pub mod idempotency;
pub mod events;
pub mod memory;
pub mod service;

pub use models::{Booking, BookingRecord, BookingStatus, BuyerProfile, NewBooking, Payment, PaymentStatus};
pub use service::{BookingRules, BookingService, CreatedBooking, Requester};

/// Boxed error used at the storage and gateway seams.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BookingError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Payment declined: {0}")]
    PaymentDeclined(String),
    #[error("Internal service error: {0}")]
    Internal(String),
}

impl BookingError {
    pub(crate) fn internal(err: StoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
