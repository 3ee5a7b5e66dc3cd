use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use voyage_catalog::Package;

use crate::models::{Booking, BookingRecord, Payment};
use crate::StoreError;

/// Which bookings a listing should fetch before search filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingFilter {
    /// Restrict to one buyer
    pub buyer_id: Option<String>,
    /// Only `Booked` bookings dated after this instant
    pub current_as_of: Option<DateTime<Utc>>,
}

impl BookingFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn current(now: DateTime<Utc>) -> Self {
        Self {
            buyer_id: None,
            current_as_of: Some(now),
        }
    }

    pub fn for_buyer(mut self, buyer_id: &str) -> Self {
        self.buyer_id = Some(buyer_id.to_string());
        self
    }

    pub fn matches(&self, booking: &Booking) -> bool {
        if let Some(buyer) = &self.buyer_id {
            if &booking.buyer_id != buyer {
                return false;
            }
        }
        match self.current_as_of {
            Some(now) => booking.is_current(now),
            None => true,
        }
    }
}

/// Read access to the package catalog
#[async_trait]
pub trait PackageRepository: Send + Sync {
    async fn get_package(
        &self,
        id: Uuid,
    ) -> Result<Option<Package>, StoreError>;
}

/// Booking and payment persistence.
///
/// Implementations must make `insert_with_payment` and `delete_booking`
/// all-or-nothing across both records.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn insert_with_payment(
        &self,
        booking: &Booking,
        payment: &Payment,
    ) -> Result<(), StoreError>;

    async fn get_booking(
        &self,
        id: Uuid,
    ) -> Result<Option<Booking>, StoreError>;

    async fn get_payment_for_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Option<Payment>, StoreError>;

    /// Bookings joined with package and buyer, ordered by creation time ascending.
    async fn list_bookings(
        &self,
        filter: &BookingFilter,
    ) -> Result<Vec<BookingRecord>, StoreError>;

    /// Conditional `Booked -> Cancelled` update. `None` when the booking is
    /// missing or was not in `Booked` state.
    async fn cancel_booking(
        &self,
        id: Uuid,
    ) -> Result<Option<Booking>, StoreError>;

    /// Remove a booking and its payment. Returns whether a booking was removed.
    async fn delete_booking(
        &self,
        id: Uuid,
    ) -> Result<bool, StoreError>;
}
