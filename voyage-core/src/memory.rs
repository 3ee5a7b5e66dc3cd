use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;
use voyage_catalog::Package;

use crate::models::{Booking, BookingRecord, BuyerProfile, Payment};
use crate::repository::{BookingFilter, BookingRepository, PackageRepository};
use crate::StoreError;

#[derive(Default)]
struct Tables {
    packages: HashMap<Uuid, Package>,
    buyers: HashMap<String, BuyerProfile>,
    bookings: Vec<Booking>,
    payments: HashMap<Uuid, Payment>,
}

/// In-memory catalog and booking store.
///
/// A single lock covers every table, so the paired booking/payment writes
/// are atomic with respect to readers.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    fail_payment_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_package(&self, package: Package) {
        self.tables.write().await.packages.insert(package.id, package);
    }

    pub async fn remove_package(&self, id: Uuid) {
        self.tables.write().await.packages.remove(&id);
    }

    pub async fn add_buyer(&self, buyer: BuyerProfile) {
        self.tables.write().await.buyers.insert(buyer.id.clone(), buyer);
    }

    /// Seed a booking directly, bypassing the service rules (e.g. a past trip).
    pub async fn insert_booking(&self, booking: Booking) {
        self.tables.write().await.bookings.push(booking);
    }

    /// Make the payment half of the next paired writes fail.
    pub fn fail_payment_writes(&self, fail: bool) {
        self.fail_payment_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn booking_count(&self) -> usize {
        self.tables.read().await.bookings.len()
    }

    pub async fn payment_count(&self) -> usize {
        self.tables.read().await.payments.len()
    }
}

#[async_trait]
impl PackageRepository for InMemoryStore {
    async fn get_package(&self, id: Uuid) -> Result<Option<Package>, StoreError> {
        Ok(self.tables.read().await.packages.get(&id).cloned())
    }
}

#[async_trait]
impl BookingRepository for InMemoryStore {
    async fn insert_with_payment(
        &self,
        booking: &Booking,
        payment: &Payment,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;

        if payment.booking_id != booking.id {
            return Err("Payment does not reference the booking being created".into());
        }
        if tables.bookings.iter().any(|b| b.id == booking.id) {
            return Err(format!("Duplicate booking id {}", booking.id).into());
        }
        // Checked before either write so a failure leaves both tables untouched.
        if self.fail_payment_writes.load(Ordering::SeqCst) {
            return Err("Payment write failed".into());
        }

        tables.bookings.push(booking.clone());
        tables.payments.insert(booking.id, payment.clone());
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.tables.read().await.bookings.iter().find(|b| b.id == id).cloned())
    }

    async fn get_payment_for_booking(&self, booking_id: Uuid) -> Result<Option<Payment>, StoreError> {
        Ok(self.tables.read().await.payments.get(&booking_id).cloned())
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<BookingRecord>, StoreError> {
        let tables = self.tables.read().await;

        let mut records: Vec<BookingRecord> = tables
            .bookings
            .iter()
            .filter(|b| filter.matches(b))
            .map(|b| BookingRecord {
                booking: b.clone(),
                package: tables.packages.get(&b.package_id).cloned(),
                buyer: tables.buyers.get(&b.buyer_id).cloned(),
            })
            .collect();

        records.sort_by_key(|r| r.booking.created_at);
        Ok(records)
    }

    async fn cancel_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(booking) = tables.bookings.iter_mut().find(|b| b.id == id) else {
            return Ok(None);
        };

        if booking.cancel() {
            Ok(Some(booking.clone()))
        } else {
            Ok(None)
        }
    }

    async fn delete_booking(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.bookings.len();
        tables.bookings.retain(|b| b.id != id);
        let removed = tables.bookings.len() != before;
        if removed {
            tables.payments.remove(&id);
        }
        Ok(removed)
    }
}
