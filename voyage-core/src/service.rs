use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use voyage_catalog::quote_total;
use voyage_shared::models::events::{
    topics, BookingCancelledEvent, BookingCreatedEvent, BookingDeletedEvent,
};

use crate::clock::{Clock, SystemClock};
use crate::events::EventPublisher;
use crate::idempotency::{IdempotencyStore, Reservation};
use crate::models::{Booking, BookingRecord, NewBooking, Payment, PaymentStatus, ValidatedBooking};
use crate::payment::{CardToken, PaymentGateway};
use crate::repository::{BookingFilter, BookingRepository, PackageRepository};
use crate::search::{buyer_matches, package_matches};
use crate::{BookingError, BookingResult};

/// Tunables for the booking flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingRules {
    pub max_persons: u32,
    /// How long a completed submission is remembered
    pub idempotency_ttl_seconds: u64,
    /// How long an unfinished submission holds its key
    pub idempotency_pending_ttl_seconds: u64,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            max_persons: 10,
            idempotency_ttl_seconds: 86_400,
            idempotency_pending_ttl_seconds: 60,
        }
    }
}

/// Authenticated caller of a booking operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester<'a> {
    pub id: &'a str,
    pub is_admin: bool,
}

impl<'a> Requester<'a> {
    pub fn user(id: &'a str) -> Self {
        Self { id, is_admin: false }
    }

    pub fn admin(id: &'a str) -> Self {
        Self { id, is_admin: true }
    }
}

/// Result of a booking submission.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedBooking {
    pub booking: Booking,
    pub payment: Payment,
    /// True when an earlier submission with the same idempotency key was returned
    pub replayed: bool,
}

/// Booking lifecycle: create with payment, list, cancel, delete history.
#[derive(Clone)]
pub struct BookingService {
    packages: Arc<dyn PackageRepository>,
    bookings: Arc<dyn BookingRepository>,
    gateway: Arc<dyn PaymentGateway>,
    idempotency: Arc<dyn IdempotencyStore>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    rules: BookingRules,
}

fn authorize(requester_id: &str, owner_id: &str, message: &str) -> BookingResult<()> {
    if requester_id != owner_id {
        warn!("Requester {} denied access to bookings of {}", requester_id, owner_id);
        return Err(BookingError::Unauthorized(message.to_string()));
    }
    Ok(())
}

impl BookingService {
    pub fn new(
        packages: Arc<dyn PackageRepository>,
        bookings: Arc<dyn BookingRepository>,
        gateway: Arc<dyn PaymentGateway>,
        idempotency: Arc<dyn IdempotencyStore>,
        events: Arc<dyn EventPublisher>,
        rules: BookingRules,
    ) -> Self {
        Self {
            packages,
            bookings,
            gateway,
            idempotency,
            events,
            clock: Arc::new(SystemClock),
            rules,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Book a package and record its payment.
    ///
    /// The booking and payment are written together or not at all. With an
    /// idempotency key, a repeated submission returns the original booking.
    pub async fn create(&self, requester_id: &str, request: NewBooking) -> BookingResult<CreatedBooking> {
        if let Some(buyer) = request.buyer.as_deref().map(str::trim) {
            if !buyer.is_empty() && buyer != requester_id {
                warn!("Requester {} attempted to book for {}", requester_id, buyer);
                return Err(BookingError::Unauthorized(
                    "You can only buy on your account!".to_string(),
                ));
            }
        }

        let now = self.clock.now();
        let valid = request.validate(now, &self.rules)?;

        let package = self
            .packages
            .get_package(valid.package_id)
            .await
            .map_err(BookingError::internal)?
            .ok_or_else(|| BookingError::NotFound("Package Not Found!".to_string()))?;

        let expected_total = quote_total(&package, valid.persons)
            .map_err(|e| BookingError::Validation(e.to_string()))?;
        if expected_total != valid.total_price {
            warn!(
                "Total price mismatch for package {}: submitted {}, expected {}",
                package.id, valid.total_price, expected_total
            );
            return Err(BookingError::Validation(format!(
                "Total price {} does not match package pricing {}",
                valid.total_price, expected_total
            )));
        }

        let idempotency_key = valid
            .idempotency_key
            .as_ref()
            .map(|key| format!("{}:{}", valid.buyer, key));

        if let Some(key) = &idempotency_key {
            let reservation = self
                .idempotency
                .reserve(key, self.rules.idempotency_pending_ttl_seconds)
                .await
                .map_err(BookingError::internal)?;

            match reservation {
                Reservation::Acquired => {}
                Reservation::Completed(booking_id) => {
                    info!("Replaying booking {} for idempotency key", booking_id);
                    return self.replay(booking_id).await;
                }
                Reservation::InFlight => {
                    return Err(BookingError::Conflict(
                        "A booking with this idempotency key is already being processed".to_string(),
                    ));
                }
            }
        }

        let result = self.persist(&valid, expected_total).await;

        if let Some(key) = &idempotency_key {
            let settled = match &result {
                Ok(created) => {
                    self.idempotency
                        .complete(key, created.booking.id, self.rules.idempotency_ttl_seconds)
                        .await
                }
                Err(_) => self.idempotency.release(key).await,
            };
            if let Err(e) = settled {
                error!("Failed to settle idempotency key: {}", e);
            }
        }

        let created = result?;

        let event = BookingCreatedEvent {
            booking_id: created.booking.id,
            package_id: created.booking.package_id,
            buyer_id: created.booking.buyer_id.clone(),
            persons: created.booking.persons,
            total_price: created.booking.total_price,
            travel_date: created.booking.date.timestamp(),
            timestamp: now.timestamp(),
        };
        self.emit(topics::BOOKING_CREATED, &created.booking.id, &event).await;

        info!(
            "Booking {} created for buyer {} (package {}, total {})",
            created.booking.id, created.booking.buyer_id, created.booking.package_id, created.booking.total_price
        );
        Ok(created)
    }

    async fn persist(&self, valid: &ValidatedBooking, total_price: i64) -> BookingResult<CreatedBooking> {
        let booking = Booking::new(
            valid.package_id,
            valid.buyer.clone(),
            valid.date,
            valid.persons,
            total_price,
        );

        let token = self
            .gateway
            .charge(booking.id, total_price, &valid.card)
            .await
            .map_err(|e| {
                warn!("Payment for booking {} declined: {}", booking.id, e);
                BookingError::PaymentDeclined(e.to_string())
            })?;

        let payment = Payment {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            card_token: token.token,
            card_last_four: token.last_four,
            expiry_date: valid.card.expiry_date.clone(),
            name_on_card: valid.card.name_on_card.clone(),
            amount: total_price,
            status: PaymentStatus::Paid,
            created_at: self.clock.now(),
        };

        if let Err(e) = self.bookings.insert_with_payment(&booking, &payment).await {
            error!("Failed to persist booking {}: {}", booking.id, e);
            let token = CardToken {
                token: payment.card_token,
                last_four: payment.card_last_four,
            };
            // The charge must not outlive the rolled-back write.
            if let Err(void_err) = self.gateway.void(booking.id, &token).await {
                error!("Failed to void charge for booking {}: {}", booking.id, void_err);
            }
            return Err(BookingError::internal(e));
        }

        Ok(CreatedBooking {
            booking,
            payment,
            replayed: false,
        })
    }

    async fn replay(&self, booking_id: Uuid) -> BookingResult<CreatedBooking> {
        let booking = self
            .bookings
            .get_booking(booking_id)
            .await
            .map_err(BookingError::internal)?;
        let payment = self
            .bookings
            .get_payment_for_booking(booking_id)
            .await
            .map_err(BookingError::internal)?;

        match (booking, payment) {
            (Some(booking), Some(payment)) => Ok(CreatedBooking {
                booking,
                payment,
                replayed: true,
            }),
            _ => Err(BookingError::Conflict(
                "The booking for this idempotency key no longer exists".to_string(),
            )),
        }
    }

    /// Upcoming `Booked` bookings of every buyer whose username or email matches.
    pub async fn list_current_for_admin(&self, search_term: &str) -> BookingResult<Vec<BookingRecord>> {
        let records = self.fetch(&BookingFilter::current(self.clock.now())).await?;
        Ok(filter_by_buyer(records, search_term))
    }

    /// Full booking history of every buyer whose username or email matches.
    pub async fn list_all_for_admin(&self, search_term: &str) -> BookingResult<Vec<BookingRecord>> {
        let records = self.fetch(&BookingFilter::all()).await?;
        Ok(filter_by_buyer(records, search_term))
    }

    pub async fn list_current_for_user(
        &self,
        requester_id: &str,
        owner_id: &str,
        search_term: &str,
    ) -> BookingResult<Vec<BookingRecord>> {
        authorize(requester_id, owner_id, "You can only get your own bookings!!")?;
        let records = self
            .fetch(&BookingFilter::current(self.clock.now()).for_buyer(owner_id))
            .await?;
        Ok(filter_by_package(records, search_term))
    }

    pub async fn list_all_for_user(
        &self,
        requester_id: &str,
        owner_id: &str,
        search_term: &str,
    ) -> BookingResult<Vec<BookingRecord>> {
        authorize(requester_id, owner_id, "You can only get your own bookings!!")?;
        let records = self.fetch(&BookingFilter::all().for_buyer(owner_id)).await?;
        Ok(filter_by_package(records, search_term))
    }

    async fn fetch(&self, filter: &BookingFilter) -> BookingResult<Vec<BookingRecord>> {
        self.bookings
            .list_bookings(filter)
            .await
            .map_err(BookingError::internal)
    }

    /// Load a booking the requester may act on.
    ///
    /// Users act only on their own bookings, named by their own id in the
    /// path. Admins act on any booking.
    async fn accessible_booking(
        &self,
        requester: Requester<'_>,
        owner_id: &str,
        booking_id: Uuid,
        message: &str,
    ) -> BookingResult<Booking> {
        if !requester.is_admin {
            authorize(requester.id, owner_id, message)?;
        }

        let booking = self
            .bookings
            .get_booking(booking_id)
            .await
            .map_err(BookingError::internal)?
            .ok_or_else(|| BookingError::NotFound("Booking not found".to_string()))?;

        if !requester.is_admin && booking.buyer_id != owner_id {
            warn!("Booking {} does not belong to {}", booking_id, owner_id);
            return Err(BookingError::Unauthorized(message.to_string()));
        }
        Ok(booking)
    }

    /// Transition an upcoming booking to `Cancelled`.
    pub async fn cancel(&self, requester: Requester<'_>, owner_id: &str, booking_id: Uuid) -> BookingResult<Booking> {
        let booking = self
            .accessible_booking(requester, owner_id, booking_id, "You can only cancel your bookings!")
            .await?;
        let now = self.clock.now();
        booking.ensure_cancellable(now)?;

        let cancelled = self
            .bookings
            .cancel_booking(booking_id)
            .await
            .map_err(BookingError::internal)?
            .ok_or_else(|| BookingError::Conflict("Booking is already cancelled".to_string()))?;

        let event = BookingCancelledEvent {
            booking_id,
            buyer_id: cancelled.buyer_id.clone(),
            timestamp: now.timestamp(),
        };
        self.emit(topics::BOOKING_CANCELLED, &booking_id, &event).await;

        info!("Booking {} cancelled by {}", booking_id, requester.id);
        Ok(cancelled)
    }

    /// Permanently remove a past or cancelled booking together with its payment.
    pub async fn delete_history(&self, requester: Requester<'_>, owner_id: &str, booking_id: Uuid) -> BookingResult<()> {
        let booking = self
            .accessible_booking(requester, owner_id, booking_id, "You can only delete your booking history!")
            .await?;
        let now = self.clock.now();
        booking.ensure_deletable(now)?;

        let removed = self
            .bookings
            .delete_booking(booking_id)
            .await
            .map_err(BookingError::internal)?;
        if !removed {
            return Err(BookingError::NotFound("Booking not found".to_string()));
        }

        let event = BookingDeletedEvent {
            booking_id,
            buyer_id: booking.buyer_id,
            timestamp: now.timestamp(),
        };
        self.emit(topics::BOOKING_DELETED, &booking_id, &event).await;

        info!("Booking {} deleted from history by {}", booking_id, requester.id);
        Ok(())
    }

    /// Publish failures are logged and swallowed; the write has already happened.
    async fn emit<T: Serialize>(&self, topic: &str, booking_id: &Uuid, event: &T) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize {} event: {}", topic, e);
                return;
            }
        };
        if let Err(e) = self.events.publish(topic, &booking_id.to_string(), &payload).await {
            warn!("Failed to publish {} for booking {}: {}", topic, booking_id, e);
        }
    }
}

/// Keep records whose buyer exists and matches; the join drops unknown buyers.
fn filter_by_buyer(records: Vec<BookingRecord>, term: &str) -> Vec<BookingRecord> {
    records
        .into_iter()
        .filter(|r| r.buyer.as_ref().is_some_and(|b| buyer_matches(b, term)))
        .collect()
}

/// Keep records whose package exists and whose name matches.
fn filter_by_package(records: Vec<BookingRecord>, term: &str) -> Vec<BookingRecord> {
    records
        .into_iter()
        .filter(|r| r.package.as_ref().is_some_and(|p| package_matches(p, term)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::RecordingPublisher;
    use crate::idempotency::InMemoryIdempotencyStore;
    use crate::memory::InMemoryStore;
    use crate::models::{BookingStatus, BuyerProfile};
    use crate::payment::{CardDetails, MockPaymentGateway};
    use crate::StoreError;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use tokio::sync::Mutex;
    use voyage_catalog::Package;
    use voyage_shared::Masked;

    /// Mock gateway that remembers every voided token.
    #[derive(Default)]
    struct RecordingGateway {
        charged: Mutex<Vec<String>>,
        voided: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PaymentGateway for RecordingGateway {
        async fn charge(&self, booking_id: Uuid, amount: i64, card: &CardDetails) -> Result<CardToken, StoreError> {
            let token = MockPaymentGateway.charge(booking_id, amount, card).await?;
            self.charged.lock().await.push(token.token.clone());
            Ok(token)
        }

        async fn void(&self, _booking_id: Uuid, token: &CardToken) -> Result<(), StoreError> {
            self.voided.lock().await.push(token.token.clone());
            Ok(())
        }
    }

    /// Idempotency store that records the TTL of every call.
    #[derive(Default)]
    struct TtlSpy {
        inner: InMemoryIdempotencyStore,
        calls: Mutex<Vec<(&'static str, u64)>>,
    }

    #[async_trait]
    impl IdempotencyStore for TtlSpy {
        async fn reserve(&self, key: &str, ttl_seconds: u64) -> Result<Reservation, StoreError> {
            self.calls.lock().await.push(("reserve", ttl_seconds));
            self.inner.reserve(key, ttl_seconds).await
        }

        async fn complete(&self, key: &str, booking_id: Uuid, ttl_seconds: u64) -> Result<(), StoreError> {
            self.calls.lock().await.push(("complete", ttl_seconds));
            self.inner.complete(key, booking_id, ttl_seconds).await
        }

        async fn release(&self, key: &str) -> Result<(), StoreError> {
            self.inner.release(key).await
        }
    }

    struct Fixture {
        service: BookingService,
        store: Arc<InMemoryStore>,
        events: Arc<RecordingPublisher>,
        gateway: Arc<RecordingGateway>,
        idempotency: Arc<TtlSpy>,
        clock: Arc<ManualClock>,
        package: Package,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let events = Arc::new(RecordingPublisher::new());
        let package = Package::new("Goa Getaway", "Goa", 10000).with_discount(8000);
        store.add_package(package.clone()).await;
        for (id, username, email) in [
            ("alice-id", "alice", "alice@example.com"),
            ("bob-id", "bob", "bob@example.com"),
            ("carol-id", "carol", "c.alicent@example.com"),
        ] {
            store
                .add_buyer(BuyerProfile {
                    id: id.to_string(),
                    username: username.to_string(),
                    email: email.to_string(),
                })
                .await;
        }

        let gateway = Arc::new(RecordingGateway::default());
        let idempotency = Arc::new(TtlSpy::default());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let service = BookingService::new(
            store.clone(),
            store.clone(),
            gateway.clone(),
            idempotency.clone(),
            events.clone(),
            BookingRules::default(),
        )
        .with_clock(clock.clone());

        Fixture { service, store, events, gateway, idempotency, clock, package }
    }

    fn request(buyer: &str, package: &Package, persons: u32) -> NewBooking {
        NewBooking {
            package_id: Some(package.id),
            buyer: Some(buyer.to_string()),
            total_price: Some(i64::from(persons) * package.discount_price.unwrap_or(package.price)),
            persons: Some(persons),
            date: Some(Utc::now() + Duration::days(14)),
            card_number: Some(Masked::from("4242424242424242")),
            cvv: Some(Masked::from("123")),
            expiry_date: Some("12/99".to_string()),
            name_on_card: Some("Traveler".to_string()),
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn test_create_snapshots_discounted_total() {
        let f = fixture().await;
        let created = f.service.create("alice-id", request("alice-id", &f.package, 2)).await.unwrap();

        assert_eq!(created.booking.total_price, 16000);
        assert_eq!(created.booking.status, BookingStatus::Booked);
        assert_eq!(created.payment.status, PaymentStatus::Paid);
        assert_eq!(created.payment.booking_id, created.booking.id);
        assert_eq!(created.payment.amount, 16000);
        assert_eq!(created.payment.card_last_four, "4242");
        assert!(!created.payment.card_token.contains("4242424242424242"));
        assert!(!created.replayed);

        assert_eq!(f.store.booking_count().await, 1);
        assert_eq!(f.store.payment_count().await, 1);
        assert_eq!(f.events.topics().await, vec![topics::BOOKING_CREATED.to_string()]);
    }

    #[tokio::test]
    async fn test_create_for_someone_else_is_unauthorized() {
        let f = fixture().await;
        let err = f.service.create("bob-id", request("alice-id", &f.package, 1)).await.unwrap_err();

        assert!(matches!(err, BookingError::Unauthorized(_)));
        assert_eq!(f.store.booking_count().await, 0);
        assert_eq!(f.store.payment_count().await, 0);
    }

    #[tokio::test]
    async fn test_create_with_missing_field_persists_nothing() {
        let f = fixture().await;
        let strip: [fn(&mut NewBooking); 9] = [
            |r| r.package_id = None,
            |r| r.buyer = None,
            |r| r.total_price = None,
            |r| r.persons = None,
            |r| r.date = None,
            |r| r.card_number = None,
            |r| r.cvv = None,
            |r| r.expiry_date = None,
            |r| r.name_on_card = Some(String::new()),
        ];

        for clear in strip {
            let mut req = request("alice-id", &f.package, 1);
            clear(&mut req);
            let err = f.service.create("alice-id", req).await.unwrap_err();
            assert!(matches!(err, BookingError::Validation(_)), "got {:?}", err);
        }
        assert_eq!(f.store.booking_count().await, 0);
        assert_eq!(f.store.payment_count().await, 0);
    }

    #[tokio::test]
    async fn test_create_unknown_package_is_not_found() {
        let f = fixture().await;
        let mut req = request("alice-id", &f.package, 1);
        req.package_id = Some(Uuid::new_v4());

        let err = f.service.create("alice-id", req).await.unwrap_err();
        assert_eq!(err, BookingError::NotFound("Package Not Found!".to_string()));
    }

    #[tokio::test]
    async fn test_create_rejects_tampered_total() {
        let f = fixture().await;
        let mut req = request("alice-id", &f.package, 2);
        req.total_price = Some(100);

        let err = f.service.create("alice-id", req).await.unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
        assert_eq!(f.store.booking_count().await, 0);
    }

    #[tokio::test]
    async fn test_payment_write_failure_leaves_no_orphan() {
        let f = fixture().await;
        f.store.fail_payment_writes(true);

        let err = f.service.create("alice-id", request("alice-id", &f.package, 1)).await.unwrap_err();
        assert!(matches!(err, BookingError::Internal(_)));
        assert_eq!(f.store.booking_count().await, 0);
        assert_eq!(f.store.payment_count().await, 0);
        assert!(f.events.events().await.is_empty());

        // The authorization taken before the failed write is released.
        let charged = f.gateway.charged.lock().await.clone();
        assert_eq!(charged.len(), 1);
        assert_eq!(*f.gateway.voided.lock().await, charged);
    }

    #[tokio::test]
    async fn test_successful_create_voids_nothing() {
        let f = fixture().await;
        f.service.create("alice-id", request("alice-id", &f.package, 1)).await.unwrap();
        assert!(f.gateway.voided.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_in_flight_duplicate_is_conflict() {
        let f = fixture().await;
        // Another submission with the same key is still being processed.
        assert_eq!(f.idempotency.reserve("alice-id:k", 60).await.unwrap(), Reservation::Acquired);

        let mut req = request("alice-id", &f.package, 1);
        req.idempotency_key = Some("k".to_string());
        let err = f.service.create("alice-id", req).await.unwrap_err();

        assert!(matches!(err, BookingError::Conflict(_)));
        assert_eq!(f.store.booking_count().await, 0);
        assert!(f.gateway.charged.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_pending_key_uses_short_ttl() {
        let f = fixture().await;
        let rules = BookingRules::default();
        let mut req = request("alice-id", &f.package, 1);
        req.idempotency_key = Some("short".to_string());

        f.service.create("alice-id", req).await.unwrap();
        assert_eq!(
            *f.idempotency.calls.lock().await,
            vec![
                ("reserve", rules.idempotency_pending_ttl_seconds),
                ("complete", rules.idempotency_ttl_seconds),
            ]
        );
    }

    #[tokio::test]
    async fn test_declined_card_persists_nothing() {
        let f = fixture().await;
        let mut req = request("alice-id", &f.package, 1);
        req.card_number = Some(Masked::from("4242424242420000"));

        let err = f.service.create("alice-id", req).await.unwrap_err();
        assert!(matches!(err, BookingError::PaymentDeclined(_)));
        assert_eq!(f.store.booking_count().await, 0);
    }

    #[tokio::test]
    async fn test_idempotency_key_deduplicates() {
        let f = fixture().await;
        let mut req = request("alice-id", &f.package, 2);
        req.idempotency_key = Some("checkout-1".to_string());

        let first = f.service.create("alice-id", req.clone()).await.unwrap();
        let second = f.service.create("alice-id", req).await.unwrap();

        assert!(second.replayed);
        assert_eq!(first.booking.id, second.booking.id);
        assert_eq!(first.payment.id, second.payment.id);
        assert_eq!(f.store.booking_count().await, 1);
        assert_eq!(f.store.payment_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_attempt_releases_idempotency_key() {
        let f = fixture().await;
        let mut req = request("alice-id", &f.package, 1);
        req.idempotency_key = Some("retry-me".to_string());

        f.store.fail_payment_writes(true);
        assert!(f.service.create("alice-id", req.clone()).await.is_err());

        f.store.fail_payment_writes(false);
        let created = f.service.create("alice-id", req).await.unwrap();
        assert!(!created.replayed);
        assert_eq!(f.store.booking_count().await, 1);
    }

    #[tokio::test]
    async fn test_cancel_moves_booking_to_history() {
        let f = fixture().await;
        let created = f.service.create("alice-id", request("alice-id", &f.package, 1)).await.unwrap();
        let id = created.booking.id;

        let current = f.service.list_current_for_user("alice-id", "alice-id", "").await.unwrap();
        assert_eq!(current.len(), 1);

        let cancelled = f.service.cancel(Requester::user("alice-id"), "alice-id", id).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);

        assert!(f.service.list_current_for_user("alice-id", "alice-id", "").await.unwrap().is_empty());
        let all = f.service.list_all_for_user("alice-id", "alice-id", "").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].booking.status, BookingStatus::Cancelled);

        let again = f.service.cancel(Requester::user("alice-id"), "alice-id", id).await.unwrap_err();
        assert!(matches!(again, BookingError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_cancel_by_non_owner_leaves_status() {
        let f = fixture().await;
        let created = f.service.create("alice-id", request("alice-id", &f.package, 1)).await.unwrap();
        let id = created.booking.id;

        let err = f.service.cancel(Requester::user("bob-id"), "alice-id", id).await.unwrap_err();
        assert!(matches!(err, BookingError::Unauthorized(_)));

        // Own user id in the path, someone else's booking id
        let err = f.service.cancel(Requester::user("bob-id"), "bob-id", id).await.unwrap_err();
        assert!(matches!(err, BookingError::Unauthorized(_)));

        let booking = f.store.get_booking(id).await.unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Booked);
    }

    #[tokio::test]
    async fn test_cancel_missing_booking_is_not_found() {
        let f = fixture().await;
        let err = f.service.cancel(Requester::user("alice-id"), "alice-id", Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BookingError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_history_rules() {
        let f = fixture().await;
        let created = f.service.create("alice-id", request("alice-id", &f.package, 1)).await.unwrap();
        let id = created.booking.id;

        // Upcoming and active: not history yet
        let err = f.service.delete_history(Requester::user("alice-id"), "alice-id", id).await.unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));

        f.service.cancel(Requester::user("alice-id"), "alice-id", id).await.unwrap();
        f.service.delete_history(Requester::user("alice-id"), "alice-id", id).await.unwrap();

        assert!(f.service.list_all_for_user("alice-id", "alice-id", "").await.unwrap().is_empty());
        assert_eq!(f.store.payment_count().await, 0);
        assert_eq!(
            f.events.topics().await,
            vec![
                topics::BOOKING_CREATED.to_string(),
                topics::BOOKING_CANCELLED.to_string(),
                topics::BOOKING_DELETED.to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_trip_date_passing_moves_booking_to_history() {
        let f = fixture().await;
        let created = f.service.create("alice-id", request("alice-id", &f.package, 1)).await.unwrap();
        let id = created.booking.id;

        f.clock.advance(Duration::days(15));

        assert!(f.service.list_current_for_user("alice-id", "alice-id", "").await.unwrap().is_empty());
        assert!(f.service.list_current_for_admin("").await.unwrap().is_empty());
        assert_eq!(f.service.list_all_for_user("alice-id", "alice-id", "").await.unwrap().len(), 1);

        let err = f.service.cancel(Requester::user("alice-id"), "alice-id", id).await.unwrap_err();
        assert_eq!(err, BookingError::Conflict("Booking date has already passed".to_string()));

        f.service.delete_history(Requester::user("alice-id"), "alice-id", id).await.unwrap();
        assert_eq!(f.store.booking_count().await, 0);
        assert_eq!(f.store.payment_count().await, 0);
    }

    #[tokio::test]
    async fn test_admin_cancels_and_deletes_any_booking() {
        let f = fixture().await;
        let created = f.service.create("alice-id", request("alice-id", &f.package, 1)).await.unwrap();
        let id = created.booking.id;

        // Admin pages put the admin's own id in the path.
        let cancelled = f.service.cancel(Requester::admin("admin-id"), "admin-id", id).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.buyer_id, "alice-id");

        // State rules still apply to admins.
        let err = f.service.cancel(Requester::admin("admin-id"), "admin-id", id).await.unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));

        f.service.delete_history(Requester::admin("admin-id"), "admin-id", id).await.unwrap();
        assert_eq!(f.store.booking_count().await, 0);
    }

    #[tokio::test]
    async fn test_admin_cannot_delete_upcoming_booking() {
        let f = fixture().await;
        let created = f.service.create("alice-id", request("alice-id", &f.package, 1)).await.unwrap();

        let err = f
            .service
            .delete_history(Requester::admin("admin-id"), "admin-id", created.booking.id)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));
        assert_eq!(f.store.booking_count().await, 1);
    }

    #[tokio::test]
    async fn test_delete_past_booking() {
        let f = fixture().await;
        let past = Booking::new(f.package.id, "alice-id".into(), Utc::now() - Duration::days(3), 1, 8000);
        f.store.insert_booking(past.clone()).await;

        let err = f.service.delete_history(Requester::user("bob-id"), "alice-id", past.id).await.unwrap_err();
        assert!(matches!(err, BookingError::Unauthorized(_)));

        f.service.delete_history(Requester::user("alice-id"), "alice-id", past.id).await.unwrap();
        assert_eq!(f.store.booking_count().await, 0);
    }

    #[tokio::test]
    async fn test_admin_search_by_buyer() {
        let f = fixture().await;
        let a = f.service.create("alice-id", request("alice-id", &f.package, 1)).await.unwrap();
        f.service.create("bob-id", request("bob-id", &f.package, 1)).await.unwrap();
        let c = f.service.create("carol-id", request("carol-id", &f.package, 1)).await.unwrap();

        // Booking whose buyer is unknown to the directory is dropped by the join
        let ghost = Booking::new(f.package.id, "ghost-id".into(), Utc::now() + Duration::days(5), 1, 8000);
        f.store.insert_booking(ghost).await;

        let found = f.service.list_current_for_admin("ALICE").await.unwrap();
        let ids: Vec<Uuid> = found.iter().map(|r| r.booking.id).collect();
        assert_eq!(ids, vec![a.booking.id, c.booking.id]);

        assert_eq!(f.service.list_all_for_admin("").await.unwrap().len(), 3);
        assert!(f.service.list_all_for_admin("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_user_search_by_package_name() {
        let f = fixture().await;
        let other = Package::new("Kerala Backwaters", "Kerala", 5000);
        f.store.add_package(other.clone()).await;

        f.service.create("alice-id", request("alice-id", &f.package, 1)).await.unwrap();
        let kerala = f.service.create("alice-id", request("alice-id", &other, 1)).await.unwrap();

        let found = f.service.list_all_for_user("alice-id", "alice-id", "kerala").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].booking.id, kerala.booking.id);

        // Removing the package drops its bookings from the joined listing
        f.store.remove_package(other.id).await;
        assert!(f.service.list_all_for_user("alice-id", "alice-id", "kerala").await.unwrap().is_empty());

        let err = f.service.list_all_for_user("bob-id", "alice-id", "").await.unwrap_err();
        assert!(matches!(err, BookingError::Unauthorized(_)));
    }
}
