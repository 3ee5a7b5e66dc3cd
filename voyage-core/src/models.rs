use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use voyage_catalog::Package;
use voyage_shared::Masked;

use crate::payment::CardDetails;
use crate::service::BookingRules;
use crate::BookingError;

/// Booking status. `Booked -> Cancelled` is the only transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BookingStatus {
    Booked,
    Cancelled,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::Booked => write!(f, "Booked"),
            BookingStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Booked" => Ok(BookingStatus::Booked),
            "Cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("Unknown booking status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentStatus {
    Paid,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Paid")
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Paid" => Ok(PaymentStatus::Paid),
            other => Err(format!("Unknown payment status: {}", other)),
        }
    }
}

/// A buyer's reservation of a package for a date and party size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub package_id: Uuid,
    pub buyer_id: String,
    pub date: DateTime<Utc>,
    pub persons: u32,
    /// Snapshot of `persons * unit_price` at booking time
    pub total_price: i64,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(package_id: Uuid, buyer_id: String, date: DateTime<Utc>, persons: u32, total_price: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            package_id,
            buyer_id,
            date,
            persons,
            total_price,
            status: BookingStatus::Booked,
            created_at: Utc::now(),
        }
    }

    /// Active and still ahead of `now`.
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Booked && self.date > now
    }

    /// Cancelled or already travelled.
    pub fn is_history(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Cancelled || self.date < now
    }

    pub fn ensure_cancellable(&self, now: DateTime<Utc>) -> Result<(), BookingError> {
        if self.status == BookingStatus::Cancelled {
            return Err(BookingError::Conflict("Booking is already cancelled".to_string()));
        }
        if self.date <= now {
            return Err(BookingError::Conflict("Booking date has already passed".to_string()));
        }
        Ok(())
    }

    pub fn ensure_deletable(&self, now: DateTime<Utc>) -> Result<(), BookingError> {
        if !self.is_history(now) {
            return Err(BookingError::Conflict(
                "Only past or cancelled bookings can be deleted".to_string(),
            ));
        }
        Ok(())
    }

    /// Transition: Booked -> Cancelled. Returns false when already cancelled.
    pub fn cancel(&mut self) -> bool {
        if self.status != BookingStatus::Booked {
            return false;
        }
        self.status = BookingStatus::Cancelled;
        true
    }
}

/// Payment record linked 1:1 to a booking. Holds a gateway token, never the card itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub card_token: String,
    pub card_last_four: String,
    pub expiry_date: String,
    pub name_on_card: String,
    pub amount: i64,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn masked_card(&self) -> String {
        voyage_shared::pii::mask_card_number(&self.card_last_four)
    }
}

/// The subset of a user account needed for admin search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuyerProfile {
    pub id: String,
    pub username: String,
    pub email: String,
}

/// A booking joined with its package and buyer. Either side is `None`
/// when the referenced record no longer exists.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BookingRecord {
    pub booking: Booking,
    pub package: Option<Package>,
    pub buyer: Option<BuyerProfile>,
}

/// Incoming booking request. Every field is optional so that missing input
/// is reported as a validation failure rather than a decode error.
#[derive(Debug, Clone, Default)]
pub struct NewBooking {
    pub package_id: Option<Uuid>,
    pub buyer: Option<String>,
    pub total_price: Option<i64>,
    pub persons: Option<u32>,
    pub date: Option<DateTime<Utc>>,
    pub card_number: Option<Masked<String>>,
    pub cvv: Option<Masked<String>>,
    pub expiry_date: Option<String>,
    pub name_on_card: Option<String>,
    pub idempotency_key: Option<String>,
}

/// A request that passed presence and format checks.
#[derive(Debug, Clone)]
pub struct ValidatedBooking {
    pub package_id: Uuid,
    pub buyer: String,
    pub total_price: i64,
    pub persons: u32,
    pub date: DateTime<Utc>,
    pub card: CardDetails,
    pub idempotency_key: Option<String>,
}

fn present(value: &Option<String>) -> Option<String> {
    value.as_ref().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn present_masked(value: &Option<Masked<String>>) -> Option<Masked<String>> {
    value
        .as_ref()
        .map(|v| v.expose().trim().to_string())
        .filter(|v| !v.is_empty())
        .map(Masked)
}

impl NewBooking {
    /// Names of required fields that are absent, empty or zero.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.package_id.is_none() {
            missing.push("packageDetails");
        }
        if present(&self.buyer).is_none() {
            missing.push("buyer");
        }
        if self.total_price.unwrap_or(0) == 0 {
            missing.push("totalPrice");
        }
        if self.persons.unwrap_or(0) == 0 {
            missing.push("persons");
        }
        if self.date.is_none() {
            missing.push("date");
        }
        if present_masked(&self.card_number).is_none() {
            missing.push("cardNumber");
        }
        if present_masked(&self.cvv).is_none() {
            missing.push("cvv");
        }
        if present(&self.expiry_date).is_none() {
            missing.push("expiryDate");
        }
        if present(&self.name_on_card).is_none() {
            missing.push("nameOnCard");
        }
        missing
    }

    pub fn validate(&self, now: DateTime<Utc>, rules: &BookingRules) -> Result<ValidatedBooking, BookingError> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            tracing::warn!("Booking request missing fields: {}", missing.join(", "));
            return Err(BookingError::Validation(
                "All fields (including payment) are required!".to_string(),
            ));
        }

        let (Some(package_id), Some(buyer), Some(total_price), Some(persons), Some(date)) = (
            self.package_id,
            present(&self.buyer),
            self.total_price,
            self.persons,
            self.date,
        ) else {
            return Err(BookingError::Validation(
                "All fields (including payment) are required!".to_string(),
            ));
        };

        if total_price < 0 {
            return Err(BookingError::Validation("Total price must be positive".to_string()));
        }
        if persons > rules.max_persons {
            return Err(BookingError::Validation(format!(
                "Party size must be between 1 and {}",
                rules.max_persons
            )));
        }
        if date <= now {
            return Err(BookingError::Validation("Travel date must be in the future".to_string()));
        }

        let card = CardDetails {
            number: present_masked(&self.card_number).unwrap_or_default(),
            cvv: present_masked(&self.cvv).unwrap_or_default(),
            expiry_date: present(&self.expiry_date).unwrap_or_default(),
            name_on_card: present(&self.name_on_card).unwrap_or_default(),
        };
        card.validate(now.date_naive()).map_err(BookingError::Validation)?;

        Ok(ValidatedBooking {
            package_id,
            buyer,
            total_price,
            persons,
            date,
            card,
            idempotency_key: present(&self.idempotency_key),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn complete_request() -> NewBooking {
        NewBooking {
            package_id: Some(Uuid::new_v4()),
            buyer: Some("user-1".to_string()),
            total_price: Some(16000),
            persons: Some(2),
            date: Some(Utc::now() + Duration::days(30)),
            card_number: Some(Masked::from("4242424242424242")),
            cvv: Some(Masked::from("123")),
            expiry_date: Some("12/99".to_string()),
            name_on_card: Some("Alice Traveler".to_string()),
            idempotency_key: None,
        }
    }

    #[test]
    fn test_status_round_trip_strings() {
        assert_eq!(BookingStatus::Booked.to_string(), "Booked");
        assert_eq!("Cancelled".parse::<BookingStatus>(), Ok(BookingStatus::Cancelled));
        assert!("cancelled".parse::<BookingStatus>().is_err());
        assert_eq!(serde_json::to_string(&BookingStatus::Cancelled).unwrap(), "\"Cancelled\"");
    }

    #[test]
    fn test_cancel_is_one_way() {
        let mut booking = Booking::new(Uuid::new_v4(), "user-1".into(), Utc::now() + Duration::days(3), 1, 100);
        assert!(booking.cancel());
        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert!(!booking.cancel());
        assert_eq!(booking.status, BookingStatus::Cancelled);
    }

    #[test]
    fn test_current_and_history() {
        let now = Utc::now();
        let mut upcoming = Booking::new(Uuid::new_v4(), "u".into(), now + Duration::days(1), 1, 100);
        let past = Booking::new(Uuid::new_v4(), "u".into(), now - Duration::days(1), 1, 100);

        assert!(upcoming.is_current(now));
        assert!(!upcoming.is_history(now));
        assert!(upcoming.ensure_deletable(now).is_err());

        assert!(!past.is_current(now));
        assert!(past.is_history(now));
        assert!(past.ensure_cancellable(now).is_err());
        assert!(past.ensure_deletable(now).is_ok());

        upcoming.cancel();
        assert!(upcoming.is_history(now));
        assert_eq!(
            upcoming.ensure_cancellable(now),
            Err(BookingError::Conflict("Booking is already cancelled".to_string()))
        );
    }

    #[test]
    fn test_missing_fields_reported() {
        let mut request = complete_request();
        assert!(request.missing_fields().is_empty());

        request.cvv = Some(Masked::from("  "));
        request.persons = Some(0);
        request.name_on_card = None;
        assert_eq!(request.missing_fields(), vec!["persons", "cvv", "nameOnCard"]);

        let err = request.validate(Utc::now(), &BookingRules::default()).unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
    }

    #[test]
    fn test_validate_rejects_past_date_and_large_party() {
        let rules = BookingRules::default();

        let mut request = complete_request();
        request.date = Some(Utc::now() - Duration::hours(1));
        assert!(matches!(request.validate(Utc::now(), &rules), Err(BookingError::Validation(_))));

        let mut request = complete_request();
        request.persons = Some(rules.max_persons + 1);
        assert!(matches!(request.validate(Utc::now(), &rules), Err(BookingError::Validation(_))));
    }

    #[test]
    fn test_validate_trims_and_keeps_key() {
        let mut request = complete_request();
        request.buyer = Some("  user-1 ".to_string());
        request.idempotency_key = Some("abc".to_string());

        let valid = request.validate(Utc::now(), &BookingRules::default()).unwrap();
        assert_eq!(valid.buyer, "user-1");
        assert_eq!(valid.idempotency_key.as_deref(), Some("abc"));
        assert_eq!(valid.card.number.expose(), "4242424242424242");
    }
}
