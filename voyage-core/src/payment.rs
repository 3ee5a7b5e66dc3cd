use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use uuid::Uuid;
use voyage_shared::Masked;

use crate::StoreError;

/// Raw card input. Lives only for the duration of a booking request;
/// nothing here is persisted except what the gateway hands back.
#[derive(Debug, Clone)]
pub struct CardDetails {
    pub number: Masked<String>,
    pub cvv: Masked<String>,
    /// `MM/YY`
    pub expiry_date: String,
    pub name_on_card: String,
}

impl CardDetails {
    pub fn validate(&self, today: NaiveDate) -> Result<(), String> {
        let number = self.number.expose();
        if number.len() != 16 || !number.chars().all(|c| c.is_ascii_digit()) {
            return Err("Card number must be exactly 16 digits".to_string());
        }

        let cvv = self.cvv.expose();
        if !(3..=4).contains(&cvv.len()) || !cvv.chars().all(|c| c.is_ascii_digit()) {
            return Err("CVV must be 3 or 4 digits".to_string());
        }

        let (month, year) = parse_expiry(&self.expiry_date)
            .ok_or_else(|| "Expiry date must be in MM/YY format".to_string())?;
        if (year, month) < (today.year(), today.month()) {
            return Err("Card has expired".to_string());
        }

        Ok(())
    }

    pub fn last_four(&self) -> String {
        voyage_shared::pii::last_four(self.number.expose())
    }
}

/// Parse `MM/YY` into `(month, full year)`.
fn parse_expiry(expiry: &str) -> Option<(u32, i32)> {
    let (month, year) = expiry.trim().split_once('/')?;
    if month.len() != 2 || year.len() != 2 {
        return None;
    }
    let month: u32 = month.parse().ok()?;
    let year: i32 = year.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    Some((month, 2000 + year))
}

/// Opaque reference issued by the gateway in place of the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardToken {
    pub token: String,
    pub last_four: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Authorize `amount` against the card and return a token for it.
    async fn charge(
        &self,
        booking_id: Uuid,
        amount: i64,
        card: &CardDetails,
    ) -> Result<CardToken, StoreError>;

    /// Release an authorization that will not be captured.
    async fn void(&self, booking_id: Uuid, token: &CardToken) -> Result<(), StoreError>;
}

/// Accepts every well-formed card. Cards ending in `0000` are declined so
/// the failure path can be exercised without a real processor.
pub struct MockPaymentGateway;

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn charge(
        &self,
        booking_id: Uuid,
        amount: i64,
        card: &CardDetails,
    ) -> Result<CardToken, StoreError> {
        let last_four = card.last_four();
        if last_four == "0000" {
            return Err("Card declined by issuer".into());
        }

        tracing::info!("Mock gateway charged {} for booking {}", amount, booking_id);

        Ok(CardToken {
            token: format!("tok_{}", Uuid::new_v4().simple()),
            last_four,
        })
    }

    async fn void(&self, booking_id: Uuid, token: &CardToken) -> Result<(), StoreError> {
        tracing::info!("Mock gateway voided {} for booking {}", token.token, booking_id);
        Ok(())
    }
}
