use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// A purchasable travel itinerary.
///
/// Packages are reference data for the booking flow: bookings point at them
/// but never modify them. Prices are in currency minor units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Package {
    pub id: Uuid,
    pub name: String,
    pub destination: String,
    pub price: i64,
    pub discount_price: Option<i64>,
    pub rating: f64,
    pub total_ratings: i32,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PackageError {
    #[error("Package price must be positive, got {0}")]
    NonPositivePrice(i64),

    #[error("Discount price {discount} must be positive and below price {price}")]
    InvalidDiscount {
        price: i64,
        discount: i64,
    },
}

impl Package {
    pub fn new(name: impl Into<String>, destination: impl Into<String>, price: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            destination: destination.into(),
            price,
            discount_price: None,
            rating: 0.0,
            total_ratings: 0,
            images: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_discount(mut self, discount_price: i64) -> Self {
        self.discount_price = Some(discount_price);
        self
    }

    /// Whether a discount is currently offered
    pub fn has_offer(&self) -> bool {
        self.discount_price.is_some()
    }

    /// Check the catalog invariants: positive price, discount strictly below price.
    pub fn validate(&self) -> Result<(), PackageError> {
        if self.price <= 0 {
            return Err(PackageError::NonPositivePrice(self.price));
        }
        if let Some(discount) = self.discount_price {
            if discount <= 0 || discount >= self.price {
                return Err(PackageError::InvalidDiscount {
                    price: self.price,
                    discount,
                });
            }
        }
        Ok(())
    }
}
