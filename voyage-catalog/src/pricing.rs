use crate::package::{Package, PackageError};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("Party size must be at least 1")]
    NoPersons,

    #[error("Total price overflows for {persons} persons")]
    Overflow { persons: u32 },

    #[error(transparent)]
    InvalidPackage(#[from] PackageError),
}

/// Per-person price: the discount price when one is offered, the list price otherwise.
pub fn unit_price(package: &Package) -> i64 {
    package.discount_price.unwrap_or(package.price)
}

/// Total for a party, snapshotted onto the booking at creation time.
pub fn quote_total(package: &Package, persons: u32) -> Result<i64, PricingError> {
    if persons == 0 {
        return Err(PricingError::NoPersons);
    }
    package.validate()?;

    unit_price(package)
        .checked_mul(i64::from(persons))
        .ok_or(PricingError::Overflow { persons })
}
