pub mod package;
pub mod pricing;

pub use package::{Package, PackageError};
pub use pricing::{quote_total, unit_price, PricingError};
