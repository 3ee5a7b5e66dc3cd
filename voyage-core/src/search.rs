use voyage_catalog::Package;

use crate::models::BuyerProfile;

/// Trim a `searchTerm` query value. A missing term matches everything.
pub fn normalize_term(term: Option<&str>) -> String {
    term.map(str::trim).unwrap_or_default().to_string()
}

/// Case-insensitive substring match
pub fn matches_term(haystack: &str, term: &str) -> bool {
    term.is_empty() || haystack.to_lowercase().contains(&term.to_lowercase())
}

pub fn buyer_matches(buyer: &BuyerProfile, term: &str) -> bool {
    matches_term(&buyer.username, term) || matches_term(&buyer.email, term)
}

pub fn package_matches(package: &Package, term: &str) -> bool {
    matches_term(&package.name, term)
}
