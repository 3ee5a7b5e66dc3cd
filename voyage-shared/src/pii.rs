use serde::{Serialize, Deserialize, Serializer};
use std::fmt;

/// A wrapper for sensitive data that masks its value in Debug and Display output.
///
/// Serialization passes the inner value through; the wrapper exists so that
/// `tracing::info!("{:?}", request)` can never leak a card number or CVV.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl From<&str> for Masked<String> {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Last four characters of a card number, or the whole value when shorter.
pub fn last_four(card_number: &str) -> String {
    let chars: Vec<char> = card_number.chars().collect();
    let start = chars.len().saturating_sub(4);
    chars[start..].iter().collect()
}

/// Display form of a card number: `**** **** **** 1234`.
pub fn mask_card_number(card_number: &str) -> String {
    format!("**** **** **** {}", last_four(card_number))
}
