//! Human-readable order numbers.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Globally unique, human-readable order number: `ORD-<YYYYMMDD>-<8 hex>`.
///
/// The date is the UTC creation date; the suffix is the first eight hex
/// digits of a random UUID, upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Generates a fresh order number for today (UTC).
    pub fn generate() -> Self {
        Self::generate_on(Utc::now().date_naive())
    }

    /// Generates a fresh order number for the given date.
    pub fn generate_on(date: NaiveDate) -> Self {
        let unique = Uuid::new_v4().simple().to_string();
        Self(format!(
            "ORD-{}-{}",
            date.format("%Y%m%d"),
            unique[..8].to_uppercase()
        ))
    }

    /// Wraps an existing order number (e.g. loaded from storage).
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the order number as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Object key under which the invoice document for this order is stored.
    ///
    /// Deterministic, so re-processing the same order overwrites one object.
    pub fn document_name(&self) -> String {
        format!("{}.pdf", self.0)
    }

    /// Returns true if the value matches `ORD-<8 digits>-<8 hex>`.
    pub fn is_well_formed(&self) -> bool {
        let mut parts = self.0.split('-');
        let (Some("ORD"), Some(date), Some(suffix), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return false;
        };
        date.len() == 8
            && date.chars().all(|c| c.is_ascii_digit())
            && NaiveDate::parse_from_str(date, "%Y%m%d").is_ok()
            && suffix.len() == 8
            && suffix
                .chars()
                .all(|c| c.is_ascii_digit() || (c.is_ascii_uppercase() && c.is_ascii_hexdigit()))
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for OrderNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
