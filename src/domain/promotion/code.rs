//! Promo code text value object.
//!
//! # Validation Rules
//!
//! - Surrounding whitespace is trimmed, letters are uppercased
//! - Characters: `A-Z`, `0-9`, `_`, `-`
//! - Length: 3-64 characters

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::ValidationError;

pub const MIN_CODE_LEN: usize = 3;
pub const MAX_CODE_LEN: usize = 64;

/// A normalized promo code string, e.g. `SPRING_25`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NormalizedCode(String);

impl NormalizedCode {
    /// Normalizes and validates user-entered code text.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the code is empty, outside 3-64
    /// characters, or contains characters other than letters, digits,
    /// underscore, and hyphen.
    pub fn try_new(code: &str) -> Result<Self, ValidationError> {
        let trimmed = code.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::empty_field("promo_code"));
        }

        let normalized = trimmed.to_ascii_uppercase();

        let len = normalized.chars().count();
        if !(MIN_CODE_LEN..=MAX_CODE_LEN).contains(&len) {
            return Err(ValidationError::out_of_range(
                "promo_code",
                MIN_CODE_LEN as i64,
                MAX_CODE_LEN as i64,
                len as i64,
            ));
        }

        if let Some(bad) = normalized
            .chars()
            .find(|c| !(c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '_' || *c == '-'))
        {
            return Err(ValidationError::invalid_format(
                "promo_code",
                format!("unexpected character '{}'", bad),
            ));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for NormalizedCode {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl TryFrom<String> for NormalizedCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_new(&value)
    }
}

impl From<NormalizedCode> for String {
    fn from(code: NormalizedCode) -> Self {
        code.0
    }
}
