//! Structural validation for registry inputs.
//!
//! The request layer checks field presence before calling core, but core
//! repeats the structural checks so it stays safe to call directly.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

static NATIONAL_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{9}|[0-9]{12})$").expect("valid national id regex"));

/// Validation failures detected on input models before any write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelValidationError {
    /// Household code is empty after trim.
    BlankHouseholdCode,
    /// Person full name is empty after trim.
    BlankFullName,
    /// National id is not 9 or 12 ASCII digits.
    MalformedNationalId(String),
    /// A range ends before it starts.
    InvertedDateRange { field: &'static str },
    /// Date of birth lies after the membership start.
    BornAfterStart,
}

impl Display for ModelValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankHouseholdCode => write!(f, "household code must not be blank"),
            Self::BlankFullName => write!(f, "full name must not be blank"),
            Self::MalformedNationalId(value) => {
                write!(f, "national id `{value}` must be 9 or 12 digits")
            }
            Self::InvertedDateRange { field } => {
                write!(f, "`{field}` ends before it starts")
            }
            Self::BornAfterStart => {
                write!(f, "date of birth must not be after membership start")
            }
        }
    }
}

impl Error for ModelValidationError {}

/// Trims a national id and checks its shape.
///
/// Returns `Ok(None)` for blank input, which is treated as "not supplied".
pub fn normalize_national_id(
    value: Option<&str>,
) -> Result<Option<String>, ModelValidationError> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if !NATIONAL_ID_RE.is_match(trimmed) {
        return Err(ModelValidationError::MalformedNationalId(
            trimmed.to_string(),
        ));
    }
    Ok(Some(trimmed.to_string()))
}

/// Trims free text and maps blank input to `None`.
pub fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
