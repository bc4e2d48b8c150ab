//! Contact record, draft, and field validation.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ContactId;

/// Minimum length of a contact name, in characters.
pub const NAME_MIN_LEN: usize = 3;
/// Minimum length of a phone number, in characters.
pub const NUMBER_MIN_LEN: usize = 8;

static NUMBER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2,3}-)?\d+$").expect("static phone number pattern"));

/// Fully materialized, authoritative contact record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Stable contact identifier.
    pub id: ContactId,
    /// Display name, unique across the phonebook.
    pub name: String,
    /// Phone number.
    pub number: String,
}

/// Candidate fields used to create or replace a [`Contact`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDraft {
    /// Display name.
    pub name: String,
    /// Phone number.
    pub number: String,
}

impl ContactDraft {
    /// Builds a draft from anything string-like.
    pub fn new(name: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            number: number.into(),
        }
    }

    /// Checks every field and collects all violations.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Vec::new();

        if let Some(v) = check_name(&self.name) {
            violations.push(v);
        }
        if let Some(v) = check_number(&self.number) {
            violations.push(v);
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { violations })
        }
    }

    pub(crate) fn into_contact(self, id: ContactId) -> Contact {
        Contact {
            id,
            name: self.name,
            number: self.number,
        }
    }
}

/// Field that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// The `name` field.
    Name,
    /// The `number` field.
    Number,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Name => f.write_str("name"),
            Field::Number => f.write_str("number"),
        }
    }
}

/// Why a single field was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// Field was empty.
    Required,
    /// Field was shorter than the given minimum.
    TooShort {
        /// Minimum allowed length.
        min: usize,
    },
    /// Field did not match the phone number pattern.
    BadFormat,
}

/// A rejected field together with the offending value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Rejected field.
    pub field: Field,
    /// Value as submitted.
    pub value: String,
    /// Kind of failure.
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ViolationKind::Required => write!(f, "{} is required", self.field),
            ViolationKind::TooShort { min } => write!(
                f,
                "{}: `{}` is shorter than the minimum allowed length ({min})",
                self.field, self.value
            ),
            ViolationKind::BadFormat => {
                write!(f, "{}: `{}` is not a valid phone number", self.field, self.value)
            }
        }
    }
}

/// One or more fields failed their length/format constraints.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("contact validation failed: {}", join_violations(.violations))]
pub struct ValidationError {
    /// Every violation found, in field order.
    pub violations: Vec<Violation>,
}

impl ValidationError {
    /// Returns true when `field` is among the violations.
    pub fn involves(&self, field: Field) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

// Measured on the trimmed name, the same form the uniqueness index keys on.
fn check_name(name: &str) -> Option<Violation> {
    let trimmed = name.trim();
    let kind = if trimmed.is_empty() {
        ViolationKind::Required
    } else if trimmed.chars().count() < NAME_MIN_LEN {
        ViolationKind::TooShort { min: NAME_MIN_LEN }
    } else {
        return None;
    };
    Some(Violation {
        field: Field::Name,
        value: name.to_string(),
        kind,
    })
}

fn check_number(number: &str) -> Option<Violation> {
    let kind = if number.is_empty() {
        ViolationKind::Required
    } else if number.chars().count() < NUMBER_MIN_LEN {
        ViolationKind::TooShort {
            min: NUMBER_MIN_LEN,
        }
    } else if !NUMBER_PATTERN.is_match(number) {
        ViolationKind::BadFormat
    } else {
        return None;
    };
    Some(Violation {
        field: Field::Number,
        value: number.to_string(),
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_hyphenated_numbers() {
        assert!(ContactDraft::new("Ada Lovelace", "09-1234567").validate().is_ok());
        assert!(ContactDraft::new("Ada Lovelace", "040-22334455").validate().is_ok());
        assert!(ContactDraft::new("Ada Lovelace", "12345678").validate().is_ok());
    }

    #[test]
    fn rejects_malformed_numbers() {
        for number in ["1-22334455", "1234-556677", "12-34-5678", "040 223344", "+3581234567"] {
            let err = ContactDraft::new("Ada Lovelace", number).validate().unwrap_err();
            assert!(err.involves(Field::Number), "{number} should be rejected");
            assert!(!err.involves(Field::Name));
        }
    }

    #[test]
    fn reports_every_offending_field() {
        let err = ContactDraft::new("Al", "123").validate().unwrap_err();
        assert_eq!(err.violations.len(), 2);
        assert_eq!(
            err.to_string(),
            "contact validation failed: name: `Al` is shorter than the minimum allowed length (3), \
             number: `123` is shorter than the minimum allowed length (8)"
        );
    }

    #[test]
    fn name_length_ignores_surrounding_whitespace() {
        let err = ContactDraft::new("  A", "12345678").validate().unwrap_err();
        assert_eq!(err.violations[0].kind, ViolationKind::TooShort { min: NAME_MIN_LEN });

        let err = ContactDraft::new("   ", "12345678").validate().unwrap_err();
        assert_eq!(err.violations[0].kind, ViolationKind::Required);
        assert_eq!(err.to_string(), "contact validation failed: name is required");

        assert!(ContactDraft::new(" Ada ", "12345678").validate().is_ok());
    }

    #[test]
    fn missing_fields_name_the_field_once() {
        let err = ContactDraft::new("", "").validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "contact validation failed: name is required, number is required"
        );
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        assert!(ContactDraft::new("Åsa", "12345678").validate().is_ok());
        assert!(ContactDraft::new("Åö", "12345678").validate().is_err());
    }
}
