//! Vietnamese phone number type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`PhoneNumber`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    /// The input string is empty.
    #[error("phone number cannot be empty")]
    Empty,
    /// The input contains characters other than digits, spaces, dots, dashes
    /// or a leading `+`.
    #[error("phone number contains invalid characters")]
    InvalidCharacters,
    /// The number does not have the 10 digits of a domestic number.
    #[error("phone number must have 10 digits (got {0})")]
    WrongLength(usize),
}

/// A domestic phone number in national format (`0xxxxxxxxx`).
///
/// The carrier API only accepts national format, so `+84` / `84` prefixes are
/// rewritten to a leading `0` and separators are stripped on parse.
///
/// ```
/// use caseforge_core::PhoneNumber;
///
/// assert_eq!(PhoneNumber::parse("+84 912 345 678").unwrap().as_str(), "0912345678");
/// assert!(PhoneNumber::parse("12345").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Number of digits in a national-format number.
    pub const DIGITS: usize = 10;

    /// Parse and normalise a phone number.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, contains unexpected characters,
    /// or does not normalise to exactly 10 digits.
    pub fn parse(s: &str) -> Result<Self, PhoneError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(PhoneError::Empty);
        }

        let (international, rest) = trimmed
            .strip_prefix('+')
            .map_or((false, trimmed), |rest| (true, rest));

        let mut digits = String::with_capacity(rest.len());
        for c in rest.chars() {
            match c {
                '0'..='9' => digits.push(c),
                ' ' | '.' | '-' => {}
                _ => return Err(PhoneError::InvalidCharacters),
            }
        }

        let national = match digits.strip_prefix("84") {
            Some(local) if international || digits.len() == Self::DIGITS + 1 => {
                format!("0{local}")
            }
            _ if international => return Err(PhoneError::InvalidCharacters),
            _ => digits,
        };

        if national.len() != Self::DIGITS || !national.starts_with('0') {
            return Err(PhoneError::WrongLength(national.len()));
        }

        Ok(Self(national))
    }

    /// Returns the number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = PhoneError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(value: PhoneNumber) -> Self {
        value.0
    }
}
