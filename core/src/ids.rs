//! Identifier types for requests, allocations, devices and employees.
//!
//! Request and allocation ids are assigned by their repositories and are
//! plain positive integers. Device and employee ids come from outside the
//! subsystem (asset tags, staff numbers) and are validated on the way in.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Longest accepted device or employee identifier.
pub const MAX_EXTERNAL_ID_LEN: usize = 64;

/// Error type for external identifier parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseIdError {
    /// The identifier was empty or only whitespace.
    #[error("identifier cannot be blank")]
    Blank,

    /// The identifier exceeded [`MAX_EXTERNAL_ID_LEN`].
    #[error("identifier is {0} characters long, maximum is {MAX_EXTERNAL_ID_LEN}")]
    TooLong(usize),

    /// The identifier contained a character outside `[A-Za-z0-9._-]`.
    #[error("identifier contains invalid character {0:?}")]
    InvalidCharacter(char),
}

fn validate_external_id(raw: &str) -> Result<String, ParseIdError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ParseIdError::Blank);
    }
    let len = trimmed.chars().count();
    if len > MAX_EXTERNAL_ID_LEN {
        return Err(ParseIdError::TooLong(len));
    }
    if let Some(bad) = trimmed
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(ParseIdError::InvalidCharacter(bad));
    }
    Ok(trimmed.to_string())
}

/// Identifier of a [`Request`](crate::types::Request), assigned by the repository.
///
/// # Examples
///
/// ```
/// use asset_lifecycle_core::ids::RequestId;
///
/// let id = RequestId::new(7);
/// assert_eq!(id.value(), 7);
/// assert_eq!(id.to_string(), "7");
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(u64);

impl RequestId {
    /// Wrap a raw repository id.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw id.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Identifier of an [`Allocation`](crate::types::Allocation), assigned by the repository.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AllocationId(u64);

impl AllocationId {
    /// Wrap a raw repository id.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw id.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AllocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for AllocationId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Asset tag of a device.
///
/// # Validation
///
/// - `FromStr::from_str()` / [`DeviceId::parse`]: trims, rejects blank,
///   overlong, or non `[A-Za-z0-9._-]` input
/// - `new()`: no validation (trusted input, e.g. rows read back from storage)
///
/// # Examples
///
/// ```
/// use asset_lifecycle_core::ids::DeviceId;
///
/// let id: DeviceId = " LAPTOP-042 ".parse().unwrap();
/// assert_eq!(id.as_str(), "LAPTOP-042");
/// assert!("lap top".parse::<DeviceId>().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a `DeviceId` without validation.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse and validate a device id from user input.
    ///
    /// # Errors
    ///
    /// Returns [`ParseIdError`] if the input is blank, too long, or contains
    /// characters outside `[A-Za-z0-9._-]`.
    pub fn parse(raw: &str) -> Result<Self, ParseIdError> {
        validate_external_id(raw).map(Self)
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Staff identifier of the employee making a request.
///
/// Same validation rules as [`DeviceId`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EmployeeId(String);

impl EmployeeId {
    /// Create an `EmployeeId` without validation.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse and validate an employee id from user input.
    ///
    /// # Errors
    ///
    /// Returns [`ParseIdError`] if the input is blank, too long, or contains
    /// characters outside `[A-Za-z0-9._-]`.
    pub fn parse(raw: &str) -> Result<Self, ParseIdError> {
        validate_external_id(raw).map(Self)
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EmployeeId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for EmployeeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    mod external_id_tests {
        use super::*;

        #[test]
        fn parse_trims_whitespace() {
            let id: DeviceId = "  D1  ".parse().expect("parse should succeed");
            assert_eq!(id, DeviceId::new("D1"));
        }

        #[test]
        fn parse_blank_fails() {
            assert_eq!(DeviceId::parse(""), Err(ParseIdError::Blank));
            assert_eq!(EmployeeId::parse("   "), Err(ParseIdError::Blank));
        }

        #[test]
        fn parse_rejects_invalid_characters() {
            assert_eq!(
                EmployeeId::parse("E 7"),
                Err(ParseIdError::InvalidCharacter(' '))
            );
            assert_eq!(
                DeviceId::parse("D1;drop"),
                Err(ParseIdError::InvalidCharacter(';'))
            );
        }

        #[test]
        fn parse_rejects_overlong_ids() {
            let raw = "x".repeat(MAX_EXTERNAL_ID_LEN + 1);
            assert_eq!(
                DeviceId::parse(&raw),
                Err(ParseIdError::TooLong(MAX_EXTERNAL_ID_LEN + 1))
            );
            assert!(DeviceId::parse(&"x".repeat(MAX_EXTERNAL_ID_LEN)).is_ok());
        }

        #[test]
        fn accepts_dots_dashes_underscores() {
            assert!(DeviceId::parse("mac-book_pro.14").is_ok());
        }
    }

    mod numeric_id_tests {
        use super::*;

        #[test]
        fn ordering_follows_value() {
            assert!(RequestId::new(1) < RequestId::new(2));
            assert!(AllocationId::new(10) > AllocationId::new(9));
        }

        #[test]
        fn display() {
            assert_eq!(format!("{}", AllocationId::new(42)), "42");
            assert_eq!(format!("{}", RequestId::from(3_u64)), "3");
        }
    }
}
