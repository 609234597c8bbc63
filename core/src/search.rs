//! Keyword filtering over requests and allocations.
//!
//! Search is a plain predicate pass over a listing: case-insensitive
//! substring match against the text fields a user would recognise.

use crate::error::{LifecycleError, Result};
use crate::types::{Allocation, Request};

/// A validated, lower-cased search keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword(String);

impl Keyword {
    /// Parse user input into a keyword.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Validation`] if the input is blank.
    ///
    /// # Examples
    ///
    /// ```
    /// use asset_lifecycle_core::search::Keyword;
    ///
    /// let keyword = Keyword::parse("  Laptop ").unwrap();
    /// assert_eq!(keyword.as_str(), "laptop");
    /// assert!(keyword.matches("Broken LAPTOP screen"));
    /// assert!(Keyword::parse("   ").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(LifecycleError::validation("keyword", "must not be blank"));
        }
        Ok(Self(trimmed.to_lowercase()))
    }

    /// The normalised keyword.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive substring test.
    #[must_use]
    pub fn matches(&self, haystack: &str) -> bool {
        haystack.to_lowercase().contains(&self.0)
    }
}

/// Records that can be matched against a [`Keyword`].
pub trait Searchable {
    /// Whether any searchable field contains the keyword.
    fn matches_keyword(&self, keyword: &Keyword) -> bool;
}

impl Searchable for Request {
    fn matches_keyword(&self, keyword: &Keyword) -> bool {
        self.reason.as_deref().is_some_and(|r| keyword.matches(r))
            || keyword.matches(self.status.label())
            || keyword.matches(self.device_id.as_str())
            || keyword.matches(self.employee_id.as_str())
    }
}

impl Searchable for Allocation {
    fn matches_keyword(&self, keyword: &Keyword) -> bool {
        self.notes.as_deref().is_some_and(|n| keyword.matches(n))
            || self
                .return_condition
                .is_some_and(|c| keyword.matches(c.label()))
            || keyword.matches(self.status().label())
            || keyword.matches(self.device_id.as_str())
            || keyword.matches(self.employee_id.as_str())
    }
}

/// Keep only the records matching `keyword`, preserving order.
#[must_use]
pub fn filter_by_keyword<T: Searchable>(records: Vec<T>, keyword: &Keyword) -> Vec<T> {
    records
        .into_iter()
        .filter(|record| record.matches_keyword(keyword))
        .collect()
}
