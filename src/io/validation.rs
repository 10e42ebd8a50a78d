//! Row validation.
//!
//! Collects every problem found in one artifact row so a rejected row reports
//! all of its invalid fields at once.

use crate::models::{RefScheme, ScreenSizeError, SessionRef};
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error as ThisError;

/// A single invalid field in a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// The field that has an issue.
    pub field: &'static str,
    /// Description of the issue.
    pub message: String,
}

impl ValidationIssue {
    /// Creates an issue.
    #[must_use]
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// All issues found in one row, in column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssues(pub Vec<ValidationIssue>);

impl ValidationIssues {
    /// Returns whether any issue concerns `field`.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|i| i.field == field)
    }
}

impl fmt::Display for ValidationIssues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, issue) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

/// Why a row of an import artifact was skipped.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum RowError {
    /// The CSV layer could not produce a record.
    #[error("malformed CSV: {0}")]
    Csv(String),
    /// The record has the wrong number of columns.
    #[error("wrong number of fields: {got} (want: {want})")]
    Arity {
        /// Columns found.
        got: usize,
        /// Columns expected.
        want: usize,
    },
    /// The screen size column could not be parsed.
    #[error("size: {0}")]
    ScreenSize(#[from] ScreenSizeError),
    /// One or more fields failed validation.
    #[error("{0}")]
    Invalid(ValidationIssues),
}

/// Field-by-field validator for one row.
///
/// Each check records an issue on failure and returns a placeholder value,
/// so all columns are inspected before [`RowValidator::finish`] decides.
#[derive(Debug, Default)]
pub struct RowValidator {
    issues: Vec<ValidationIssue>,
}

impl RowValidator {
    /// Creates an empty validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.issues.push(ValidationIssue::new(field, message));
    }

    /// Requires a non-empty value.
    pub fn required(&mut self, field: &'static str, value: &str) {
        if value.is_empty() {
            self.push(field, "required field is empty");
        }
    }

    /// Parses a strict `true`/`false` literal.
    pub fn boolean(&mut self, field: &'static str, value: &str) -> bool {
        match value {
            "true" => true,
            "false" => false,
            _ => {
                self.push(field, format!("must be \"true\" or \"false\", got {value:?}"));
                false
            },
        }
    }

    /// Parses a decimal integer.
    pub fn integer(&mut self, field: &'static str, value: &str) -> i32 {
        value.parse().unwrap_or_else(|_| {
            self.push(field, format!("must be a whole number, got {value:?}"));
            0
        })
    }

    /// Parses an RFC 3339 timestamp and normalizes it to UTC.
    pub fn timestamp(&mut self, field: &'static str, value: &str) -> DateTime<Utc> {
        match DateTime::parse_from_rfc3339(value) {
            Ok(t) => t.with_timezone(&Utc),
            Err(e) => {
                self.push(field, format!("invalid date {value:?}: {e}"));
                DateTime::UNIX_EPOCH
            },
        }
    }

    /// Parses an optional referrer scheme; empty means absent.
    pub fn ref_scheme(&mut self, field: &'static str, value: &str) -> Option<RefScheme> {
        if value.is_empty() {
            return None;
        }
        let scheme = RefScheme::parse(value);
        if scheme.is_none() {
            let allowed: Vec<&str> = RefScheme::all().iter().map(RefScheme::as_str).collect();
            self.push(
                field,
                format!("must be one of {}, got {value:?}", allowed.join(", ")),
            );
        }
        scheme
    }

    /// Parses a session token; empty maps to the nil session.
    pub fn session(&mut self, field: &'static str, value: &str) -> SessionRef {
        if value.is_empty() {
            return SessionRef::default();
        }
        value.parse().unwrap_or_else(|e| {
            self.push(field, format!("{e}"));
            SessionRef::default()
        })
    }

    /// Returns the collected issues, if any.
    ///
    /// # Errors
    ///
    /// Returns [`RowError::Invalid`] when at least one check failed.
    pub fn finish(self) -> Result<(), RowError> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(RowError::Invalid(ValidationIssues(self.issues)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validator_valid_row() {
        let mut v = RowValidator::new();
        v.required("path", "/a");
        assert!(v.boolean("event", "true"));
        assert_eq!(v.integer("bot", "3"), 3);
        assert_eq!(v.ref_scheme("refScheme", "h"), Some(RefScheme::Http));
        assert_eq!(v.ref_scheme("refScheme", ""), None);
        assert!(v.finish().is_ok());
    }

    #[test]
    fn test_validator_collects_all_issues() {
        let mut v = RowValidator::new();
        v.required("path", "");
        v.boolean("event", "yes");
        v.integer("bot", "x");
        v.timestamp("createdAt", "2020-01-01");
        v.ref_scheme("refScheme", "z");

        let Err(RowError::Invalid(issues)) = v.finish() else {
            unreachable!("validation should fail");
        };
        assert_eq!(issues.0.len(), 5);
        assert!(issues.has_field("path"));
        assert!(issues.has_field("createdAt"));
        assert!(issues.to_string().starts_with("path: required field is empty"));
    }

    #[test]
    fn test_validator_strict_booleans() {
        for value in ["1", "TRUE", "True", "t", ""] {
            let mut v = RowValidator::new();
            v.boolean("event", value);
            assert!(v.finish().is_err(), "{value:?} should be rejected");
        }
    }

    #[test]
    fn test_validator_timestamp_offset_normalized() {
        let mut v = RowValidator::new();
        let t = v.timestamp("createdAt", "2020-06-01T12:00:00+02:00");
        assert!(v.finish().is_ok());
        assert_eq!(t.to_rfc3339(), "2020-06-01T10:00:00+00:00");
    }

    #[test]
    fn test_row_error_display() {
        let err = RowError::Arity { got: 3, want: 12 };
        assert_eq!(err.to_string(), "wrong number of fields: 3 (want: 12)");
    }
}
