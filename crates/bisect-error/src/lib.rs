// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy with stable error codes for the bisect job broker.
//!
//! Every broker error carries an [`ErrorCode`] (a machine-readable, stable
//! string tag), a human-readable message, and arbitrary key-value context.
//! Use the builder returned by [`BrokerError::new`] to construct errors
//! fluently, then convert to an HTTP status with [`ErrorCode::status_hint`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Job schema / input validation failures.
    Validation,
    /// Lookup failures against the job or log store.
    NotFound,
    /// Optimistic-concurrency conflicts.
    Concurrency,
    /// Malformed or disallowed patch operations.
    Patch,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Concurrency => "concurrency",
            Self::Patch => "patch",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Validation --
    /// `POST /api/jobs` input violates the declared job schema.
    JobValidationFailed,

    // -- Not found --
    /// No job exists with the given id.
    JobNotFound,
    /// No log exists for the given job id.
    LogNotFound,

    // -- Concurrency --
    /// `If-Match` did not equal the job's current ETag.
    JobPreconditionFailed,

    // -- Patch --
    /// A patch operation was malformed, targeted a readonly attribute, or the
    /// resulting record failed post-apply schema validation.
    JobPatchRejected,

    // -- Internal --
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::JobValidationFailed => ErrorCategory::Validation,
            Self::JobNotFound | Self::LogNotFound => ErrorCategory::NotFound,
            Self::JobPreconditionFailed => ErrorCategory::Concurrency,
            Self::JobPatchRejected => ErrorCategory::Patch,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Stable `&'static str` representation of the code (e.g.
    /// `"JOB_NOT_FOUND"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JobValidationFailed => "JOB_VALIDATION_FAILED",
            Self::JobNotFound => "JOB_NOT_FOUND",
            Self::LogNotFound => "LOG_NOT_FOUND",
            Self::JobPreconditionFailed => "JOB_PRECONDITION_FAILED",
            Self::JobPatchRejected => "JOB_PATCH_REJECTED",
            Self::Internal => "INTERNAL",
        }
    }

    /// The HTTP status code an API layer should map this error to.
    ///
    /// This is the *default* mapping; one case does not fit a pure
    /// code→status table: [`Self::JobValidationFailed`] means 422 when it
    /// comes from job creation but 400 when it comes from a patch's
    /// post-apply schema re-check. Callers on the patch path should
    /// override this hint rather than trust it blindly.
    pub fn status_hint(&self) -> u16 {
        match self {
            Self::JobValidationFailed => 422,
            Self::JobPatchRejected => 400,
            Self::JobNotFound | Self::LogNotFound => 404,
            Self::JobPreconditionFailed => 412,
            Self::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// BrokerError
// ---------------------------------------------------------------------------

/// Unified broker error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, and arbitrary
/// structured context (e.g. the offending attribute name or patch path) so
/// clients can diagnose a failure without reading server logs.
///
/// # Examples
///
/// ```
/// use bisect_error::{BrokerError, ErrorCode};
///
/// let err = BrokerError::new(ErrorCode::JobNotFound, "no such job")
///     .with_context("id", "deadbeef");
/// assert_eq!(err.code, ErrorCode::JobNotFound);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Arbitrary structured context for diagnostics (attribute name, patch
    /// path, offending value, ...).
    pub context: BTreeMap<String, serde_json::Value>,
}

impl BrokerError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for BrokerError {}

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serialisable snapshot of a [`BrokerError`], suitable as an HTTP error body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerErrorDto {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured context.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl From<&BrokerError> for BrokerErrorDto {
    fn from(err: &BrokerError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
            context: err.context.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::JobValidationFailed,
        ErrorCode::JobNotFound,
        ErrorCode::LogNotFound,
        ErrorCode::JobPreconditionFailed,
        ErrorCode::JobPatchRejected,
        ErrorCode::Internal,
    ];

    #[test]
    fn basic_construction() {
        let err = BrokerError::new(ErrorCode::Internal, "boom");
        assert_eq!(err.code, ErrorCode::Internal);
        assert_eq!(err.message, "boom");
        assert!(err.context.is_empty());
    }

    #[test]
    fn display_without_context() {
        let err = BrokerError::new(ErrorCode::JobNotFound, "no such job");
        assert_eq!(err.to_string(), "[JOB_NOT_FOUND] no such job");
    }

    #[test]
    fn display_with_context() {
        let err = BrokerError::new(ErrorCode::JobValidationFailed, "bad field")
            .with_context("field", "platform");
        let s = err.to_string();
        assert!(s.starts_with("[JOB_VALIDATION_FAILED] bad field"));
        assert!(s.contains("platform"));
    }

    #[test]
    fn category_mapping() {
        assert_eq!(
            ErrorCode::JobValidationFailed.category(),
            ErrorCategory::Validation
        );
        assert_eq!(ErrorCode::JobNotFound.category(), ErrorCategory::NotFound);
        assert_eq!(ErrorCode::LogNotFound.category(), ErrorCategory::NotFound);
        assert_eq!(
            ErrorCode::JobPreconditionFailed.category(),
            ErrorCategory::Concurrency
        );
        assert_eq!(ErrorCode::JobPatchRejected.category(), ErrorCategory::Patch);
        assert_eq!(ErrorCode::Internal.category(), ErrorCategory::Internal);
    }

    #[test]
    fn builder_with_context_multiple_keys() {
        let err = BrokerError::new(ErrorCode::JobPatchRejected, "bad patch")
            .with_context("path", "/id")
            .with_context("op", "replace");
        assert_eq!(err.context.len(), 2);
        assert_eq!(err.context["path"], serde_json::json!("/id"));
        assert_eq!(err.context["op"], serde_json::json!("replace"));
    }

    #[test]
    fn all_codes_have_unique_as_str() {
        let mut seen = HashSet::new();
        for code in ALL_CODES {
            assert!(seen.insert(code.as_str()), "duplicate as_str: {code}");
        }
        assert_eq!(seen.len(), ALL_CODES.len());
    }

    #[test]
    fn all_codes_serialize_to_as_str() {
        for code in ALL_CODES {
            let json = serde_json::to_string(code).unwrap();
            assert_eq!(json, format!(r#""{}""#, code.as_str()));
        }
    }

    #[test]
    fn dto_roundtrip() {
        let err = BrokerError::new(ErrorCode::JobNotFound, "missing").with_context("id", "abc");
        let dto: BrokerErrorDto = (&err).into();
        let json = serde_json::to_string(&dto).unwrap();
        let back: BrokerErrorDto = serde_json::from_str(&json).unwrap();
        assert_eq!(dto, back);
    }

    #[test]
    fn dto_omits_empty_context() {
        let err = BrokerError::new(ErrorCode::Internal, "oops");
        let dto: BrokerErrorDto = (&err).into();
        let json = serde_json::to_string(&dto).unwrap();
        assert!(!json.contains("context"));
    }
}
