use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

/// Stable error taxonomy handed to callers.
///
/// Callers map these onto their own protocol responses. The names are part of
/// the serialized contract and must not change.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Unknown complexity, malformed shape, or a non-whitelisted filter.
    InvalidSpecification,
    /// Operation outside {create, read, update, delete}.
    InvalidOperation,
    /// Bad parameter types or ranges.
    ValidationError,
    /// Zero or more than one match where a unique target was required.
    AmbiguousTarget,
    NotFound,
    /// The storage layer rejected the mutation.
    ConstraintViolation,
    /// Interactive step/time budget exceeded, or the run was cancelled.
    Aborted,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidSpecification => "InvalidSpecification",
            ErrorKind::InvalidOperation => "InvalidOperation",
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::AmbiguousTarget => "AmbiguousTarget",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::ConstraintViolation => "ConstraintViolation",
            ErrorKind::Aborted => "Aborted",
        }
    }

    /// True for kinds raised by the plan validator, before any storage access.
    pub fn is_specification_error(self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidSpecification | ErrorKind::InvalidOperation
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum PlanGateError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid specification: {0}")]
    InvalidSpecification(String),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Ambiguous target: {0} records match")]
    AmbiguousTarget(usize),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("Aborted: {0}")]
    Aborted(String),
    #[error("Planner error: {0}")]
    Planner(String),
}

impl PlanGateError {
    /// Maps any internal error onto the public taxonomy.
    ///
    /// Storage failures that are not constraint violations are still reported
    /// as `ConstraintViolation`: from the caller's point of view the store
    /// rejected the operation. The raw error is only logged.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlanGateError::InvalidSpecification(_) => ErrorKind::InvalidSpecification,
            PlanGateError::InvalidOperation(_) => ErrorKind::InvalidOperation,
            PlanGateError::JsonError(_) => ErrorKind::InvalidSpecification,
            PlanGateError::ValidationError(_) => ErrorKind::ValidationError,
            PlanGateError::AmbiguousTarget(_) => ErrorKind::AmbiguousTarget,
            PlanGateError::NotFound(_) => ErrorKind::NotFound,
            PlanGateError::Aborted(_) => ErrorKind::Aborted,
            PlanGateError::Planner(_) => ErrorKind::Aborted,
            PlanGateError::ConstraintViolation(_)
            | PlanGateError::RusqliteError(_)
            | PlanGateError::IoError(_)
            | PlanGateError::Config(_) => ErrorKind::ConstraintViolation,
        }
    }
}

/// True if a rusqlite error is a CHECK / NOT NULL / UNIQUE rejection.
pub fn is_constraint_error(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(code, _)
            if code.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Lifts constraint failures into `ConstraintViolation`, leaving other
/// storage errors untouched.
pub fn classify_storage(err: rusqlite::Error) -> PlanGateError {
    if is_constraint_error(&err) {
        PlanGateError::ConstraintViolation(err.to_string())
    } else {
        PlanGateError::RusqliteError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_surface_as_constraint_violation() {
        let err = PlanGateError::IoError(io::Error::other("disk gone"));
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    }

    #[test]
    fn validator_kinds_are_specification_errors() {
        assert!(ErrorKind::InvalidOperation.is_specification_error());
        assert!(ErrorKind::InvalidSpecification.is_specification_error());
        assert!(!ErrorKind::ValidationError.is_specification_error());
    }

    #[test]
    fn kind_serializes_with_stable_names() {
        let json = serde_json::to_string(&ErrorKind::AmbiguousTarget).unwrap();
        assert_eq!(json, "\"AmbiguousTarget\"");
    }
}
