use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{RequesterId, UnitId};

/// Malformed admission or query input. Fixed by the caller, never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    InvalidRange { start: NaiveDate, end: NaiveDate },
    UnknownUnit(UnitId),
    UnknownRequester(RequesterId),
}

/// What a `NotFound` refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Unit(UnitId),
    Reservation(Ulid),
}

#[derive(Debug)]
pub enum EngineError {
    Validation(ValidationError),
    /// Overlaps the committed reservation with this id.
    Conflict(Ulid),
    NotFound(Missing),
    AlreadyExists(String),
    HasReservations(UnitId),
    LimitExceeded(&'static str),
    /// WAL or catalog failure. Nothing was applied.
    Storage(String),
}

impl From<ValidationError> for EngineError {
    fn from(e: ValidationError) -> Self {
        EngineError::Validation(e)
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidRange { start, end } => {
                write!(f, "invalid range: start {start} is after end {end}")
            }
            ValidationError::UnknownUnit(id) => write!(f, "unit {id} does not exist"),
            ValidationError::UnknownRequester(id) => write!(f, "requester {id} does not exist"),
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(e) => write!(f, "validation error: {e}"),
            EngineError::Conflict(id) => {
                write!(f, "unit is not available for the selected dates (conflicts with reservation {id})")
            }
            EngineError::NotFound(Missing::Unit(id)) => write!(f, "unit not found: {id}"),
            EngineError::NotFound(Missing::Reservation(id)) => {
                write!(f, "reservation not found: {id}")
            }
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::HasReservations(id) => {
                write!(f, "cannot retire unit {id}: it has reservations")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for ValidationError {}

impl std::error::Error for EngineError {}
