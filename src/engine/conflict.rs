use chrono::{Datelike, NaiveDate};

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Build a stay range and apply the admission limits.
pub(crate) fn validate_stay(start: NaiveDate, end: NaiveDate) -> Result<DateRange, EngineError> {
    let range = DateRange::new(start, end)?;
    check_year_bounds(&range)?;
    if range.nights() > MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(range)
}

/// Build a query window. Width is unbounded; lookups are a binary search.
pub(crate) fn validate_window(start: NaiveDate, end: NaiveDate) -> Result<DateRange, EngineError> {
    let range = DateRange::new(start, end)?;
    check_year_bounds(&range)?;
    Ok(range)
}

fn check_year_bounds(range: &DateRange) -> Result<(), EngineError> {
    if range.start.year() < MIN_VALID_YEAR || range.end.year() > MAX_VALID_YEAR {
        return Err(EngineError::LimitExceeded("date out of range"));
    }
    Ok(())
}

pub(crate) fn validate_id(id: &str) -> Result<(), EngineError> {
    if id.is_empty() {
        return Err(EngineError::LimitExceeded("id must not be empty"));
    }
    if id.len() > MAX_ID_LEN {
        return Err(EngineError::LimitExceeded("id too long"));
    }
    Ok(())
}

/// First committed reservation of the unit overlapping `range`, as a conflict.
pub(crate) fn check_no_conflict(ub: &UnitBookings, range: &DateRange) -> Result<(), EngineError> {
    match ub.overlapping(range).next() {
        Some(existing) => Err(EngineError::Conflict(existing.id)),
        None => Ok(()),
    }
}
