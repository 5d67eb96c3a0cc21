use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::ValidationError;

/// Opaque unit (apartment) identifier.
pub type UnitId = String;

/// Opaque requester identifier.
pub type RequesterId = String;

/// Closed date range `[start, end]`. `end` is the last occupied night.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Reversed ranges are rejected, never swapped.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn single_day(day: NaiveDate) -> Self {
        Self { start: day, end: day }
    }

    /// Number of occupied nights, counting both ends.
    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Closed-interval overlap. Touching ranges (`a.end == b.start`) share a
    /// night and therefore overlap.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && self.end >= other.start
    }

    pub fn contains_date(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// A committed booking of one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub unit_id: UnitId,
    pub requester_id: RequesterId,
    pub range: DateRange,
}

/// Input to admission. The range is validated by the engine, so callers may
/// pass raw dates straight from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    pub id: Ulid,
    pub unit_id: UnitId,
    pub requester_id: RequesterId,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Committed reservations of a single unit.
///
/// Kept sorted by `range.start`. Admission guarantees the ranges are pairwise
/// disjoint, so ends are sorted as well and both bounds of an overlap query
/// can be found by binary search.
#[derive(Debug, Clone)]
pub struct UnitBookings {
    pub unit_id: UnitId,
    pub reservations: Vec<Reservation>,
}

impl UnitBookings {
    pub fn new(unit_id: UnitId) -> Self {
        Self {
            unit_id,
            reservations: Vec::new(),
        }
    }

    /// Insert maintaining sort order by start date.
    pub fn insert(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.range.start <= reservation.range.start);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    pub fn get(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    /// Reservations sharing at least one night with `query`.
    pub fn overlapping(&self, query: &DateRange) -> impl Iterator<Item = &Reservation> {
        // Index >= hi starts after query.end; index < lo ended before query.start.
        let hi = self
            .reservations
            .partition_point(|r| r.range.start <= query.end);
        let lo = self.reservations[..hi].partition_point(|r| r.range.end < query.start);
        self.reservations[lo..hi]
            .iter()
            .filter(move |r| r.range.overlaps(query))
    }

    pub fn is_free(&self, query: &DateRange) -> bool {
        self.overlapping(query).next().is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }
}

/// WAL record format. Flat, one variant per state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    UnitRegistered { id: UnitId, owner_id: String },
    UnitRetired { id: UnitId },
    RequesterRegistered { id: RequesterId },
    ReservationCommitted { reservation: Reservation },
    ReservationCancelled { id: Ulid, unit_id: UnitId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitInfo {
    pub id: UnitId,
    pub owner_id: String,
}

#[cfg(test)]
pub(crate) fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}
