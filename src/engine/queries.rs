use std::collections::HashSet;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;
use crate::observability;

use super::conflict::validate_window;
use super::{Engine, EngineError, Missing};

impl Engine {
    /// True iff no committed reservation of `unit_id` shares a night with
    /// `[start, end]`.
    pub async fn is_available(
        &self,
        unit_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<bool, EngineError> {
        metrics::counter!(observability::AVAILABILITY_CHECKS_TOTAL).increment(1);
        let started = std::time::Instant::now();

        let window = validate_window(start, end)?;
        self.require_unit(unit_id).await?;
        let free = match self.get_unit_bookings(unit_id) {
            Some(ub) => {
                let guard = ub.read().await;
                guard.is_free(&window)
            }
            None => true,
        };

        metrics::histogram!(observability::AVAILABILITY_CHECK_SECONDS)
            .record(started.elapsed().as_secs_f64());
        Ok(free)
    }

    /// Committed reservations of `unit_id` that overlap `[start, end]`, in
    /// start order.
    pub async fn reservations_overlapping(
        &self,
        unit_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Reservation>, EngineError> {
        let window = validate_window(start, end)?;
        self.require_unit(unit_id).await?;
        let Some(ub) = self.get_unit_bookings(unit_id) else {
            return Ok(Vec::new());
        };
        let guard = ub.read().await;
        Ok(guard.overlapping(&window).cloned().collect())
    }

    /// Units of the catalog with no reservation overlapping `[start, end]`,
    /// sorted by id.
    pub async fn list_available_units(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<UnitId>, EngineError> {
        let started = std::time::Instant::now();
        let window = validate_window(start, end)?;
        let all_units = self.catalog.unit_ids().await?;

        let mut booked: HashSet<UnitId> = HashSet::new();
        for ub in self.all_unit_bookings() {
            let guard = ub.read().await;
            if !guard.is_free(&window) {
                booked.insert(guard.unit_id.clone());
            }
        }

        let mut free: Vec<UnitId> = all_units
            .into_iter()
            .filter(|id| !booked.contains(id))
            .collect();
        free.sort();
        free.dedup();

        metrics::histogram!(observability::AVAILABLE_UNITS_SCAN_SECONDS)
            .record(started.elapsed().as_secs_f64());
        Ok(free)
    }

    pub async fn get_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let not_found = || EngineError::NotFound(Missing::Reservation(id));
        let unit_id = self.get_unit_for_reservation(&id).ok_or_else(not_found)?;
        let ub = self.get_unit_bookings(&unit_id).ok_or_else(not_found)?;
        let guard = ub.read().await;
        guard.get(id).cloned().ok_or_else(not_found)
    }

    /// Every committed reservation, ordered by unit id then start date.
    pub async fn list_reservations(&self) -> Vec<Reservation> {
        let mut all = Vec::new();
        for ub in self.all_unit_bookings() {
            let guard = ub.read().await;
            all.extend(guard.reservations.iter().cloned());
        }
        all.sort_by(|a, b| {
            a.unit_id
                .cmp(&b.unit_id)
                .then(a.range.start.cmp(&b.range.start))
        });
        all
    }

    /// Reservations of one unit in start order. Empty for units never booked.
    pub async fn reservations_for_unit(&self, unit_id: &str) -> Vec<Reservation> {
        match self.get_unit_bookings(unit_id) {
            Some(ub) => {
                let guard = ub.read().await;
                guard.reservations.clone()
            }
            None => Vec::new(),
        }
    }

    pub async fn reservations_for_unit_and_requester(
        &self,
        unit_id: &str,
        requester_id: &str,
    ) -> Vec<Reservation> {
        let mut reservations = self.reservations_for_unit(unit_id).await;
        reservations.retain(|r| r.requester_id == requester_id);
        reservations
    }

    /// Units of the built-in registry, sorted by id.
    pub fn list_units(&self) -> Vec<UnitInfo> {
        self.registry.units()
    }

    async fn require_unit(&self, unit_id: &str) -> Result<(), EngineError> {
        if self.catalog.unit_exists(unit_id).await? {
            Ok(())
        } else {
            Err(EngineError::NotFound(Missing::Unit(unit_id.to_string())))
        }
    }
}
