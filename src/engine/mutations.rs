use tokio::sync::oneshot;
use tracing::debug;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{check_no_conflict, validate_id, validate_stay};
use super::{Engine, EngineError, Missing, ValidationError, WalCommand};

impl Engine {
    // ── Catalog registration ─────────────────────────────────

    pub async fn register_unit(&self, id: UnitId, owner_id: String) -> Result<(), EngineError> {
        validate_id(&id)?;
        validate_id(&owner_id)?;
        let _gate = self.commit_gate.read().await;
        let _writes = self.catalog_writes.lock().await;
        if self.registry.unit_count() >= MAX_UNITS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many units"));
        }
        if self.registry.contains_unit(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        self.persist_catalog_event(&Event::UnitRegistered { id, owner_id })
            .await
    }

    /// Remove a unit from the registry. Refused while it still has reservations.
    pub async fn retire_unit(&self, id: &str) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        let _writes = self.catalog_writes.lock().await;
        if !self.registry.contains_unit(id) {
            return Err(EngineError::NotFound(Missing::Unit(id.to_string())));
        }
        // Holding the unit's write lock keeps admissions out until the unit is gone.
        let ub = self.unit_bookings(id);
        let guard = ub.write().await;
        if !guard.is_empty() {
            return Err(EngineError::HasReservations(id.to_string()));
        }
        self.persist_catalog_event(&Event::UnitRetired { id: id.to_string() })
            .await
    }

    pub async fn register_requester(&self, id: RequesterId) -> Result<(), EngineError> {
        validate_id(&id)?;
        let _gate = self.commit_gate.read().await;
        let _writes = self.catalog_writes.lock().await;
        if self.registry.requester_count() >= MAX_REQUESTERS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many requesters"));
        }
        if self.registry.contains_requester(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        self.persist_catalog_event(&Event::RequesterRegistered { id })
            .await
    }

    // ── Admission ────────────────────────────────────────────

    /// Validate and commit a reservation.
    ///
    /// Fails with `Validation` for a reversed range or an unknown unit or
    /// requester, and with `Conflict` when a committed reservation of the same
    /// unit shares a night with the request. State is unchanged on any error.
    pub async fn create_reservation(
        &self,
        request: ReservationRequest,
    ) -> Result<Reservation, EngineError> {
        let result = self.admit(request).await;
        let outcome = match &result {
            Ok(reservation) => {
                metrics::histogram!(observability::STAY_NIGHTS).record(reservation.range.nights() as f64);
                "success"
            }
            Err(e) => observability::error_label(e),
        };
        metrics::counter!(observability::ADMISSIONS_TOTAL, "outcome" => outcome).increment(1);
        result
    }

    async fn admit(&self, request: ReservationRequest) -> Result<Reservation, EngineError> {
        let range = validate_stay(request.start, request.end)?;
        validate_id(&request.unit_id)?;
        validate_id(&request.requester_id)?;

        if !self.catalog.unit_exists(&request.unit_id).await? {
            return Err(ValidationError::UnknownUnit(request.unit_id).into());
        }
        if !self.catalog.requester_exists(&request.requester_id).await? {
            return Err(ValidationError::UnknownRequester(request.requester_id).into());
        }

        let _gate = self.commit_gate.read().await;
        let ub = self.unit_bookings(&request.unit_id);
        let mut guard = ub.write().await;

        // A retire_unit that won the lock first has removed the unit by now.
        if !self.catalog.unit_exists(&request.unit_id).await? {
            return Err(ValidationError::UnknownUnit(request.unit_id).into());
        }
        if self.reservation_units.contains_key(&request.id) {
            return Err(EngineError::AlreadyExists(request.id.to_string()));
        }
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_UNIT {
            return Err(EngineError::LimitExceeded("too many reservations on unit"));
        }
        check_no_conflict(&guard, &range)?;

        let reservation = Reservation {
            id: request.id,
            unit_id: request.unit_id,
            requester_id: request.requester_id,
            range,
        };
        let event = Event::ReservationCommitted {
            reservation: reservation.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        debug!(
            "committed reservation {} on unit {} for {}",
            reservation.id, reservation.unit_id, reservation.range
        );
        Ok(reservation)
    }

    /// Cancel a committed reservation. Unknown ids are `NotFound`.
    pub async fn delete_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let _gate = self.commit_gate.read().await;
        let unit_id = self
            .get_unit_for_reservation(&id)
            .ok_or(EngineError::NotFound(Missing::Reservation(id)))?;
        let ub = self
            .get_unit_bookings(&unit_id)
            .ok_or(EngineError::NotFound(Missing::Reservation(id)))?;
        let mut guard = ub.write().await;
        // A concurrent delete may have won the lock.
        let existing = guard
            .get(id)
            .cloned()
            .ok_or(EngineError::NotFound(Missing::Reservation(id)))?;

        let event = Event::ReservationCancelled { id, unit_id };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(observability::CANCELLATIONS_TOTAL).increment(1);
        Ok(existing)
    }

    // ── Compaction ───────────────────────────────────────────

    /// Rewrite the WAL with the minimal event set that recreates current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // Exclusive: no mutation can log between the snapshot and the swap.
        let _gate = self.commit_gate.write().await;

        let mut events = Vec::new();
        for unit in self.registry.units() {
            events.push(Event::UnitRegistered {
                id: unit.id,
                owner_id: unit.owner_id,
            });
        }
        for id in self.registry.requester_ids() {
            events.push(Event::RequesterRegistered { id });
        }
        for ub in self.all_unit_bookings() {
            let guard = ub.read().await;
            for reservation in &guard.reservations {
                events.push(Event::ReservationCommitted {
                    reservation: reservation.clone(),
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
