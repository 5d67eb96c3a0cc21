use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use ulid::Ulid;

use super::*;
use crate::limits::*;
use crate::model::day;

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("vacancy_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

/// Engine with units A and B and requester "guest".
async fn seeded_engine(name: &str) -> Engine {
    let engine = Engine::new(test_wal_path(name)).unwrap();
    engine.register_unit("A".into(), "owner".into()).await.unwrap();
    engine.register_unit("B".into(), "owner".into()).await.unwrap();
    engine.register_requester("guest".into()).await.unwrap();
    engine
}

fn request(unit: &str, start: NaiveDate, end: NaiveDate) -> ReservationRequest {
    ReservationRequest {
        id: Ulid::new(),
        unit_id: unit.into(),
        requester_id: "guest".into(),
        start,
        end,
    }
}

fn jan(d: u32) -> NaiveDate {
    day(2025, 1, d)
}

// ── Scenarios ────────────────────────────────────────────

#[tokio::test]
async fn all_units_free_without_reservations() {
    let engine = seeded_engine("all_free.wal").await;
    let free = engine.list_available_units(jan(1), jan(5)).await.unwrap();
    assert_eq!(free, vec!["A".to_string(), "B".to_string()]);
}

#[tokio::test]
async fn single_day_inside_booking_is_unavailable() {
    let engine = seeded_engine("single_day.wal").await;
    engine.create_reservation(request("A", jan(2), jan(4))).await.unwrap();

    assert!(!engine.is_available("A", jan(3), jan(3)).await.unwrap());
    assert!(engine.is_available("A", jan(5), jan(6)).await.unwrap());
    assert!(engine.is_available("B", jan(3), jan(3)).await.unwrap());
}

#[tokio::test]
async fn overlapping_admission_conflicts() {
    let engine = seeded_engine("conflict.wal").await;
    let existing = engine.create_reservation(request("A", jan(2), jan(4))).await.unwrap();

    let result = engine.create_reservation(request("A", jan(3), jan(3))).await;
    match result {
        Err(EngineError::Conflict(id)) => assert_eq!(id, existing.id),
        other => panic!("expected Conflict, got {other:?}"),
    }
    assert_eq!(engine.reservations_for_unit("A").await.len(), 1);
}

#[tokio::test]
async fn delete_frees_the_window() {
    let engine = seeded_engine("delete_frees.wal").await;
    let r = engine.create_reservation(request("A", jan(2), jan(4))).await.unwrap();
    assert!(!engine.is_available("A", jan(2), jan(4)).await.unwrap());

    let removed = engine.delete_reservation(r.id).await.unwrap();
    assert_eq!(removed, r);
    assert!(engine.is_available("A", jan(2), jan(4)).await.unwrap());
    assert!(engine.get_reservation(r.id).await.is_err());
}

// ── Boundaries ───────────────────────────────────────────

#[tokio::test]
async fn shared_boundary_night_conflicts() {
    let engine = seeded_engine("boundary.wal").await;
    engine.create_reservation(request("A", jan(2), jan(4))).await.unwrap();

    // Closed ranges: checking in on the last booked night collides.
    let result = engine.create_reservation(request("A", jan(4), jan(6))).await;
    assert!(matches!(result, Err(EngineError::Conflict(_))));
    let result = engine.create_reservation(request("A", jan(1), jan(2))).await;
    assert!(matches!(result, Err(EngineError::Conflict(_))));
}

#[tokio::test]
async fn back_to_back_stays_admitted() {
    let engine = seeded_engine("back_to_back.wal").await;
    engine.create_reservation(request("A", jan(2), jan(4))).await.unwrap();
    engine.create_reservation(request("A", jan(5), jan(7))).await.unwrap();
    engine.create_reservation(request("A", jan(1), jan(1))).await.unwrap();

    let starts: Vec<_> = engine
        .reservations_for_unit("A")
        .await
        .into_iter()
        .map(|r| r.range.start)
        .collect();
    assert_eq!(starts, vec![jan(1), jan(2), jan(5)]);
}

#[tokio::test]
async fn enclosing_request_conflicts() {
    let engine = seeded_engine("enclosing.wal").await;
    engine.create_reservation(request("A", jan(10), jan(11))).await.unwrap();
    let result = engine.create_reservation(request("A", jan(1), jan(31))).await;
    assert!(matches!(result, Err(EngineError::Conflict(_))));
}

// ── Validation ───────────────────────────────────────────

#[tokio::test]
async fn reversed_range_is_validation_error() {
    let engine = seeded_engine("reversed.wal").await;
    let result = engine.create_reservation(request("A", jan(5), jan(1))).await;
    assert!(matches!(
        result,
        Err(EngineError::Validation(ValidationError::InvalidRange { .. }))
    ));

    let result = engine.is_available("A", jan(5), jan(1)).await;
    assert!(matches!(
        result,
        Err(EngineError::Validation(ValidationError::InvalidRange { .. }))
    ));
}

#[tokio::test]
async fn reversed_range_reported_before_unknown_unit() {
    let engine = seeded_engine("reversed_first.wal").await;
    let result = engine.create_reservation(request("nope", jan(5), jan(1))).await;
    assert!(matches!(
        result,
        Err(EngineError::Validation(ValidationError::InvalidRange { .. }))
    ));
}

#[tokio::test]
async fn unknown_unit_rejected() {
    let engine = seeded_engine("unknown_unit.wal").await;
    let result = engine.create_reservation(request("Z", jan(1), jan(2))).await;
    match result {
        Err(EngineError::Validation(ValidationError::UnknownUnit(id))) => assert_eq!(id, "Z"),
        other => panic!("expected UnknownUnit, got {other:?}"),
    }
    // Rejected admissions do not leave bookings behind.
    assert!(engine.get_unit_bookings("Z").is_none());
}

#[tokio::test]
async fn unknown_requester_rejected() {
    let engine = seeded_engine("unknown_requester.wal").await;
    let mut req = request("A", jan(1), jan(2));
    req.requester_id = "ghost".into();
    let result = engine.create_reservation(req).await;
    assert!(matches!(
        result,
        Err(EngineError::Validation(ValidationError::UnknownRequester(_)))
    ));
}

#[tokio::test]
async fn availability_of_unknown_unit_is_not_found() {
    let engine = seeded_engine("avail_unknown.wal").await;
    let result = engine.is_available("Z", jan(1), jan(2)).await;
    assert!(matches!(result, Err(EngineError::NotFound(Missing::Unit(_)))));
}

#[tokio::test]
async fn duplicate_reservation_id_rejected() {
    let engine = seeded_engine("dup_id.wal").await;
    let first = request("A", jan(1), jan(2));
    let mut second = request("B", jan(1), jan(2));
    second.id = first.id;
    engine.create_reservation(first).await.unwrap();
    let result = engine.create_reservation(second).await;
    assert!(matches!(result, Err(EngineError::AlreadyExists(_))));
    assert!(engine.is_available("B", jan(1), jan(2)).await.unwrap());
}

#[tokio::test]
async fn delete_unknown_reservation_is_not_found() {
    let engine = seeded_engine("delete_unknown.wal").await;
    let result = engine.delete_reservation(Ulid::new()).await;
    assert!(matches!(result, Err(EngineError::NotFound(Missing::Reservation(_)))));
}

#[tokio::test]
async fn delete_twice_is_not_found() {
    let engine = seeded_engine("delete_twice.wal").await;
    let r = engine.create_reservation(request("A", jan(1), jan(2))).await.unwrap();
    engine.delete_reservation(r.id).await.unwrap();
    let result = engine.delete_reservation(r.id).await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

// ── Queries ──────────────────────────────────────────────

#[tokio::test]
async fn available_units_exclude_booked() {
    let engine = seeded_engine("avail_units.wal").await;
    engine.register_unit("C".into(), "owner".into()).await.unwrap();
    engine.create_reservation(request("B", jan(2), jan(4))).await.unwrap();
    engine.create_reservation(request("C", jan(10), jan(12))).await.unwrap();

    let free = engine.list_available_units(jan(1), jan(5)).await.unwrap();
    assert_eq!(free, vec!["A".to_string(), "C".to_string()]);

    let free = engine.list_available_units(jan(4), jan(10)).await.unwrap();
    assert_eq!(free, vec!["A".to_string()]);

    let free = engine.list_available_units(jan(20), jan(25)).await.unwrap();
    assert_eq!(free.len(), 3);
}

#[tokio::test]
async fn overlapping_reservations_listed_in_start_order() {
    let engine = seeded_engine("overlapping_list.wal").await;
    let a = engine.create_reservation(request("A", jan(1), jan(3))).await.unwrap();
    let b = engine.create_reservation(request("A", jan(6), jan(8))).await.unwrap();
    engine.create_reservation(request("A", jan(20), jan(22))).await.unwrap();

    let hits = engine.reservations_overlapping("A", jan(3), jan(6)).await.unwrap();
    assert_eq!(hits, vec![a, b]);
    assert!(engine.reservations_overlapping("A", jan(10), jan(15)).await.unwrap().is_empty());
}

#[tokio::test]
async fn reservations_filtered_by_requester() {
    let engine = seeded_engine("by_requester.wal").await;
    engine.register_requester("other".into()).await.unwrap();
    let mine = engine.create_reservation(request("A", jan(1), jan(2))).await.unwrap();
    let mut theirs = request("A", jan(5), jan(6));
    theirs.requester_id = "other".into();
    engine.create_reservation(theirs).await.unwrap();

    let found = engine.reservations_for_unit_and_requester("A", "guest").await;
    assert_eq!(found, vec![mine.clone()]);
    assert_eq!(engine.get_reservation(mine.id).await.unwrap(), mine);
    assert_eq!(engine.list_reservations().await.len(), 2);
    assert!(engine.reservations_for_unit("B").await.is_empty());
}

#[tokio::test]
async fn list_reservations_sorted_by_unit_then_start() {
    let engine = seeded_engine("list_sorted.wal").await;
    engine.create_reservation(request("B", jan(1), jan(2))).await.unwrap();
    engine.create_reservation(request("A", jan(9), jan(9))).await.unwrap();
    engine.create_reservation(request("A", jan(3), jan(4))).await.unwrap();

    let keys: Vec<_> = engine
        .list_reservations()
        .await
        .into_iter()
        .map(|r| (r.unit_id, r.range.start))
        .collect();
    assert_eq!(
        keys,
        vec![("A".to_string(), jan(3)), ("A".to_string(), jan(9)), ("B".to_string(), jan(1))]
    );
}

// ── Catalog ──────────────────────────────────────────────

#[tokio::test]
async fn duplicate_unit_and_requester_rejected() {
    let engine = seeded_engine("dup_catalog.wal").await;
    let result = engine.register_unit("A".into(), "owner".into()).await;
    assert!(matches!(result, Err(EngineError::AlreadyExists(_))));
    let result = engine.register_requester("guest".into()).await;
    assert!(matches!(result, Err(EngineError::AlreadyExists(_))));
}

#[tokio::test]
async fn retire_unit_requires_no_reservations() {
    let engine = seeded_engine("retire.wal").await;
    let r = engine.create_reservation(request("A", jan(1), jan(2))).await.unwrap();

    let result = engine.retire_unit("A").await;
    assert!(matches!(result, Err(EngineError::HasReservations(_))));

    engine.delete_reservation(r.id).await.unwrap();
    engine.retire_unit("A").await.unwrap();

    let ids: Vec<_> = engine.list_units().into_iter().map(|u| u.id).collect();
    assert_eq!(ids, vec!["B".to_string()]);
    let result = engine.create_reservation(request("A", jan(1), jan(2))).await;
    assert!(matches!(
        result,
        Err(EngineError::Validation(ValidationError::UnknownUnit(_)))
    ));
    let free = engine.list_available_units(jan(1), jan(2)).await.unwrap();
    assert_eq!(free, vec!["B".to_string()]);
}

#[tokio::test]
async fn retire_unknown_unit_is_not_found() {
    let engine = seeded_engine("retire_unknown.wal").await;
    let result = engine.retire_unit("Z").await;
    assert!(matches!(result, Err(EngineError::NotFound(Missing::Unit(_)))));
}

struct FixedCatalog {
    units: Vec<UnitId>,
}

#[async_trait]
impl Catalog for FixedCatalog {
    async fn unit_exists(&self, unit_id: &str) -> Result<bool, EngineError> {
        Ok(self.units.iter().any(|u| u == unit_id))
    }

    async fn requester_exists(&self, _requester_id: &str) -> Result<bool, EngineError> {
        Ok(true)
    }

    async fn unit_ids(&self) -> Result<Vec<UnitId>, EngineError> {
        Ok(self.units.clone())
    }
}

struct UnreachableCatalog;

#[async_trait]
impl Catalog for UnreachableCatalog {
    async fn unit_exists(&self, _unit_id: &str) -> Result<bool, EngineError> {
        Err(EngineError::Storage("catalog unreachable".into()))
    }

    async fn requester_exists(&self, _requester_id: &str) -> Result<bool, EngineError> {
        Err(EngineError::Storage("catalog unreachable".into()))
    }

    async fn unit_ids(&self) -> Result<Vec<UnitId>, EngineError> {
        Err(EngineError::Storage("catalog unreachable".into()))
    }
}

#[tokio::test]
async fn external_catalog_is_consulted() {
    let catalog = Arc::new(FixedCatalog {
        units: vec!["Y".into(), "X".into()],
    });
    let engine = Engine::with_catalog(test_wal_path("external_catalog.wal"), catalog).unwrap();

    engine.create_reservation(request("X", jan(1), jan(3))).await.unwrap();
    let free = engine.list_available_units(jan(2), jan(2)).await.unwrap();
    assert_eq!(free, vec!["Y".to_string()]);
    let result = engine.create_reservation(request("A", jan(1), jan(3))).await;
    assert!(matches!(
        result,
        Err(EngineError::Validation(ValidationError::UnknownUnit(_)))
    ));
}

#[tokio::test]
async fn catalog_failure_surfaces_as_storage_error() {
    let engine =
        Engine::with_catalog(test_wal_path("catalog_failure.wal"), Arc::new(UnreachableCatalog))
            .unwrap();
    let result = engine.create_reservation(request("A", jan(1), jan(3))).await;
    assert!(matches!(result, Err(EngineError::Storage(_))));
    assert!(engine.list_reservations().await.is_empty());
    let result = engine.list_available_units(jan(1), jan(3)).await;
    assert!(matches!(result, Err(EngineError::Storage(_))));
}

// ── Concurrency ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_overlapping_admissions_admit_exactly_one() {
    let engine = Arc::new(seeded_engine("concurrent_same_unit.wal").await);

    let n = 32;
    let mut handles = Vec::new();
    for i in 0..n {
        let eng = engine.clone();
        // Every window contains Jan 15, so all pairs overlap.
        let start = jan(15 - (i % 10));
        let end = jan(15 + (i % 7));
        handles.push(tokio::spawn(async move {
            eng.create_reservation(request("A", start, end)).await
        }));
    }

    let mut successes = 0;
    let mut conflicts = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => successes += 1,
            Err(EngineError::Conflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(conflicts, n - 1);
    assert_eq!(engine.reservations_for_unit("A").await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_admissions_on_different_units_all_succeed() {
    let engine = Arc::new(Engine::new(test_wal_path("concurrent_units.wal")).unwrap());
    engine.register_requester("guest".into()).await.unwrap();
    let n = 24;
    for i in 0..n {
        engine.register_unit(format!("U{i:02}"), "owner".into()).await.unwrap();
    }

    let mut handles = Vec::new();
    for i in 0..n {
        let eng = engine.clone();
        handles.push(tokio::spawn(async move {
            eng.create_reservation(request(&format!("U{i:02}"), jan(1), jan(10))).await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }
    assert!(engine.list_available_units(jan(5), jan(5)).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_admissions_and_cancellations_keep_units_disjoint() {
    let engine = Arc::new(seeded_engine("concurrent_churn.wal").await);

    let mut handles = Vec::new();
    for task in 0..8u64 {
        let eng = engine.clone();
        handles.push(tokio::spawn(async move {
            let mut seed = task * 7919 + 1;
            for _ in 0..40 {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let unit = if seed % 2 == 0 { "A" } else { "B" };
                let start = day(2025, 3, 1) + chrono::Days::new((seed >> 8) % 25);
                let end = start + chrono::Days::new((seed >> 16) % 4);
                if let Ok(r) = eng.create_reservation(request(unit, start, end)).await
                    && (seed >> 24) % 3 == 0
                {
                    eng.delete_reservation(r.id).await.unwrap();
                }
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    for unit in ["A", "B"] {
        assert_pairwise_disjoint(&engine.reservations_for_unit(unit).await);
    }
}

fn assert_pairwise_disjoint(reservations: &[Reservation]) {
    for (i, a) in reservations.iter().enumerate() {
        for b in &reservations[i + 1..] {
            assert!(
                !a.range.overlaps(&b.range),
                "{} overlaps {} on unit {}",
                a.range,
                b.range,
                a.unit_id
            );
        }
    }
}

#[tokio::test]
async fn random_admissions_and_deletions_preserve_invariant() {
    let engine = seeded_engine("invariant_walk.wal").await;
    let mut live: Vec<Ulid> = Vec::new();
    let mut seed: u64 = 42;

    for _ in 0..400 {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        if seed % 5 == 0 && !live.is_empty() {
            let idx = ((seed >> 20) as usize) % live.len();
            engine.delete_reservation(live.swap_remove(idx)).await.unwrap();
        } else {
            let start = day(2025, 6, 1) + chrono::Days::new((seed >> 8) % 60);
            let end = start + chrono::Days::new((seed >> 32) % 6);
            match engine.create_reservation(request("A", start, end)).await {
                Ok(r) => live.push(r.id),
                Err(EngineError::Conflict(_)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_pairwise_disjoint(&engine.reservations_for_unit("A").await);
    }
    assert_eq!(engine.reservations_for_unit("A").await.len(), live.len());
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn replay_restores_catalog_and_reservations() {
    let path = test_wal_path("replay.wal");
    let (kept, cancelled) = {
        let engine = Engine::new(path.clone()).unwrap();
        engine.register_unit("A".into(), "owner".into()).await.unwrap();
        engine.register_unit("B".into(), "owner".into()).await.unwrap();
        engine.register_requester("guest".into()).await.unwrap();
        engine.retire_unit("B").await.unwrap();
        let kept = engine.create_reservation(request("A", jan(2), jan(4))).await.unwrap();
        let cancelled = engine.create_reservation(request("A", jan(8), jan(9))).await.unwrap();
        engine.delete_reservation(cancelled.id).await.unwrap();
        (kept, cancelled)
    };

    let engine = Engine::new(path).unwrap();
    let units: Vec<_> = engine.list_units().into_iter().map(|u| u.id).collect();
    assert_eq!(units, vec!["A".to_string()]);
    assert_eq!(engine.list_reservations().await, vec![kept.clone()]);
    assert!(engine.get_reservation(cancelled.id).await.is_err());
    assert!(!engine.is_available("A", jan(3), jan(3)).await.unwrap());

    // The restored state still enforces conflicts.
    let result = engine.create_reservation(request("A", jan(4), jan(5))).await;
    assert!(matches!(result, Err(EngineError::Conflict(id)) if id == kept.id));
}

#[tokio::test]
async fn compaction_preserves_state_and_resets_counter() {
    let path = test_wal_path("compaction.wal");
    let kept = {
        let engine = seeded_engine("compaction.wal").await;
        for d in 1..=10 {
            let r = engine.create_reservation(request("B", jan(d), jan(d))).await.unwrap();
            engine.delete_reservation(r.id).await.unwrap();
        }
        let kept = engine.create_reservation(request("A", jan(2), jan(4))).await.unwrap();
        assert!(engine.wal_appends_since_compact().await > 0);

        let before = std::fs::metadata(&path).unwrap().len();
        engine.compact_wal().await.unwrap();
        let after = std::fs::metadata(&path).unwrap().len();
        assert!(after < before);
        assert_eq!(engine.wal_appends_since_compact().await, 0);
        kept
    };

    let engine = Engine::new(path).unwrap();
    assert_eq!(engine.list_reservations().await, vec![kept]);
    assert_eq!(engine.list_units().len(), 2);
    engine.create_reservation(request("B", jan(2), jan(2))).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn group_commit_replays_every_concurrent_admission() {
    let path = test_wal_path("group_commit.wal");
    let engine = Arc::new(Engine::new(path.clone()).unwrap());
    engine.register_requester("guest".into()).await.unwrap();
    let n = 20;
    for i in 0..n {
        engine.register_unit(format!("R{i}"), "owner".into()).await.unwrap();
    }

    let mut handles = Vec::new();
    for i in 0..n {
        let eng = engine.clone();
        handles.push(tokio::spawn(async move {
            eng.create_reservation(request(&format!("R{i}"), jan(1), jan(2))).await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    let engine2 = Engine::new(path).unwrap();
    assert_eq!(engine2.list_reservations().await.len(), n);
}

#[tokio::test]
async fn failed_batch_leaves_no_trace_in_the_log() {
    let path = test_wal_path("failed_batch.wal");
    let kept = {
        let engine = seeded_engine("failed_batch.wal").await;
        let kept = engine.create_reservation(request("A", jan(2), jan(4))).await.unwrap();
        let synced = std::fs::metadata(&path).unwrap().len();

        // Simulate a batch whose bytes hit the file before the sync failed.
        let mut wal = crate::wal::Wal::open(&path).unwrap();
        let orphan = Reservation {
            id: Ulid::new(),
            unit_id: "B".into(),
            requester_id: "guest".into(),
            range: DateRange::new(jan(10), jan(12)).unwrap(),
        };
        wal.append_buffered(&Event::ReservationCommitted { reservation: orphan }).unwrap();
        wal.discard_unsynced().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), synced);
        kept
    };

    let engine = Engine::new(path).unwrap();
    assert_eq!(engine.list_reservations().await, vec![kept]);
    assert!(engine.is_available("B", jan(10), jan(12)).await.unwrap());
}

#[tokio::test]
async fn replay_skips_conflicting_commits() {
    let path = test_wal_path("replay_conflict.wal");
    let stay = |id: Ulid, start: u32, end: u32| Event::ReservationCommitted {
        reservation: Reservation {
            id,
            unit_id: "A".into(),
            requester_id: "guest".into(),
            range: DateRange::new(jan(start), jan(end)).unwrap(),
        },
    };
    let (first, overlapping, later) = (Ulid::new(), Ulid::new(), Ulid::new());
    {
        let mut wal = crate::wal::Wal::open(&path).unwrap();
        wal.append(&Event::UnitRegistered { id: "A".into(), owner_id: "owner".into() }).unwrap();
        wal.append(&Event::RequesterRegistered { id: "guest".into() }).unwrap();
        wal.append(&stay(first, 2, 5)).unwrap();
        wal.append(&stay(overlapping, 4, 6)).unwrap();
        wal.append(&stay(first, 8, 9)).unwrap();
        wal.append(&stay(later, 7, 7)).unwrap();
    }

    let engine = Engine::new(path).unwrap();
    let ids: Vec<Ulid> = engine.list_reservations().await.into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![first, later]);
    assert!(engine.get_reservation(overlapping).await.is_err());
    assert!(engine.is_available("A", jan(6), jan(6)).await.unwrap());
}

// ── Limits ───────────────────────────────────────────────

#[tokio::test]
async fn overlong_stay_rejected() {
    let engine = seeded_engine("long_stay.wal").await;
    let end = jan(1) + chrono::Days::new(MAX_STAY_NIGHTS as u64);
    let result = engine.create_reservation(request("A", jan(1), end)).await;
    assert!(matches!(result, Err(EngineError::LimitExceeded("stay too long"))));

    let end = jan(1) + chrono::Days::new(MAX_STAY_NIGHTS as u64 - 1);
    engine.create_reservation(request("A", jan(1), end)).await.unwrap();
}

#[tokio::test]
async fn decades_wide_query_window_accepted() {
    let engine = seeded_engine("wide_window.wal").await;
    engine.create_reservation(request("A", jan(2), jan(4))).await.unwrap();

    let (start, end) = (day(1970, 1, 1), day(2099, 12, 31));
    assert_eq!(engine.list_available_units(start, end).await.unwrap(), vec!["B".to_string()]);
    assert!(!engine.is_available("A", start, end).await.unwrap());
    assert!(engine.is_available("B", start, end).await.unwrap());

    let result = engine.list_available_units(start, day(10000, 1, 1)).await;
    assert!(matches!(result, Err(EngineError::LimitExceeded("date out of range"))));
}

#[tokio::test]
async fn bad_ids_rejected() {
    let engine = seeded_engine("bad_ids.wal").await;
    let result = engine.register_unit(String::new(), "owner".into()).await;
    assert!(matches!(result, Err(EngineError::LimitExceeded(_))));
    let result = engine
        .register_unit("x".repeat(MAX_ID_LEN + 1), "owner".into())
        .await;
    assert!(matches!(result, Err(EngineError::LimitExceeded("id too long"))));
}

#[tokio::test]
async fn dates_before_epoch_year_rejected() {
    let engine = seeded_engine("old_dates.wal").await;
    let result = engine
        .create_reservation(request("A", day(1969, 12, 30), day(1970, 1, 2)))
        .await;
    assert!(matches!(result, Err(EngineError::LimitExceeded("date out of range"))));
}
