use std::net::SocketAddr;

use crate::engine::EngineError;
use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "vacancy_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "vacancy_query_duration_seconds";

/// Counter: admission attempts. Labels: outcome.
pub const ADMISSIONS_TOTAL: &str = "vacancy_admissions_total";

/// Counter: cancelled reservations.
pub const CANCELLATIONS_TOTAL: &str = "vacancy_cancellations_total";

/// Counter: single-unit availability checks.
pub const AVAILABILITY_CHECKS_TOTAL: &str = "vacancy_availability_checks_total";

/// Histogram: single-unit availability check latency in seconds.
pub const AVAILABILITY_CHECK_SECONDS: &str = "vacancy_availability_check_seconds";

/// Histogram: available-units scan latency in seconds.
pub const AVAILABLE_UNITS_SCAN_SECONDS: &str = "vacancy_available_units_scan_seconds";

/// Histogram: nights per admitted stay.
pub const STAY_NIGHTS: &str = "vacancy_stay_nights";

// ── USE metrics (resource utilization) ──────────────────────────

pub const CONNECTIONS_ACTIVE: &str = "vacancy_connections_active";
pub const CONNECTIONS_TOTAL: &str = "vacancy_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "vacancy_connections_rejected_total";

/// Gauge: number of loaded tenant engines.
pub const TENANTS_ACTIVE: &str = "vacancy_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "vacancy_wal_flush_duration_seconds";

/// Histogram: events per group-commit flush.
pub const WAL_FLUSH_BATCH_SIZE: &str = "vacancy_wal_flush_batch_size";

/// Counter: completed WAL compactions. Labels: status.
pub const WAL_COMPACTIONS_TOTAL: &str = "vacancy_wal_compactions_total";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertUnit { .. } => "insert_unit",
        Command::DeleteUnit { .. } => "delete_unit",
        Command::SelectUnits => "select_units",
        Command::InsertRequester { .. } => "insert_requester",
        Command::InsertReservation { .. } => "insert_reservation",
        Command::DeleteReservation { .. } => "delete_reservation",
        Command::SelectReservations { .. } => "select_reservations",
        Command::SelectAvailability { .. } => "select_availability",
        Command::SelectAvailableUnits { .. } => "select_available_units",
        Command::SelectConflicts { .. } => "select_conflicts",
    }
}

/// Short, bounded label for an engine failure.
pub fn error_label(err: &EngineError) -> &'static str {
    match err {
        EngineError::Validation(_) => "invalid",
        EngineError::Conflict(_) => "conflict",
        EngineError::NotFound(_) => "not_found",
        EngineError::AlreadyExists(_) => "already_exists",
        EngineError::HasReservations(_) => "has_reservations",
        EngineError::LimitExceeded(_) => "limit_exceeded",
        EngineError::Storage(_) => "storage",
    }
}
