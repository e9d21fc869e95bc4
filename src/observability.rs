use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: HTTP requests handled. Labels: route, status.
pub const HTTP_REQUESTS_TOTAL: &str = "slotbook_http_requests_total";

/// Histogram: HTTP request latency in seconds. Labels: route.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "slotbook_http_request_duration_seconds";

// ── Booking metrics ─────────────────────────────────────────────

pub const RESERVATIONS_CREATED_TOTAL: &str = "slotbook_reservations_created_total";

pub const RESERVATIONS_CANCELLED_TOTAL: &str = "slotbook_reservations_cancelled_total";

pub const RESERVATIONS_MOVED_TOTAL: &str = "slotbook_reservations_moved_total";

/// Counter: reservation attempts turned away because the slot was full.
pub const CAPACITY_REJECTED_TOTAL: &str = "slotbook_capacity_rejected_total";

/// Counter: seats released because the reservation write after them failed.
pub const SEAT_ROLLBACKS_TOTAL: &str = "slotbook_seat_rollbacks_total";

/// Counter: seats that could not be released after their reservation moved or
/// was cancelled. They stay taken until the next restart reconciles counts.
pub const STRANDED_SEATS_TOTAL: &str = "slotbook_stranded_seats_total";

pub const SLOTS_CREATED_TOTAL: &str = "slotbook_slots_created_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotbook_wal_flush_batch_size";

/// Counter: WAL compactions performed.
pub const WAL_COMPACTIONS_TOTAL: &str = "slotbook_wal_compactions_total";

/// Install the Prometheus exporter on `port`. No-op if `port` is `None`.
pub fn init(port: Option<u16>) -> anyhow::Result<()> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
