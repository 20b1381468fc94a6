use std::net::SocketAddr;

// ── Booking outcomes ────────────────────────────────────────────

/// Counter: reservations created. Labels: approval (`auto` | `pending`).
pub const RESERVATIONS_CREATED_TOTAL: &str = "walkslot_reservations_created_total";

/// Counter: reserve calls that lost the race for a slot.
pub const RESERVATION_CONFLICTS_TOTAL: &str = "walkslot_reservation_conflicts_total";

/// Counter: proposals rejected by the validator. Labels: reason.
pub const VALIDATION_REJECTIONS_TOTAL: &str = "walkslot_validation_rejections_total";

// ── Holiday calendar ────────────────────────────────────────────

/// Counter: external holiday fetches. Labels: outcome (`ok` | `error` | `timeout`).
pub const HOLIDAY_FETCHES_TOTAL: &str = "walkslot_holiday_fetches_total";

/// Counter: lookups answered from an expired cache entry after a failed refresh.
pub const HOLIDAY_STALE_FALLBACKS_TOTAL: &str = "walkslot_holiday_stale_fallbacks_total";

/// Counter: lookups that failed closed (no cache entry and no fetch).
pub const HOLIDAY_UNRESOLVED_TOTAL: &str = "walkslot_holiday_unresolved_total";

// ── Storage ─────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "walkslot_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "walkslot_wal_flush_batch_size";

/// Install the Prometheus exporter on `port`. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
