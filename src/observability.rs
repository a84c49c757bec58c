use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

// ── Booking lifecycle ───────────────────────────────────────────

/// Counter: bookings created.
pub const BOOKINGS_CREATED_TOTAL: &str = "courtbook_bookings_created_total";

/// Counter: bookings updated.
pub const BOOKINGS_UPDATED_TOTAL: &str = "courtbook_bookings_updated_total";

/// Counter: bookings deleted directly (cascades are counted separately).
pub const BOOKINGS_DELETED_TOTAL: &str = "courtbook_bookings_deleted_total";

/// Counter: creates/updates rejected because of an overlapping booking.
pub const CONFLICTS_REJECTED_TOTAL: &str = "courtbook_conflicts_rejected_total";

/// Counter: updates whose explicit cost replaced the computed price.
pub const COST_OVERRIDES_TOTAL: &str = "courtbook_cost_overrides_total";

/// Counter: bookings soft-deleted by a court or user cascade.
pub const CASCADE_DELETED_BOOKINGS_TOTAL: &str = "courtbook_cascade_deleted_bookings_total";

// ── Sessions ────────────────────────────────────────────────────

/// Counter: authentication and authorization failures. Labels: reason.
pub const AUTH_FAILURES_TOTAL: &str = "courtbook_auth_failures_total";

/// Counter: tokens issued. Labels: kind.
pub const TOKENS_ISSUED_TOTAL: &str = "courtbook_tokens_issued_total";

// ── Storage ─────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "courtbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "courtbook_wal_flush_batch_size";

/// Install the fmt subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init_metrics(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
