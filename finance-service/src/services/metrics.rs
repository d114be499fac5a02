//! Metrics module for finance-service.
//! Prometheus metrics for sync runs, provider calls, and database queries.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "finance_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Sync run counter by outcome
pub static SYNC_RUNS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Transactions merged during sync, by kind (upserted/removed)
pub static SYNC_TRANSACTIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Sync pages consumed from the provider
pub static SYNC_PAGES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Provider API request counter
pub static PROVIDER_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    SYNC_RUNS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("finance_sync_runs_total", "Total sync runs by outcome"),
            &["outcome"]
        )
        .expect("Failed to register SYNC_RUNS_TOTAL")
    });

    SYNC_TRANSACTIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "finance_sync_transactions_total",
                "Transactions merged during sync by kind"
            ),
            &["kind"]
        )
        .expect("Failed to register SYNC_TRANSACTIONS_TOTAL")
    });

    SYNC_PAGES_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "finance_sync_pages_total",
                "Sync pages consumed from the provider"
            ),
            &["outcome"]
        )
        .expect("Failed to register SYNC_PAGES_TOTAL")
    });

    PROVIDER_REQUESTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "finance_provider_requests_total",
                "Provider API requests by operation and outcome"
            ),
            &["operation", "outcome"]
        )
        .expect("Failed to register PROVIDER_REQUESTS_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Failed to convert metrics to string")
}

/// Record a completed or failed sync run.
pub fn record_sync_run(outcome: &str) {
    if let Some(counter) = SYNC_RUNS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Record merged transactions.
pub fn record_sync_transactions(kind: &str, count: usize) {
    if let Some(counter) = SYNC_TRANSACTIONS_TOTAL.get() {
        counter.with_label_values(&[kind]).inc_by(count as u64);
    }
}

/// Record a consumed sync page.
pub fn record_sync_page(outcome: &str) {
    if let Some(counter) = SYNC_PAGES_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Record a provider API request.
pub fn record_provider_request(operation: &str, outcome: &str) {
    if let Some(counter) = PROVIDER_REQUESTS_TOTAL.get() {
        counter.with_label_values(&[operation, outcome]).inc();
    }
}
