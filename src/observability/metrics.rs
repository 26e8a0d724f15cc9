use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// ---------------------------------------------------------------------------
// Metrics catalog
// ---------------------------------------------------------------------------

/// Register all metric descriptors at startup.
///
/// Call once after the recorder is installed; descriptors only add help text
/// to the Prometheus exposition.
pub fn describe_all_metrics() {
    // -- Library --
    describe_counter!(
        "subvault_uploads_total",
        "Subtitle versions stored, by upload kind"
    );
    describe_histogram!("subvault_upload_size_bytes", "Size of stored subtitle files");
    describe_counter!(
        "subvault_archive_entries_skipped_total",
        "Archive entries skipped because no episode could be derived"
    );
    describe_histogram!(
        "subvault_allocated_version",
        "Version numbers handed out by the allocator"
    );
    describe_counter!(
        "subvault_allocation_conflicts_total",
        "Conditional creates that lost a race and were retried"
    );
    describe_counter!(
        "subvault_objects_deleted_total",
        "Objects removed by scoped deletes, by scope kind"
    );
    describe_counter!(
        "subvault_delete_failures_total",
        "Objects a scoped delete failed to remove"
    );
    describe_histogram!(
        "subvault_catalog_build_duration_seconds",
        "Time to list and assemble the full catalog"
    );
    describe_counter!(
        "subvault_malformed_keys_total",
        "Keys skipped because they are not versioned subtitles"
    );

    // -- Storage --
    describe_histogram!(
        "subvault_storage_operation_duration_seconds",
        "Object store latency by operation"
    );
    describe_counter!(
        "subvault_storage_errors_total",
        "Object store errors by operation"
    );
    describe_counter!(
        "subvault_storage_retries_total",
        "Object store retries by operation"
    );

    // -- HTTP --
    describe_counter!(
        "subvault_http_requests_total",
        "HTTP requests by method and status class"
    );
    describe_histogram!(
        "subvault_http_request_duration_seconds",
        "HTTP response latency"
    );

    // -- System --
    describe_gauge!("subvault_uptime_seconds", "Process uptime");
    describe_counter!(
        "subvault_panic_total",
        "Total panics caught (should always be 0)"
    );
    describe_counter!("subvault_config_reload_total", "Config reload attempts");
    describe_gauge!(
        "subvault_shutdown_in_progress",
        "1 if graceful shutdown is in progress, 0 otherwise"
    );
}

// ---------------------------------------------------------------------------
// Metric recording helpers
// ---------------------------------------------------------------------------

// -- Library --

pub fn inc_uploads(kind: &str) {
    counter!("subvault_uploads_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_upload_size(bytes: f64) {
    histogram!("subvault_upload_size_bytes").record(bytes);
}

pub fn add_archive_entries_skipped(count: u64) {
    counter!("subvault_archive_entries_skipped_total").increment(count);
}

pub fn record_allocated_version(version: u32) {
    histogram!("subvault_allocated_version").record(f64::from(version));
}

pub fn inc_allocation_conflicts() {
    counter!("subvault_allocation_conflicts_total").increment(1);
}

pub fn add_objects_deleted(scope: &str, count: u64) {
    counter!("subvault_objects_deleted_total", "scope" => scope.to_string()).increment(count);
}

pub fn add_delete_failures(count: u64) {
    counter!("subvault_delete_failures_total").increment(count);
}

pub fn record_catalog_build_duration(seconds: f64) {
    histogram!("subvault_catalog_build_duration_seconds").record(seconds);
}

pub fn add_malformed_keys(count: u64) {
    counter!("subvault_malformed_keys_total").increment(count);
}

// -- Storage --

pub fn record_storage_duration(operation: &str, seconds: f64) {
    histogram!("subvault_storage_operation_duration_seconds", "operation" => operation.to_string())
        .record(seconds);
}

pub fn inc_storage_error(operation: &str) {
    counter!("subvault_storage_errors_total", "operation" => operation.to_string()).increment(1);
}

pub fn inc_storage_retries(operation: &str) {
    counter!("subvault_storage_retries_total", "operation" => operation.to_string()).increment(1);
}

// -- HTTP --

pub fn inc_http_request(method: &str, status: u16) {
    counter!(
        "subvault_http_requests_total",
        "method" => method.to_string(),
        "status" => status_class(status)
    )
    .increment(1);
}

pub fn record_http_request_duration(seconds: f64) {
    histogram!("subvault_http_request_duration_seconds").record(seconds);
}

// -- System --

pub fn set_uptime_seconds(seconds: f64) {
    gauge!("subvault_uptime_seconds").set(seconds);
}

pub fn inc_panic_total() {
    counter!("subvault_panic_total").increment(1);
}

pub fn inc_config_reload(result: &str) {
    counter!("subvault_config_reload_total", "result" => result.to_string()).increment(1);
}

pub fn set_shutdown_in_progress(in_progress: bool) {
    gauge!("subvault_shutdown_in_progress").set(if in_progress { 1.0 } else { 0.0 });
}

// ---------------------------------------------------------------------------
// Status code bucket helper
// ---------------------------------------------------------------------------

/// Bucket an HTTP status into `2xx`, `4xx`, ... to keep label cardinality low.
pub fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

// ---------------------------------------------------------------------------
// Uptime tracking task
// ---------------------------------------------------------------------------

/// Update the uptime gauge every second until cancelled.
pub async fn run_uptime_task(start_time: Instant, cancel: tokio_util::sync::CancellationToken) {
    let interval = std::time::Duration::from_secs(1);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {
                set_uptime_seconds(start_time.elapsed().as_secs_f64());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Prometheus recorder installation
// ---------------------------------------------------------------------------

/// Install the global Prometheus recorder and return its render handle.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// A render handle backed by a recorder that is not installed globally.
///
/// Used when metrics are disabled and by router tests, which may build many
/// routers in one process.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}
