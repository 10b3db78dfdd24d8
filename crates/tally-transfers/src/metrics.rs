//! Counters emitted by the transfer pipeline.
//!
//! Recorded through the `metrics` facade; the binary decides whether an
//! exporter is installed.

use metrics::{counter, describe_counter};

/// Register metric descriptions. Call once at startup.
pub fn init_metrics() {
    describe_counter!(
        "transfers_persisted_total",
        "Total number of transfer records written"
    );
    describe_counter!(
        "transfers_dropped_total",
        "Total number of transfer events dropped without a record"
    );
    describe_counter!(
        "malformed_events_total",
        "Total number of transfer events rejected for their payload shape"
    );
    describe_counter!(
        "store_errors_total",
        "Total number of failed storage operations"
    );
}

/// `kind` is `native` or `multi_asset`.
pub fn record_transfer_persisted(kind: &str) {
    counter!("transfers_persisted_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_transfer_dropped(reason: &str) {
    counter!("transfers_dropped_total", "reason" => reason.to_string()).increment(1);
}

pub fn record_malformed_event(pallet: &str, method: &str) {
    counter!(
        "malformed_events_total",
        "pallet" => pallet.to_string(),
        "method" => method.to_string()
    )
    .increment(1);
}

pub fn record_store_error(operation: &str) {
    counter!("store_errors_total", "operation" => operation.to_string()).increment(1);
}
