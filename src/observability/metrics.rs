//! Metrics collection and exposition.
//!
//! # Metrics
//! - `editable_config_reconcile_total` (counter): passes by outcome
//!   (`throttled`, `reconciled`, `failed`)
//! - `editable_config_changes_applied_total` (counter): keys changed by passes
//! - `editable_config_active_overrides` (gauge): editable keys with an override
//! - `editable_config_mutations_total` (counter): records written by admin
//!   actions, by action

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

pub fn record_reconcile(outcome: &'static str) {
    metrics::counter!("editable_config_reconcile_total", "outcome" => outcome).increment(1);
}

pub fn record_changes(changes: usize) {
    metrics::counter!("editable_config_changes_applied_total").increment(changes as u64);
}

pub fn record_active_overrides(count: usize) {
    metrics::gauge!("editable_config_active_overrides").set(count as f64);
}

pub fn record_mutation(action: &'static str, records: usize) {
    metrics::counter!("editable_config_mutations_total", "action" => action)
        .increment(records as u64);
}

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics exporter"),
    }
}
