//! Metrics collection for finance-service.
//!
//! Domain counters go through the `metrics` facade; the Prometheus recorder
//! installed by [`init_metrics`] renders them together with the HTTP metrics.

use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use service_core::error::AppError;
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Only the binary calls this; a second
/// call is an error.
pub fn init_metrics() -> Result<(), AppError> {
    let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("failed to install Prometheus recorder: {}", e))
    })?;

    METRICS_HANDLE
        .set(handle)
        .map_err(|_| AppError::ConfigError(anyhow::anyhow!("metrics handle already initialized")))
}

/// Get metrics output in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// A payment request changed state (or was commented on).
pub fn record_request_action(action: &str) {
    counter!("payment_request_actions_total", "action" => action.to_string()).increment(1);
}

/// A balance-affecting ledger event.
pub fn record_ledger_event(transaction_type: &str, event: &str) {
    counter!(
        "ledger_events_total",
        "type" => transaction_type.to_string(),
        "event" => event.to_string()
    )
    .increment(1);
}

/// A compensating action ran; `outcome` is `ok` or `failed`.
pub fn record_compensation(step: &str, outcome: &str) {
    counter!(
        "saga_compensations_total",
        "step" => step.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_notification(kind: &str, status: &str) {
    counter!(
        "notifications_total",
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
