//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Must be called once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// Accepted TCP connections (counter).
pub const CONNECTIONS_TOTAL: &str = "chat_connections_total";
/// Finished connections (counter).
pub const DISCONNECTIONS_TOTAL: &str = "chat_disconnections_total";
/// Registered sessions (gauge).
pub const SESSIONS_ACTIVE: &str = "chat_sessions_active";
/// HELLO attempts rejected for a taken name (counter).
pub const NAMES_REJECTED_TOTAL: &str = "chat_names_rejected_total";
/// NORMAL messages routed (counter, labels: route = broadcast | private).
pub const MESSAGES_ROUTED_TOTAL: &str = "chat_messages_routed_total";
/// Private messages dropped for an absent recipient (counter).
pub const MESSAGES_UNROUTABLE_TOTAL: &str = "chat_messages_unroutable_total";
/// Receive loops ended by a decode failure (counter).
pub const MALFORMED_FRAMES_TOTAL: &str = "chat_malformed_frames_total";
/// Failed deliveries to another session's connection (counter).
pub const DELIVERY_FAILURES_TOTAL: &str = "chat_delivery_failures_total";
